//! 分组密码层 - CBC 模式 + PKCS #7 填充
//!
//! 密钥物料来自信息行的口令派生; DES 取 8 字节, 3DES 与 AES 取 24 字节
//! (AES-192, 与既有 Growl 服务端保持互通)。

use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::EncryptionAlgorithm;
use crate::error::{Error, Result};

/// 某次请求/响应所用的密钥物料
#[derive(Clone)]
pub(crate) struct BlockCipher {
    alg: EncryptionAlgorithm,
    key: Vec<u8>,
}

impl BlockCipher {
    /// 从派生密钥构造; 密钥短于算法要求时报 `KeyLength`。
    /// 算法为 `None` 时没有密码层, 返回 `Ok(None)`。
    pub(crate) fn new(alg: EncryptionAlgorithm, key: &[u8]) -> Result<Option<BlockCipher>> {
        if alg == EncryptionAlgorithm::None {
            return Ok(None);
        }
        let n = alg.key_size();
        if key.len() < n {
            return Err(Error::KeyLength);
        }
        Ok(Some(BlockCipher {
            alg,
            key: key[..n].to_vec(),
        }))
    }

    pub(crate) fn block_size(&self) -> usize {
        self.alg.block_size()
    }

    /// PKCS #7 填充后按 CBC 加密
    pub(crate) fn encrypt(&self, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if self.alg == EncryptionAlgorithm::None {
            return Ok(data.to_vec());
        }
        let src = pad(data, self.block_size());
        macro_rules! enc {
            ($cipher:ty) => {
                cbc::Encryptor::<$cipher>::new_from_slices(&self.key, iv)
                    .map_err(|_| Error::Protocol)?
                    .encrypt_padded_vec_mut::<NoPadding>(&src)
            };
        }
        Ok(match self.alg {
            EncryptionAlgorithm::Des => enc!(des::Des),
            EncryptionAlgorithm::TripleDes => enc!(des::TdesEde3),
            EncryptionAlgorithm::Aes => enc!(aes::Aes192),
            EncryptionAlgorithm::None => unreachable!(),
        })
    }

    /// CBC 解密后校验并剥离 PKCS #7 填充
    pub(crate) fn decrypt(&self, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if self.alg == EncryptionAlgorithm::None {
            return Ok(data.to_vec());
        }
        macro_rules! dec {
            ($cipher:ty) => {
                cbc::Decryptor::<$cipher>::new_from_slices(&self.key, iv)
                    .map_err(|_| Error::Protocol)?
                    .decrypt_padded_vec_mut::<NoPadding>(data)
                    .map_err(|_| Error::Protocol)?
            };
        }
        let dst = match self.alg {
            EncryptionAlgorithm::Des => dec!(des::Des),
            EncryptionAlgorithm::TripleDes => dec!(des::TdesEde3),
            EncryptionAlgorithm::Aes => dec!(aes::Aes192),
            EncryptionAlgorithm::None => unreachable!(),
        };
        unpad(dst, self.block_size())
    }
}

/// 填充到下一个分组边界, 且至少填一个字节:
/// 输入已对齐时额外补满整个分组。
fn pad(data: &[u8], bs: usize) -> Vec<u8> {
    let total = (data.len() / bs) * bs + bs;
    let mut src = Vec::with_capacity(total);
    src.extend_from_slice(data);
    src.resize(total, (total - data.len()) as u8);
    src
}

/// 校验填充: 末字节 v 必须落在 [1, bs], 且最后 v 个字节全为 v
fn unpad(mut data: Vec<u8>, bs: usize) -> Result<Vec<u8>> {
    let v = match data.last() {
        Some(&v) => v as usize,
        None => return Err(Error::Pkcs7),
    };
    if v == 0 || v > bs || v > data.len() {
        return Err(Error::Pkcs7);
    }
    let n = data.len() - v;
    if data[n..].iter().any(|&b| b as usize != v) {
        return Err(Error::Pkcs7);
    }
    data.truncate(n);
    Ok(data)
}
