//! 信息行编解码 - 每条 GNTP 消息的第一行
//!
//! `GNTP/1.0 <type> <enc>[:iv] [<hash>:<keyhash>.<salt>]`
//!
//! 负责口令的加盐派生与校验: `k = H(password ‖ salt)`,
//! `keyhash = H(k)`, 两步使用同一个哈希算法。

use std::fmt;

use rand::RngCore;

use super::crypto::BlockCipher;
use super::{EncryptionAlgorithm, HashAlgorithm};
use crate::error::{Error, Result};

/// 一条信息行的解析/发射状态
#[derive(Clone)]
pub struct Info {
    pub version: String,
    /// REGISTER / NOTIFY / -OK / -ERROR / -CALLBACK, 始终大写
    pub message_type: String,
    pub encryption: EncryptionAlgorithm,
    pub iv: Option<Vec<u8>>,
    pub hash: HashAlgorithm,
    pub key_hash: Option<Vec<u8>>,
    pub salt: Option<Vec<u8>>,
    /// 口令派生成功后才存在; 解析端在 keyhash 验证通过后构造
    cipher: Option<BlockCipher>,
}

impl Default for Info {
    fn default() -> Info {
        Info {
            version: "1.0".to_owned(),
            message_type: String::new(),
            encryption: EncryptionAlgorithm::default(),
            iv: None,
            hash: HashAlgorithm::default(),
            key_hash: None,
            salt: None,
            cipher: None,
        }
    }
}

impl fmt::Debug for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Info")
            .field("message_type", &self.message_type)
            .field("encryption", &self.encryption)
            .field("hash", &self.hash)
            .field("has_key", &self.key_hash.is_some())
            .field("has_cipher", &self.cipher.is_some())
            .finish()
    }
}

impl Info {
    pub fn new(
        message_type: &str,
        hash: HashAlgorithm,
        encryption: EncryptionAlgorithm,
    ) -> Info {
        Info {
            message_type: message_type.to_owned(),
            hash,
            encryption,
            ..Info::default()
        }
    }

    /// 应用口令, 生成 salt / key hash / cipher / IV。
    ///
    /// 空口令清空全部密钥物料。salt 与 IV 已存在时复用
    /// (同一个 Info 上重复调用不重新掷随机数)。
    pub fn set_password(&mut self, password: &str) -> Result<()> {
        if password.is_empty() {
            self.iv = None;
            self.key_hash = None;
            self.salt = None;
            self.cipher = None;
            return Ok(());
        }
        let salt = match &self.salt {
            Some(salt) => salt.clone(),
            None => {
                let mut salt = vec![0u8; 16];
                rand::thread_rng().fill_bytes(&mut salt);
                self.salt = Some(salt.clone());
                salt
            }
        };
        let key = self.hash.digest(&[password.as_bytes(), &salt]);
        self.key_hash = Some(self.hash.digest(&[&key]));
        self.cipher = BlockCipher::new(self.encryption, &key)?;
        if self.cipher.is_some() {
            let bs = self.encryption.block_size();
            if self.iv.as_ref().map_or(true, |iv| iv.len() != bs) {
                let mut iv = vec![0u8; bs];
                rand::thread_rng().fill_bytes(&mut iv);
                self.iv = Some(iv);
            }
        } else {
            self.iv = None;
        }
        Ok(())
    }

    /// 是否带密码层
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// 加密消息体或资源; 无密码层时为恒等
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        match (&self.cipher, &self.iv) {
            (Some(cipher), Some(iv)) => cipher.encrypt(iv, data),
            _ => Ok(data.to_vec()),
        }
    }

    /// 解密并剥离填充; 无密码层时为恒等
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        match (&self.cipher, &self.iv) {
            (Some(cipher), Some(iv)) => cipher.decrypt(iv, data),
            _ => Ok(data.to_vec()),
        }
    }

    /// 解析一条信息行。大小写不敏感; `password` 用于校验 keyhash 段。
    pub fn parse(line: &str, password: &str) -> Result<Info> {
        let upper = line.trim().to_uppercase();
        let rest = upper.strip_prefix("GNTP/").ok_or(Error::Protocol)?;
        let mut tokens = rest.split_whitespace();

        let version = tokens.next().ok_or(Error::Protocol)?;
        if version != "1.0" {
            return Err(Error::Protocol);
        }
        let message_type = tokens.next().ok_or(Error::Protocol)?;
        match message_type {
            "REGISTER" | "NOTIFY" | "-OK" | "-ERROR" | "-CALLBACK" => {}
            _ => return Err(Error::Protocol),
        }
        let enc_token = tokens.next().ok_or(Error::Protocol)?;
        let hash_token = tokens.next();
        if tokens.next().is_some() {
            return Err(Error::Protocol);
        }

        let mut info = Info {
            message_type: message_type.to_owned(),
            ..Info::default()
        };

        let Some(hash_token) = hash_token else {
            // 纯明文形态只允许 NONE
            if enc_token != "NONE" {
                return Err(Error::Protocol);
            }
            return Ok(info);
        };

        // <encryptionAlgorithmID>[:<ivValue>]
        if let Some((alg_name, iv_hex)) = enc_token.split_once(':') {
            if alg_name == "NONE" {
                return Err(Error::Protocol);
            }
            let alg =
                EncryptionAlgorithm::from_token(alg_name).ok_or(Error::UnknownEncryption)?;
            let iv = hex::decode(iv_hex).map_err(|_| Error::Protocol)?;
            info.encryption = alg;
            info.iv = Some(iv);
        } else if enc_token != "NONE" {
            return Err(Error::Protocol);
        }

        // <keyHashAlgorithmID>:<keyHash>.<salt>
        let (hash_name, key_part) = hash_token.split_once(':').ok_or(Error::Protocol)?;
        let hash = HashAlgorithm::from_token(hash_name).ok_or(Error::UnknownHash)?;
        let (kh_hex, salt_hex) = key_part.split_once('.').ok_or(Error::Protocol)?;
        let key_hash = hex::decode(kh_hex).map_err(|_| Error::Protocol)?;
        let salt = hex::decode(salt_hex).map_err(|_| Error::Protocol)?;
        info.hash = hash;

        // 校验 keyhash
        let key = hash.digest(&[password.as_bytes(), &salt]);
        if hash.digest(&[&key]) != key_hash {
            return Err(Error::Password);
        }
        info.key_hash = Some(key_hash);
        info.salt = Some(salt);

        // 校验 IV 并构造 cipher
        if info.encryption != EncryptionAlgorithm::None {
            info.cipher = BlockCipher::new(info.encryption, &key)?;
            let bs = info.encryption.block_size();
            if info.iv.as_ref().map_or(true, |iv| iv.len() != bs) {
                return Err(Error::Protocol);
            }
        }
        Ok(info)
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.cipher, &self.key_hash) {
            (Some(_), Some(key_hash)) => {
                let iv = self.iv.as_deref().unwrap_or_default();
                let salt = self.salt.as_deref().unwrap_or_default();
                write!(
                    f,
                    "GNTP/1.0 {} {}:{} {}:{}.{}",
                    self.message_type,
                    self.encryption,
                    hex::encode_upper(iv),
                    self.hash,
                    hex::encode_upper(key_hash),
                    hex::encode_upper(salt),
                )
            }
            (None, Some(key_hash)) => {
                let salt = self.salt.as_deref().unwrap_or_default();
                write!(
                    f,
                    "GNTP/1.0 {} NONE {}:{}.{}",
                    self.message_type,
                    self.hash,
                    hex::encode_upper(key_hash),
                    hex::encode_upper(salt),
                )
            }
            _ => write!(f, "GNTP/1.0 {} NONE", self.message_type),
        }
    }
}
