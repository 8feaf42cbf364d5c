//! GNTP 协议引擎 - Growl Notification Transport Protocol v1.0
//!
//! 文本帧 + 二进制资源的请求/响应协议, 支持口令认证
//! (MD5/SHA1/SHA256/SHA512) 与对称加密 (DES/3DES/AES-CBC + PKCS#7),
//! 以及 NOTIFY 之后经同一条 TCP 连接送回的异步回调。

mod client;
mod crypto;
mod error;
mod info;
mod notifier;
mod request;

pub use client::{Callback, CallbackResult, Client, Response};
pub use error::{ErrorCode, ServerError};
pub use info::Info;
pub use notifier::GntpNotifier;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::notifier::Icon;

/// 密钥派生所用的哈希算法
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

fn digest_with<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut h = D::new();
    for p in parts {
        h.update(p);
    }
    h.finalize().to_vec()
}

impl HashAlgorithm {
    /// 对若干字节片的拼接取摘要
    pub fn digest(self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            HashAlgorithm::Md5 => digest_with::<md5::Md5>(parts),
            HashAlgorithm::Sha1 => digest_with::<sha1::Sha1>(parts),
            HashAlgorithm::Sha256 => digest_with::<sha2::Sha256>(parts),
            HashAlgorithm::Sha512 => digest_with::<sha2::Sha512>(parts),
        }
    }

    /// 线上令牌
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    pub(crate) fn from_token(token: &str) -> Option<HashAlgorithm> {
        match token {
            "MD5" => Some(HashAlgorithm::Md5),
            "SHA1" => Some(HashAlgorithm::Sha1),
            "SHA256" => Some(HashAlgorithm::Sha256),
            "SHA512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 消息体与资源的加密算法
///
/// 注意: 为与既有 Growl 服务端互通, AES 使用 24 字节密钥 (AES-192),
/// 而非更常见的 128/256。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    #[default]
    None,
    Des,
    TripleDes,
    Aes,
}

impl EncryptionAlgorithm {
    /// 线上令牌
    pub fn name(self) -> &'static str {
        match self {
            EncryptionAlgorithm::None => "NONE",
            EncryptionAlgorithm::Des => "DES",
            EncryptionAlgorithm::TripleDes => "3DES",
            EncryptionAlgorithm::Aes => "AES",
        }
    }

    /// 算法要求的密钥长度 (字节)
    pub fn key_size(self) -> usize {
        match self {
            EncryptionAlgorithm::None => 0,
            EncryptionAlgorithm::Des => 8,
            EncryptionAlgorithm::TripleDes => 24,
            EncryptionAlgorithm::Aes => 24,
        }
    }

    /// 分组长度 (字节)
    pub fn block_size(self) -> usize {
        match self {
            EncryptionAlgorithm::None => 0,
            EncryptionAlgorithm::Des | EncryptionAlgorithm::TripleDes => 8,
            EncryptionAlgorithm::Aes => 16,
        }
    }

    pub(crate) fn from_token(token: &str) -> Option<EncryptionAlgorithm> {
        match token {
            "NONE" => Some(EncryptionAlgorithm::None),
            "DES" => Some(EncryptionAlgorithm::Des),
            "3DES" => Some(EncryptionAlgorithm::TripleDes),
            "AES" => Some(EncryptionAlgorithm::Aes),
            _ => None,
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 通知模板
///
/// REGISTER 只传输 `name` / `display_name` / `enabled` / `icon`;
/// NOTIFY 传输除 `display_name` / `enabled` 之外的全部字段。
#[derive(Debug, Clone, Default)]
pub struct Notification {
    pub name: String,
    pub display_name: String,
    pub enabled: bool,
    pub id: String,
    pub title: String,
    pub text: String,
    pub sticky: bool,
    pub priority: i32,
    pub icon: Option<Icon>,
    pub coalescing_id: String,
    pub callback_context: String,
    pub callback_context_type: String,
    pub callback_target: String,
}

/// 规范头大小写: 每个 `-` 分段首字母大写, 其余小写
pub fn canonical_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = true;
    for ch in key.chars() {
        if ch == '-' {
            upper = true;
            out.push(ch);
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// MIME 风格头映射, 键按规范大小写存取
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Headers {
        Headers::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(canonical_key(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&canonical_key(key)).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(&canonical_key(key))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
