//! 错误类型 - 整个库共用的错误枚举

use thiserror::Error;

/// 库级 Result 别名
pub type Result<T> = std::result::Result<T, Error>;

/// 所有对外暴露的失败形态
#[derive(Debug, Error)]
pub enum Error {
    /// GNTP 帧格式错误或结构非法
    #[error("protocol error")]
    Protocol,

    /// 信息行中出现不支持的哈希算法
    #[error("unknown hash algorithm")]
    UnknownHash,

    /// 信息行中出现不支持的加密算法
    #[error("unknown encryption algorithm")]
    UnknownEncryption,

    /// 派生密钥短于加密算法要求
    #[error("key length is too short")]
    KeyLength,

    /// 收到的 key hash 与本地口令推导不一致
    #[error("incorrect password")]
    Password,

    /// 解密后的 PKCS #7 填充非法
    #[error("invalid PKCS #7 padding")]
    Pkcs7,

    /// 像素格式不在可归一化范围内
    #[error("unsupported image: {0}")]
    UnsupportedImage(&'static str),

    /// 图标变体对当前后端不可用
    #[error("unsupported icon: {0}")]
    UnsupportedIcon(&'static str),

    /// 按事件名查找通知模板失败
    #[error("unknown event: {0:?}")]
    UnknownEvent(String),

    /// 选项值类型不符
    #[error("{option:?} expects {expected}: {got}")]
    TypeMismatch {
        option: String,
        expected: &'static str,
        got: &'static str,
    },

    /// GNTP 服务端返回的应用级错误
    #[error(transparent)]
    Server(#[from] crate::gntp::ServerError),

    /// 底层传输错误, 原样上抛
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 图像解码/编码错误
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// session bus 通信错误
    #[cfg(unix)]
    #[error(transparent)]
    Dbus(#[from] zbus::Error),

    /// GUID 文本格式非法
    #[cfg(windows)]
    #[error("invalid GUID format")]
    Guid,

    /// 操作需要更新的 Windows 版本
    #[cfg(windows)]
    #[error("requires Windows {0} or later")]
    WindowsVersion(&'static str),
}
