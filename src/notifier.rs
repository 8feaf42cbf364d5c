//! 通知门面 - 跨后端的统一接口
//!
//! 每个后端持有 事件名 -> 预填通知模板 的映射; `notify` 克隆模板后
//! 覆盖标题与正文再派发, 存储的模板本身永不被修改。

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;

/// 图标, 以标签联合建模
///
/// `Url` 按字面传输; 其余变体在发送时读成字节、取摘要并作为资源附加。
#[derive(Clone)]
pub enum Icon {
    /// 指向图标的 URL 或路径
    Url(String),
    /// 原始字节 (PNG 等)
    Bytes(Vec<u8>),
    /// 栅格图像, 发送前归一化并编码为 PNG
    Image(image::DynamicImage),
    /// 惰性字节源; 克隆共享同一 reader, 读取一次即消耗
    Stream(Arc<Mutex<dyn Read + Send>>),
    /// 已加载的系统图标句柄
    #[cfg(windows)]
    Handle(crate::windows::Icon),
    /// 系统预置的气泡图标类型
    #[cfg(windows)]
    SysIcon(crate::windows::IconType),
    /// 模块资源 ID, 经 LoadIcon 加载
    #[cfg(windows)]
    Resource(u16),
}

impl Icon {
    /// 包一个惰性字节源
    pub fn stream(reader: impl Read + Send + 'static) -> Icon {
        Icon::Stream(Arc::new(Mutex::new(reader)))
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Icon::Url(_) => "url",
            Icon::Bytes(_) => "bytes",
            Icon::Image(_) => "image",
            Icon::Stream(_) => "stream",
            #[cfg(windows)]
            Icon::Handle(_) => "handle",
            #[cfg(windows)]
            Icon::SysIcon(_) => "icon type",
            #[cfg(windows)]
            Icon::Resource(_) => "resource id",
        }
    }
}

impl fmt::Debug for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Icon::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Icon::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Icon::Image(img) => f
                .debug_tuple("Image")
                .field(&(img.width(), img.height()))
                .finish(),
            Icon::Stream(_) => f.write_str("Stream(..)"),
            #[cfg(windows)]
            Icon::Handle(_) => f.write_str("Handle(..)"),
            #[cfg(windows)]
            Icon::SysIcon(t) => f.debug_tuple("SysIcon").field(t).finish(),
            #[cfg(windows)]
            Icon::Resource(id) => f.debug_tuple("Resource").field(id).finish(),
        }
    }
}

impl From<&str> for Icon {
    fn from(url: &str) -> Icon {
        Icon::Url(url.to_owned())
    }
}

impl From<String> for Icon {
    fn from(url: String) -> Icon {
        Icon::Url(url)
    }
}

impl From<Vec<u8>> for Icon {
    fn from(bytes: Vec<u8>) -> Icon {
        Icon::Bytes(bytes)
    }
}

impl From<image::DynamicImage> for Icon {
    fn from(img: image::DynamicImage) -> Icon {
        Icon::Image(img)
    }
}

/// 自定义头的值
#[derive(Clone)]
pub enum HeaderValue {
    /// 纯文本, 直接写入头部
    Str(String),
    /// 字节, 作为资源附加并以资源标识引用
    Bytes(Vec<u8>),
    /// 惰性字节源, 同上
    Stream(Arc<Mutex<dyn Read + Send>>),
}

impl HeaderValue {
    pub fn stream(reader: impl Read + Send + 'static) -> HeaderValue {
        HeaderValue::Stream(Arc::new(Mutex::new(reader)))
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
            HeaderValue::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            HeaderValue::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> HeaderValue {
        HeaderValue::Str(s.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> HeaderValue {
        HeaderValue::Str(s)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(b: Vec<u8>) -> HeaderValue {
        HeaderValue::Bytes(b)
    }
}

/// 注册选项的值
///
/// 选项键按后端加前缀 (`gntp:` / `freedesktop:` / `windows:`), 值类型不符
/// 或键不被识别时注册失败。
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// string -> string 映射 (freedesktop:actions)
    StrMap(BTreeMap<String, String>),
    /// string -> Value 映射 (freedesktop:hints)
    Map(BTreeMap<String, Value>),
    /// 气泡图标类型 (windows:fallback-icon)
    #[cfg(windows)]
    IconType(crate::windows::IconType),
}

impl Value {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::StrMap(_) => "map[string]string",
            Value::Map(_) => "map[string]value",
            #[cfg(windows)]
            Value::IconType(_) => "icon type",
        }
    }

    /// 取 i32, 供 priority / timeout / x / y 这类坐标型选项使用
    pub(crate) fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int(v) => i32::try_from(*v).ok(),
            Value::UInt(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// 取 u8, 供 urgency 使用
    pub(crate) fn as_u8(&self) -> Option<u8> {
        match self {
            Value::Int(v) => u8::try_from(*v).ok(),
            Value::UInt(v) => u8::try_from(*v).ok(),
            _ => None,
        }
    }
}

/// 注册选项集合
pub type Options = BTreeMap<String, Value>;

/// 跨后端通知接口
///
/// 后端各自解释图标与选项; 重复注册同一事件会替换模板。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 以 `event` 为键存储一条预填模板, 并按需同步到后端
    async fn register(&mut self, event: &str, icon: Option<Icon>, opts: &Options) -> Result<()>;

    /// 按事件名派发通知; 事件未注册时返回 `UnknownEvent`
    async fn notify(&mut self, event: &str, title: &str, body: &str) -> Result<()>;

    /// 释放后端资源, 幂等
    async fn close(&mut self) -> Result<()>;

    /// 逃生舱: 返回底层引擎, 供高级调用方向下转型
    fn sys(&self) -> &dyn Any;
}
