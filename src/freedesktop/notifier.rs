//! Freedesktop 后端的门面实现

use std::any::Any;
use std::collections::BTreeMap;
use std::io;

use async_trait::async_trait;

use super::{Client, Notification};
use crate::error::{Error, Result};
use crate::notifier::{Icon, Notifier, Options, Value};

/// 基于 session bus 的 [`Notifier`] 后端
///
/// `register` 支持的图标: URL (图标名或路径) / 图像。
/// 识别的选项键:
///
/// - `freedesktop:actions` — string -> string 映射
/// - `freedesktop:hints` — string -> value 映射 (urgency 矫正为 u8, x/y 为 i32)
/// - `freedesktop:timeout` — i32, 过期毫秒数
pub struct FdoNotifier {
    client: Client,
    name: String,
    events: BTreeMap<String, Notification>,
    closed: bool,
}

fn mismatch(option: &str, expected: &'static str, value: &Value) -> Error {
    Error::TypeMismatch {
        option: option.to_owned(),
        expected,
        got: value.type_name(),
    }
}

impl FdoNotifier {
    /// 连接 session bus; `name` 作为 Application Name
    pub async fn new(name: &str) -> Result<FdoNotifier> {
        Ok(FdoNotifier {
            client: Client::new().await?,
            name: name.to_owned(),
            events: BTreeMap::new(),
            closed: false,
        })
    }

    /// 底层客户端
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Io(io::Error::from(io::ErrorKind::NotConnected)));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for FdoNotifier {
    async fn register(&mut self, event: &str, icon: Option<Icon>, opts: &Options) -> Result<()> {
        self.ensure_open()?;
        let mut n = Notification::default();
        match &icon {
            None => {}
            Some(Icon::Url(path)) => n.icon = path.clone(),
            Some(Icon::Image(img)) => n.image_data(img)?,
            Some(icon) => return Err(Error::UnsupportedIcon(icon.type_name())),
        }
        for (key, value) in opts {
            match key.as_str() {
                "freedesktop:actions" => match value {
                    Value::StrMap(m) => {
                        for (k, label) in m {
                            n.action(k, label);
                        }
                    }
                    _ => return Err(mismatch(key, "map[string]string", value)),
                },
                "freedesktop:hints" => match value {
                    Value::Map(m) => {
                        for (k, v) in m {
                            n.hint(k, v)?;
                        }
                    }
                    _ => return Err(mismatch(key, "map[string]value", value)),
                },
                "freedesktop:timeout" => match value.as_i32() {
                    Some(v) => n.timeout = v,
                    None => return Err(mismatch(key, "int32", value)),
                },
                _ => return Err(mismatch(key, "a recognized \"freedesktop:\" option", value)),
            }
        }
        self.events.insert(event.to_owned(), n);
        Ok(())
    }

    async fn notify(&mut self, event: &str, title: &str, body: &str) -> Result<()> {
        self.ensure_open()?;
        let mut n = self
            .events
            .get(event)
            .cloned()
            .ok_or_else(|| Error::UnknownEvent(event.to_owned()))?;
        n.name = self.name.clone();
        n.summary = title.to_owned();
        n.body = body.to_owned();
        self.client.notify(&n).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // 连接本身随 drop 释放; 标记后拒绝继续使用
        self.closed = true;
        Ok(())
    }

    fn sys(&self) -> &dyn Any {
        &self.client
    }
}
