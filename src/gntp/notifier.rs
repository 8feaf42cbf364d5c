//! GNTP 后端的门面实现
//!
//! 注册时把模板存进事件表并向服务端重发全量 REGISTER;
//! `notify` 克隆模板、覆盖标题正文后派发, 存储的模板不被修改。

use std::any::Any;
use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{Client, Notification};
use crate::error::{Error, Result};
use crate::notifier::{Icon, Notifier, Options, Value};

/// 基于 [`Client`] 的 [`Notifier`] 后端
///
/// `register` 支持的图标: URL / 字节 / 图像 / 字节流。
/// 识别的选项键:
///
/// - `gntp:display-name` — string
/// - `gntp:enabled` — bool
/// - `gntp:sticky` — bool
/// - `gntp:priority` — int, 须落在 i32 范围
pub struct GntpNotifier {
    client: Client,
    events: BTreeMap<String, Notification>,
}

fn mismatch(option: &str, expected: &'static str, value: &Value) -> Error {
    Error::TypeMismatch {
        option: option.to_owned(),
        expected,
        got: value.type_name(),
    }
}

fn apply_options(n: &mut Notification, opts: &Options) -> Result<()> {
    for (key, value) in opts {
        match key.as_str() {
            "gntp:display-name" => match value {
                Value::Str(s) => n.display_name = s.clone(),
                _ => return Err(mismatch(key, "string", value)),
            },
            "gntp:enabled" => match value {
                Value::Bool(b) => n.enabled = *b,
                _ => return Err(mismatch(key, "bool", value)),
            },
            "gntp:sticky" => match value {
                Value::Bool(b) => n.sticky = *b,
                _ => return Err(mismatch(key, "bool", value)),
            },
            "gntp:priority" => match value.as_i32() {
                Some(v) => n.priority = v,
                None => return Err(mismatch(key, "int (i32)", value)),
            },
            _ => return Err(mismatch(key, "a recognized \"gntp:\" option", value)),
        }
    }
    Ok(())
}

impl GntpNotifier {
    pub fn new(client: Client) -> GntpNotifier {
        GntpNotifier {
            client,
            events: BTreeMap::new(),
        }
    }

    /// 底层客户端, 用于读取回调通道或调整配置
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Notifier for GntpNotifier {
    async fn register(&mut self, event: &str, icon: Option<Icon>, opts: &Options) -> Result<()> {
        let mut n = Notification {
            name: event.to_owned(),
            enabled: true,
            icon,
            ..Notification::default()
        };
        apply_options(&mut n, opts)?;
        self.events.insert(event.to_owned(), n);

        let list: Vec<Notification> = self.events.values().cloned().collect();
        self.client.register(&list).await?;
        Ok(())
    }

    async fn notify(&mut self, event: &str, title: &str, body: &str) -> Result<()> {
        let mut n = self
            .events
            .get(event)
            .cloned()
            .ok_or_else(|| Error::UnknownEvent(event.to_owned()))?;
        n.title = title.to_owned();
        n.text = body.to_owned();
        self.client.notify(&n).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.client.reset();
        Ok(())
    }

    fn sys(&self) -> &dyn Any {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_options() {
        let mut opts = Options::new();
        opts.insert("gntp:display-name".into(), Value::Str("Display".into()));
        opts.insert("gntp:enabled".into(), Value::Bool(false));
        opts.insert("gntp:sticky".into(), Value::Bool(true));
        opts.insert("gntp:priority".into(), Value::Int(2));

        let mut n = Notification {
            enabled: true,
            ..Notification::default()
        };
        apply_options(&mut n, &opts).unwrap();
        assert_eq!(n.display_name, "Display");
        assert!(!n.enabled);
        assert!(n.sticky);
        assert_eq!(n.priority, 2);
    }

    #[test]
    fn test_apply_options_type_mismatch() {
        for (key, value) in [
            ("gntp:display-name", Value::Bool(true)),
            ("gntp:enabled", Value::Str("yes".into())),
            ("gntp:sticky", Value::Int(1)),
            ("gntp:priority", Value::Str("1".into())),
            // 超出 i32 的 priority 同样拒绝
            ("gntp:priority", Value::Int(i64::from(i32::MAX) + 1)),
            ("gntp:priority", Value::UInt(u64::MAX)),
            // 未识别的键拒绝
            ("freedesktop:timeout", Value::Int(1)),
            ("gntp:unknown", Value::Bool(true)),
        ] {
            let mut opts = Options::new();
            opts.insert(key.into(), value);
            let mut n = Notification::default();
            assert!(
                matches!(
                    apply_options(&mut n, &opts),
                    Err(Error::TypeMismatch { .. })
                ),
                "option {key}"
            );
        }
    }

    #[test]
    fn test_sys_downcasts_to_client() {
        let notifier = GntpNotifier::new(Client::new());
        assert!(notifier.sys().downcast_ref::<Client>().is_some());
    }
}
