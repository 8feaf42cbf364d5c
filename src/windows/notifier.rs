//! Windows 后端的门面实现

use std::any::Any;
use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{Icon as TrayIcon, IconType, Notification, NotifyIcon};
use crate::error::{Error, Result};
use crate::notifier::{Icon, Notifier, Options, Value};

/// 基于通知区域的 [`Notifier`] 后端
///
/// `register` 支持的图标: 图像 / 资源 ID / 系统图标类型 / 句柄。
/// 图像与资源 ID 先解析成图标句柄, 与直接传入的句柄同等对待。
/// 识别的选项键:
///
/// - `windows:fallback-icon` — 图标类型; 当主图标解析为句柄而 shell < 6.0.6
///   时作为降级使用
/// - `windows:sound` — bool; false 时静音, 要求 shell >= 6.0.0
pub struct WinNotifier {
    ni: NotifyIcon,
    events: BTreeMap<String, Notification>,
}

fn mismatch(option: &str, expected: &'static str, value: &Value) -> Error {
    Error::TypeMismatch {
        option: option.to_owned(),
        expected,
        got: value.type_name(),
    }
}

/// 按 shell 版本把图标与选项落成模板
fn build_template(
    icon: Option<Icon>,
    opts: &Options,
    shell_version: (u32, u32, u32),
) -> Result<Notification> {
    let mut n = Notification::default();
    match icon {
        None => {}
        Some(Icon::SysIcon(t)) => n.icon_type = t,
        Some(icon) => {
            let handle = match icon {
                Icon::Image(img) => TrayIcon::from_image(&img)?,
                Icon::Resource(id) => TrayIcon::from_resource(id)?,
                Icon::Handle(handle) => handle,
                icon => return Err(Error::UnsupportedIcon(icon.type_name())),
            };
            // 气泡携带自有句柄要求 shell >= 6.0.6, 旧 shell 走降级图标
            if shell_version >= (6, 0, 6) {
                n.icon = Some(handle);
                n.icon_type = IconType::User;
            } else if let Some(value) = opts.get("windows:fallback-icon") {
                match value {
                    Value::IconType(t) => n.icon_type = *t,
                    _ => return Err(mismatch("windows:fallback-icon", "icon type", value)),
                }
            }
        }
    }
    for (key, value) in opts {
        match key.as_str() {
            "windows:fallback-icon" => match value {
                // 句柄降级路径之外仅做类型检查
                Value::IconType(_) => {}
                _ => return Err(mismatch(key, "icon type", value)),
            },
            "windows:sound" => match value {
                Value::Bool(b) => {
                    if shell_version >= (6, 0, 0) {
                        n.sound = *b;
                    }
                }
                _ => return Err(mismatch(key, "bool", value)),
            },
            _ => return Err(mismatch(key, "a recognized \"windows:\" option", value)),
        }
    }
    Ok(n)
}

impl WinNotifier {
    /// 创建托盘图标; `icon` 作为常驻的托盘图标
    pub fn new(name: &str, icon: Option<TrayIcon>) -> Result<WinNotifier> {
        let ni = NotifyIcon::new(name)?;
        ni.set_icon(icon);
        Ok(WinNotifier {
            ni,
            events: BTreeMap::new(),
        })
    }

    /// 底层托盘驱动
    pub fn notify_icon(&self) -> &NotifyIcon {
        &self.ni
    }
}

#[async_trait]
impl Notifier for WinNotifier {
    async fn register(&mut self, event: &str, icon: Option<Icon>, opts: &Options) -> Result<()> {
        let n = build_template(icon, opts, super::sys::shell_dll_version())?;
        self.events.insert(event.to_owned(), n);
        Ok(())
    }

    async fn notify(&mut self, event: &str, title: &str, body: &str) -> Result<()> {
        let mut n = self
            .events
            .get(event)
            .cloned()
            .ok_or_else(|| Error::UnknownEvent(event.to_owned()))?;
        n.title = title.to_owned();
        n.body = body.to_owned();
        self.ni.notify(&n)
    }

    async fn close(&mut self) -> Result<()> {
        self.ni.close()
    }

    fn sys(&self) -> &dyn Any {
        &self.ni
    }
}
