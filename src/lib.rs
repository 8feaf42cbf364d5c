//! desktop-notify - 跨平台桌面通知库
//!
//! 统一的通知接口: 按名称注册事件(图标 + 各后端选项), 再以事件名 + 标题 +
//! 正文触发通知。支持三个相互独立的后端:
//!
//! - **GNTP**: Growl Notification Transport Protocol v1.0 (TCP), 含密钥认证、
//!   对称加密、二进制资源上传与异步 socket 回调。
//! - **Freedesktop**: Desktop Notifications Specification v1.2 (session bus)。
//! - **Windows**: 通知区域托盘图标 + 气泡通知。
//!
//! # Example
//!
//! ```no_run
//! use desktop_notify::gntp;
//! use desktop_notify::{Notifier, Value};
//!
//! # async fn demo() -> desktop_notify::Result<()> {
//! let mut client = gntp::Client::new();
//! client.name = "my-app".into();
//! client.password = "secret".into();
//!
//! let mut notifier = gntp::GntpNotifier::new(client);
//! let mut opts = desktop_notify::Options::new();
//! opts.insert("gntp:display-name".into(), Value::Str("Build finished".into()));
//! notifier.register("build-done", None, &opts).await?;
//! notifier.notify("build-done", "release", "all tests passed").await?;
//! notifier.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod infra;
pub mod notifier;

pub mod gntp;

#[cfg(unix)]
pub mod freedesktop;

#[cfg(windows)]
pub mod windows;

pub use error::{Error, Result};
pub use notifier::{HeaderValue, Icon, Notifier, Options, Value};
