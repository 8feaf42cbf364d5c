//! org.freedesktop.Notifications 的客户端代理
//!
//! 接口形状取自 Desktop Notifications Specification v1.2。

use std::collections::HashMap;

use zbus::zvariant::Value;

#[zbus::dbus_proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
pub trait Notifications {
    /// 发送或替换一条通知, 返回服务端分配的 ID
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    /// 关闭并移除指定 ID 的通知
    fn close_notification(&self, id: u32) -> zbus::Result<()>;

    /// 服务端实现的能力列表
    fn get_capabilities(&self) -> zbus::Result<Vec<String>>;

    /// (name, vendor, version, spec_version)
    fn get_server_information(&self) -> zbus::Result<(String, String, String, String)>;

    #[dbus_proxy(signal)]
    fn notification_closed(&self, id: u32, reason: u32) -> zbus::Result<()>;

    #[dbus_proxy(signal)]
    fn action_invoked(&self, id: u32, action_key: &str) -> zbus::Result<()>;
}
