//! Freedesktop 后端 - Desktop Notifications Specification v1.2
//!
//! 经 session bus 调用 org.freedesktop.Notifications, 并按服务端声明的
//! 规范版本选择 image 提示键的拼写。

mod notifier;
pub mod proxy;

pub use notifier::FdoNotifier;
pub use proxy::NotificationsProxy;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zbus::zvariant;

use crate::error::{Error, Result};
use crate::infra::image::{normalize, NormalizedImage};

/// 通知服务端的自述信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub spec_version: String,
}

/// (iiibiiay) 原始图像数据, 即 image-data 提示的值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, zvariant::Type, zvariant::Value, zvariant::OwnedValue)]
pub struct ImageData {
    pub width: i32,
    pub height: i32,
    pub rowstride: i32,
    pub has_alpha: bool,
    pub bits_per_sample: i32,
    pub channels: i32,
    pub data: Vec<u8>,
}

impl ImageData {
    /// 把栅格图像归一化成灰度或 RGBA 的原始像素结构
    pub fn new(img: &image::DynamicImage) -> Result<ImageData> {
        let normalized = normalize(img)?;
        let width = normalized.width() as i32;
        let height = normalized.height() as i32;
        Ok(match normalized {
            NormalizedImage::Gray(gray) => ImageData {
                width,
                height,
                rowstride: width,
                has_alpha: false,
                bits_per_sample: 8,
                channels: 1,
                data: gray.into_raw(),
            },
            NormalizedImage::Rgba(rgba) => ImageData {
                width,
                height,
                rowstride: width * 4,
                has_alpha: true,
                bits_per_sample: 8,
                channels: 4,
                data: rgba.into_raw(),
            },
        })
    }
}

/// 提示值, 已完成类型矫正
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    Bool(bool),
    Byte(u8),
    Int(i32),
    Int64(i64),
    UInt64(u64),
    Str(String),
    Image(ImageData),
}

impl Hint {
    fn to_value(&self) -> zvariant::Value<'static> {
        match self {
            Hint::Bool(v) => zvariant::Value::from(*v),
            Hint::Byte(v) => zvariant::Value::from(*v),
            Hint::Int(v) => zvariant::Value::from(*v),
            Hint::Int64(v) => zvariant::Value::from(*v),
            Hint::UInt64(v) => zvariant::Value::from(*v),
            Hint::Str(v) => zvariant::Value::from(v.clone()),
            Hint::Image(v) => zvariant::Value::from(v.clone()),
        }
    }
}

/// 一条 FDO 通知
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    /// Application Name
    pub name: String,
    /// Replaces ID
    pub id: u32,
    /// Notification Icon (名称或路径)
    pub icon: String,
    pub summary: String,
    pub body: String,
    /// (key, label) 交替排列, 与线上形状一致
    pub actions: Vec<String>,
    pub hints: BTreeMap<String, Hint>,
    /// 过期超时 (毫秒)
    pub timeout: i32,
}

impl Notification {
    /// 添加或替换一个动作
    pub fn action(&mut self, key: &str, label: &str) {
        let mut i = 0;
        while i + 1 < self.actions.len() {
            if self.actions[i] == key {
                self.actions[i + 1] = label.to_owned();
                return;
            }
            i += 2;
        }
        self.actions.push(key.to_owned());
        self.actions.push(label.to_owned());
    }

    /// 添加或替换一个提示, 按提示名矫正值类型。
    ///
    /// `x` / `y` 要求 i32, `urgency` 要求 u8, image 提示名被归一。
    pub fn hint(&mut self, name: &str, value: &crate::notifier::Value) -> Result<()> {
        use crate::notifier::Value;

        let mismatch = |expected: &'static str| Error::TypeMismatch {
            option: name.to_owned(),
            expected,
            got: value.type_name(),
        };
        let (name, hint) = match name {
            "image-path" | "image_path" => match value {
                Value::Str(s) => ("image-path".to_owned(), Hint::Str(s.clone())),
                _ => return Err(mismatch("string")),
            },
            "x" | "y" => match value.as_i32() {
                Some(v) => (name.to_owned(), Hint::Int(v)),
                None => return Err(mismatch("int32")),
            },
            "urgency" => match value.as_u8() {
                Some(v) => (name.to_owned(), Hint::Byte(v)),
                None => return Err(mismatch("byte")),
            },
            _ => {
                let hint = match value {
                    Value::Str(s) => Hint::Str(s.clone()),
                    Value::Bool(b) => Hint::Bool(*b),
                    Value::Int(v) => Hint::Int64(*v),
                    Value::UInt(v) => Hint::UInt64(*v),
                    _ => return Err(mismatch("scalar")),
                };
                (name.to_owned(), hint)
            }
        };
        self.hints.insert(name, hint);
        Ok(())
    }

    /// 直接挂一个 image-data 提示
    pub fn image_data(&mut self, img: &image::DynamicImage) -> Result<()> {
        let data = ImageData::new(img)?;
        self.hints.insert("image-data".to_owned(), Hint::Image(data));
        Ok(())
    }
}

/// 通知客户端, 持有一条 session bus 连接
pub struct Client {
    conn: zbus::Connection,
    proxy: NotificationsProxy<'static>,
}

impl Client {
    /// 连接 session bus
    pub async fn new() -> Result<Client> {
        let conn = zbus::Connection::session().await?;
        let proxy = NotificationsProxy::new(&conn).await?;
        Ok(Client { conn, proxy })
    }

    pub fn connection(&self) -> &zbus::Connection {
        &self.conn
    }

    /// 底层代理, 可订阅 NotificationClosed / ActionInvoked 信号
    pub fn proxy(&self) -> &NotificationsProxy<'static> {
        &self.proxy
    }

    /// 关闭并移除指定 ID 的通知
    pub async fn close_notification(&self, id: u32) -> Result<()> {
        self.proxy.close_notification(id).await?;
        Ok(())
    }

    /// 服务端能力列表
    pub async fn capabilities(&self) -> Result<Vec<String>> {
        Ok(self.proxy.get_capabilities().await?)
    }

    /// 服务端自述信息
    pub async fn server_information(&self) -> Result<ServerInfo> {
        let (name, vendor, version, spec_version) =
            self.proxy.get_server_information().await?;
        Ok(ServerInfo {
            name,
            vendor,
            version,
            spec_version,
        })
    }

    /// 发送一条通知, 返回服务端分配的 ID。
    ///
    /// 带提示时先询问服务端的规范版本, 旧版本服务端使用旧的 image 键拼写。
    pub async fn notify(&self, n: &Notification) -> Result<u32> {
        let mut hints: Vec<(String, zvariant::Value<'static>)> = Vec::new();
        if !n.hints.is_empty() {
            let si = self.server_information().await?;
            let (major, minor) = parse_spec_version(&si.spec_version)?;
            for (name, hint) in &n.hints {
                let name = match name.as_str() {
                    "image-data" => {
                        if major > 1 || (major == 1 && minor >= 2) {
                            "image-data"
                        } else if major == 1 && minor == 1 {
                            "image_data"
                        } else {
                            "icon_data"
                        }
                    }
                    "image-path" => {
                        if major > 1 || (major == 1 && minor >= 2) {
                            "image-path"
                        } else {
                            "image_path"
                        }
                    }
                    other => other,
                };
                hints.push((name.to_owned(), hint.to_value()));
            }
        }
        let hints = hints
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        let actions: Vec<&str> = n.actions.iter().map(String::as_str).collect();
        let id = self
            .proxy
            .notify(
                &n.name, n.id, &n.icon, &n.summary, &n.body, &actions, hints, n.timeout,
            )
            .await?;
        Ok(id)
    }
}

fn parse_spec_version(v: &str) -> Result<(u32, u32)> {
    let (major, minor) = v.split_once('.').ok_or(Error::Protocol)?;
    let major = major.trim().parse().map_err(|_| Error::Protocol)?;
    let minor = minor.trim().parse().map_err(|_| Error::Protocol)?;
    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Value;

    #[test]
    fn test_action_add_or_replace() {
        let mut n = Notification::default();
        n.action("default", "Open");
        n.action("close", "Dismiss");
        n.action("default", "Open!");
        assert_eq!(n.actions, vec!["default", "Open!", "close", "Dismiss"]);
    }

    #[test]
    fn test_hint_coercions() {
        let mut n = Notification::default();
        n.hint("x", &Value::Int(10)).unwrap();
        n.hint("y", &Value::UInt(20)).unwrap();
        n.hint("urgency", &Value::Int(2)).unwrap();
        n.hint("image_path", &Value::Str("/tmp/icon.png".into()))
            .unwrap();
        n.hint("sound-name", &Value::Str("bell".into())).unwrap();

        assert_eq!(n.hints.get("x"), Some(&Hint::Int(10)));
        assert_eq!(n.hints.get("y"), Some(&Hint::Int(20)));
        assert_eq!(n.hints.get("urgency"), Some(&Hint::Byte(2)));
        // 键拼写归一
        assert_eq!(
            n.hints.get("image-path"),
            Some(&Hint::Str("/tmp/icon.png".into()))
        );
        assert_eq!(n.hints.get("sound-name"), Some(&Hint::Str("bell".into())));
    }

    #[test]
    fn test_hint_rejects_bad_types() {
        let mut n = Notification::default();
        for (name, value) in [
            ("x", Value::Str("10".into())),
            ("x", Value::Int(i64::MAX)),
            ("urgency", Value::Int(-1)),
            ("urgency", Value::Int(256)),
            ("image-path", Value::Int(1)),
        ] {
            assert!(
                matches!(n.hint(name, &value), Err(Error::TypeMismatch { .. })),
                "hint {name}"
            );
        }
    }

    #[test]
    fn test_image_data_layout() {
        let gray = image::DynamicImage::ImageLuma8(image::GrayImage::new(3, 2));
        let data = ImageData::new(&gray).unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.channels, 1);
        assert_eq!(data.rowstride, 3);
        assert!(!data.has_alpha);
        assert_eq!(data.data.len(), 6);

        let rgba = image::DynamicImage::ImageRgba8(image::RgbaImage::new(3, 2));
        let data = ImageData::new(&rgba).unwrap();
        assert_eq!(data.channels, 4);
        assert_eq!(data.rowstride, 12);
        assert!(data.has_alpha);
        assert_eq!(data.data.len(), 24);
    }

    #[test]
    fn test_parse_spec_version() {
        assert_eq!(parse_spec_version("1.2").unwrap(), (1, 2));
        assert_eq!(parse_spec_version("2.0").unwrap(), (2, 0));
        assert!(parse_spec_version("2").is_err());
        assert!(parse_spec_version("a.b").is_err());
    }
}
