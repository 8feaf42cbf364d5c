//! 请求构造 - CRLF 头块与内容寻址的二进制资源表
//!
//! 头块按 `Canonical-Header-Case: value CRLF` 发射; 字符串值做净化
//! (`CRLF -> LF`, 裸 `CR -> 空格`)。图标与非字符串头值被读成字节,
//! 取摘要后挂进资源表, 以 `x-growl-resource://HEX` 引用。

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::PoisonError;

use super::HashAlgorithm;
use crate::error::Result;
use crate::infra;
use crate::notifier::{HeaderValue, Icon};

/// 资源标识前缀
pub(crate) const RESOURCE_SCHEME: &str = "x-growl-resource://";

/// 一次请求的头字节与待附加的资源
pub(crate) struct RequestBuffer {
    hash: HashAlgorithm,
    buf: Vec<u8>,
    resources: BTreeMap<String, Vec<u8>>,
}

impl RequestBuffer {
    pub(crate) fn new(hash: HashAlgorithm) -> RequestBuffer {
        RequestBuffer {
            hash,
            buf: Vec::new(),
            resources: BTreeMap::new(),
        }
    }

    /// 空行, 用于 REGISTER 中分隔各通知块
    pub(crate) fn crlf(&mut self) {
        self.buf.extend_from_slice(b"\r\n");
    }

    /// 追加一条 `Key: Value` 头; 值做换行净化
    pub(crate) fn header(&mut self, key: &str, value: &str) {
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.extend_from_slice(b": ");
        self.buf.extend_from_slice(sanitize(value).as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    /// 把图标转成头值: URL 原样, 其余读成字节并附加为资源
    pub(crate) fn icon(&mut self, icon: &Icon) -> Result<String> {
        match icon {
            Icon::Url(url) => Ok(url.clone()),
            Icon::Bytes(data) => Ok(self.attach(data.clone())),
            Icon::Image(img) => {
                let png = infra::image::normalize(img)?.to_png()?;
                Ok(self.attach(png))
            }
            Icon::Stream(reader) => {
                let data = read_all(reader)?;
                Ok(self.attach(data))
            }
            #[cfg(windows)]
            _ => Err(crate::error::Error::UnsupportedIcon(icon.type_name())),
        }
    }

    /// 非字符串头值转为资源引用; 字符串返回 `None` 由调用方原样发射
    pub(crate) fn resource(&mut self, value: &HeaderValue) -> Result<Option<String>> {
        match value {
            HeaderValue::Str(_) => Ok(None),
            HeaderValue::Bytes(data) => Ok(Some(self.attach(data.clone()))),
            HeaderValue::Stream(reader) => {
                let data = read_all(reader)?;
                Ok(Some(self.attach(data)))
            }
        }
    }

    /// 内容寻址: 标识符是当前哈希算法下摘要的大写十六进制
    fn attach(&mut self, data: Vec<u8>) -> String {
        let digest = hex::encode_upper(self.hash.digest(&[&data]));
        let id = format!("{RESOURCE_SCHEME}{digest}");
        self.resources.insert(digest, data);
        id
    }

    /// (头字节, 资源表); 资源表键是 `Identifier` 头的值
    pub(crate) fn into_parts(self) -> (Vec<u8>, BTreeMap<String, Vec<u8>>) {
        (self.buf, self.resources)
    }
}

fn read_all(reader: &std::sync::Arc<std::sync::Mutex<dyn Read + Send>>) -> Result<Vec<u8>> {
    let mut guard = reader.lock().unwrap_or_else(PoisonError::into_inner);
    let mut data = Vec::new();
    guard.read_to_end(&mut data)?;
    Ok(data)
}

fn sanitize(value: &str) -> String {
    value.replace("\r\n", "\n").replace('\r', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sanitizes_line_breaks() {
        let mut b = RequestBuffer::new(HashAlgorithm::Md5);
        b.header("Notification-Text", "line1\r\nline2\rrest");
        let (buf, _) = b.into_parts();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Notification-Text: line1\nline2 rest\r\n"
        );
    }

    #[test]
    fn test_attach_identifier_is_digest() {
        let mut b = RequestBuffer::new(HashAlgorithm::Md5);
        let id = b.icon(&Icon::Bytes(b"blob".to_vec())).unwrap();
        let digest = hex::encode_upper(HashAlgorithm::Md5.digest(&[b"blob"]));
        assert_eq!(id, format!("x-growl-resource://{digest}"));

        let (_, resources) = b.into_parts();
        assert_eq!(resources.get(&digest).map(Vec::as_slice), Some(&b"blob"[..]));
    }

    #[test]
    fn test_same_blob_deduplicates() {
        let mut b = RequestBuffer::new(HashAlgorithm::Sha256);
        let a = b.icon(&Icon::Bytes(b"same".to_vec())).unwrap();
        let c = b.icon(&Icon::Bytes(b"same".to_vec())).unwrap();
        assert_eq!(a, c);
        let (_, resources) = b.into_parts();
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn test_url_icon_passthrough() {
        let mut b = RequestBuffer::new(HashAlgorithm::Md5);
        let id = b.icon(&"https://example.com/icon.png".into()).unwrap();
        assert_eq!(id, "https://example.com/icon.png");
        let (_, resources) = b.into_parts();
        assert!(resources.is_empty());
    }

    #[test]
    fn test_stream_icon_read_once() {
        let icon = Icon::stream(std::io::Cursor::new(b"stream-bytes".to_vec()));
        let mut b = RequestBuffer::new(HashAlgorithm::Md5);
        b.icon(&icon).unwrap();
        // 第二次读取时 reader 已被消耗
        let id = b.icon(&icon).unwrap();
        let empty = hex::encode_upper(HashAlgorithm::Md5.digest(&[b""]));
        assert_eq!(id, format!("x-growl-resource://{empty}"));
    }

    #[test]
    fn test_string_header_value_is_not_a_resource() {
        let mut b = RequestBuffer::new(HashAlgorithm::Md5);
        assert!(b.resource(&"plain".into()).unwrap().is_none());
        assert!(b
            .resource(&HeaderValue::Bytes(b"x".to_vec()))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_image_icon_attaches_png() {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(2, 2));
        let mut b = RequestBuffer::new(HashAlgorithm::Md5);
        let id = b.icon(&Icon::Image(img)).unwrap();
        assert!(id.starts_with(RESOURCE_SCHEME));
        let (_, resources) = b.into_parts();
        let blob = resources.values().next().unwrap();
        // PNG magic
        assert_eq!(&blob[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
