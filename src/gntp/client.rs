//! GNTP 客户端引擎
//!
//! 每个请求独占一条 TCP 连接: 写信息行 + (可加密的)头块 + 各资源,
//! 读 `-OK` / `-ERROR` 应答。NOTIFY 成功后连接被保留, 由一个绑定在
//! 取消作用域上的 reader 任务继续等待 `-CALLBACK` 帧, 解码后投递到
//! 客户端共享的回调通道。`reset` 原子地换掉作用域, 让所有 reader
//! 退出而不影响后续请求。

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{ErrorCode, ServerError};
use super::info::Info;
use super::request::RequestBuffer;
use super::{canonical_key, EncryptionAlgorithm, HashAlgorithm, Headers, Notification};
use crate::error::{Error, Result};
use crate::notifier::HeaderValue;

/// 回调时间戳的线上格式: `2006-01-02 15:04:05Z`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%SZ";

/// `-OK` 应答
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Response-Action
    pub action: String,
    /// Notification-ID
    pub id: String,
    /// 其余头构成的扩展映射
    pub header: Headers,
}

/// 回调结果, 由服务端报告的用户交互
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackResult {
    Clicked,
    Closed,
    Timeout,
}

impl CallbackResult {
    /// 大小写不敏感地识别线上令牌
    pub fn from_token(token: &str) -> Option<CallbackResult> {
        match token.to_uppercase().as_str() {
            "CLICK" | "CLICKED" => Some(CallbackResult::Clicked),
            "CLOSE" | "CLOSED" => Some(CallbackResult::Closed),
            "TIMEOUT" | "TIMEDOUT" => Some(CallbackResult::Timeout),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CallbackResult::Clicked => "CLICKED",
            CallbackResult::Closed => "CLOSED",
            CallbackResult::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for CallbackResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// `-CALLBACK` 帧, NOTIFY 的异步后续
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Callback {
    /// Application-Name
    pub name: String,
    /// Notification-ID
    pub id: String,
    pub result: Option<CallbackResult>,
    pub context: String,
    pub context_type: String,
    pub timestamp: Option<DateTime<Utc>>,
    /// 其余头构成的扩展映射
    pub header: Headers,
}

struct EngineState {
    /// 当前取消作用域; reset 时整体替换
    scope: CancellationToken,
    /// 连接号单调递增, 从不复用
    next_id: u64,
    /// 仍在等待回调的连接号
    open: HashSet<u64>,
}

/// GNTP 客户端
///
/// 配置字段可直接赋值; `register` / `notify` 线程安全, 各自独占一条连接。
pub struct Client {
    /// `host:port`, 默认 `localhost:23053`
    pub server: String,
    /// Application-Name
    pub name: String,
    /// 应用级图标
    pub icon: Option<crate::notifier::Icon>,
    /// 空串表示不认证不加密
    pub password: String,
    pub hash: HashAlgorithm,
    pub encryption: EncryptionAlgorithm,

    /// 自定义头与应用专有头
    headers: StdMutex<BTreeMap<String, HeaderValue>>,
    state: Arc<StdMutex<EngineState>>,
    readers: StdMutex<Vec<JoinHandle<()>>>,
    callback_tx: mpsc::Sender<Callback>,
    callback_rx: AsyncMutex<mpsc::Receiver<Callback>>,
}

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Client {
    pub fn new() -> Client {
        let (callback_tx, callback_rx) = mpsc::channel(1);
        Client {
            server: "localhost:23053".to_owned(),
            name: String::new(),
            icon: None,
            password: String::new(),
            hash: HashAlgorithm::default(),
            encryption: EncryptionAlgorithm::default(),
            headers: StdMutex::new(BTreeMap::new()),
            state: Arc::new(StdMutex::new(EngineState {
                scope: CancellationToken::new(),
                next_id: 0,
                open: HashSet::new(),
            })),
            readers: StdMutex::new(Vec::new()),
            callback_tx,
            callback_rx: AsyncMutex::new(callback_rx),
        }
    }

    /// 设置自定义头; 键在发射时转为规范大小写
    pub fn set_header(&self, key: &str, value: impl Into<HeaderValue>) {
        lock(&self.headers).insert(key.to_owned(), value.into());
    }

    pub fn remove_header(&self, key: &str) {
        lock(&self.headers).remove(key);
    }

    /// 发送 REGISTER。
    ///
    /// 每条通知只传输 name / display_name / enabled / icon。
    pub async fn register(&self, notifications: &[Notification]) -> Result<Response> {
        let mut b = RequestBuffer::new(self.hash);
        b.header("Application-Name", &self.name);
        if let Some(icon) = &self.icon {
            let value = b.icon(icon)?;
            if !value.is_empty() {
                b.header("Application-Icon", &value);
            }
        }
        b.header("Notifications-Count", &notifications.len().to_string());
        self.custom_headers(&mut b)?;
        for n in notifications {
            b.crlf();
            b.header("Notification-Name", &n.name);
            if !n.display_name.is_empty() {
                b.header("Notification-Display-Name", &n.display_name);
            }
            if n.enabled {
                b.header("Notification-Enabled", "True");
            }
            if let Some(icon) = &n.icon {
                let value = b.icon(icon)?;
                if !value.is_empty() {
                    b.header("Notification-Icon", &value);
                }
            }
        }
        self.send("REGISTER", b).await
    }

    /// 发送 NOTIFY。
    ///
    /// 不传输 display_name / enabled; 成功后保留连接等待回调。
    pub async fn notify(&self, n: &Notification) -> Result<Response> {
        let mut b = RequestBuffer::new(self.hash);
        b.header("Application-Name", &self.name);
        b.header("Notification-Name", &n.name);
        if !n.id.is_empty() {
            b.header("Notification-ID", &n.id);
        }
        b.header("Notification-Title", &n.title);
        b.header("Notification-Text", &n.text);
        if n.sticky {
            b.header("Notification-Sticky", "True");
        }
        if n.priority != 0 {
            b.header("Notification-Priority", &n.priority.to_string());
        }
        if let Some(icon) = &n.icon {
            let value = b.icon(icon)?;
            if !value.is_empty() {
                b.header("Notification-Icon", &value);
            }
        }
        if !n.coalescing_id.is_empty() {
            b.header("Notification-Coalescing-ID", &n.coalescing_id);
        }
        if !n.callback_context.is_empty() {
            b.header("Notification-Callback-Context", &n.callback_context);
        }
        if !n.callback_context_type.is_empty() {
            b.header("Notification-Callback-Context-Type", &n.callback_context_type);
        }
        if !n.callback_target.is_empty() {
            b.header("Notification-Callback-Target", &n.callback_target);
        }
        self.custom_headers(&mut b)?;
        self.send("NOTIFY", b).await
    }

    fn custom_headers(&self, b: &mut RequestBuffer) -> Result<()> {
        let headers: Vec<(String, HeaderValue)> = lock(&self.headers)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in headers {
            let emitted = match b.resource(&value)? {
                Some(id) => id,
                None => match value {
                    HeaderValue::Str(s) => s,
                    _ => continue,
                },
            };
            b.header(&canonical_key(&key), &emitted);
        }
        Ok(())
    }

    async fn send(&self, message_type: &str, buffer: RequestBuffer) -> Result<Response> {
        let stream = TcpStream::connect(self.server.as_str()).await?;
        debug!(server = %self.server, message_type, "gntp connection opened");
        let mut stream = BufStream::new(stream);

        let mut info = Info::new(message_type, self.hash, self.encryption);
        info.set_password(&self.password)?;

        let (headers, resources) = buffer.into_parts();
        let mut msg = Vec::with_capacity(headers.len() + 256);
        msg.extend_from_slice(info.to_string().as_bytes());
        msg.extend_from_slice(b"\r\n");
        if info.is_encrypted() {
            msg.extend_from_slice(&info.encrypt(&headers)?);
            msg.extend_from_slice(b"\r\n\r\n");
        } else {
            msg.extend_from_slice(&headers);
            msg.extend_from_slice(b"\r\n");
        }
        for (id, data) in &resources {
            let data = info.encrypt(data)?;
            msg.extend_from_slice(b"Identifier: ");
            msg.extend_from_slice(id.as_bytes());
            msg.extend_from_slice(b"\r\n");
            msg.extend_from_slice(format!("Length: {}\r\n\r\n", data.len()).as_bytes());
            msg.extend_from_slice(&data);
            msg.extend_from_slice(b"\r\n\r\n");
        }
        msg.extend_from_slice(b"\r\n");
        stream.write_all(&msg).await?;
        stream.flush().await?;

        // 应答
        let line = read_line(&mut stream).await?;
        let reply = Info::parse(&line, &self.password)?;
        match reply.message_type.as_str() {
            "-OK" => {
                let mut header = if reply.is_encrypted() {
                    let raw = read_until_crlfcrlf(&mut stream).await?;
                    parse_header_block(&reply.decrypt(&raw[..raw.len() - 4])?)?
                } else {
                    read_headers(&mut stream).await?
                };
                let response = Response {
                    action: header.remove("Response-Action").unwrap_or_default(),
                    id: header.remove("Notification-ID").unwrap_or_default(),
                    header,
                };
                if message_type == "NOTIFY" {
                    // 保留连接, 等待同一条连接上的 -CALLBACK
                    self.spawn_callback_reader(stream);
                }
                Ok(response)
            }
            "-ERROR" => {
                // 协议不允许加密的错误响应
                if reply.is_encrypted() {
                    return Err(Error::Protocol);
                }
                let mut header = read_headers(&mut stream).await?;
                let code = header
                    .remove("Error-Code")
                    .and_then(|v| v.trim().parse::<i32>().ok())
                    .ok_or(Error::Protocol)?;
                Err(Error::Server(ServerError {
                    code: ErrorCode(code),
                    description: header.remove("Error-Description").unwrap_or_default(),
                    header,
                }))
            }
            _ => Err(Error::Protocol),
        }
    }

    fn spawn_callback_reader(&self, stream: BufStream<TcpStream>) {
        let (id, token) = {
            let mut st = lock(&self.state);
            let id = st.next_id;
            st.next_id += 1;
            st.open.insert(id);
            (id, st.scope.clone())
        };
        let tx = self.callback_tx.clone();
        let password = self.password.clone();
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            read_callback(stream, &password, tx, &token).await;
            lock(&state).open.remove(&id);
            debug!(conn = id, "callback reader exited");
        });
        let mut readers = lock(&self.readers);
        readers.retain(|h| !h.is_finished());
        readers.push(handle);
    }

    /// 取下一条回调; 所有发送端关闭后返回 `None`
    pub async fn callback(&self) -> Option<Callback> {
        self.callback_rx.lock().await.recv().await
    }

    /// 仍在等待回调的连接数
    pub fn pending_callbacks(&self) -> usize {
        lock(&self.state).open.len()
    }

    /// 关闭所有等待回调的连接并更换取消作用域。
    ///
    /// 返回时 open 集合为空; 后续请求使用新作用域, 不受影响。
    /// 可重复调用。
    pub fn reset(&self) {
        let mut st = lock(&self.state);
        st.scope.cancel();
        st.scope = CancellationToken::new();
        st.open.clear();
        debug!("gntp client reset");
    }

    /// 等待所有已派生的回调 reader 退出
    pub async fn wait(&self) {
        let handles: Vec<JoinHandle<()>> = lock(&self.readers).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for Client {
    fn default() -> Client {
        Client::new()
    }
}

async fn read_callback(
    mut stream: BufStream<TcpStream>,
    password: &str,
    tx: mpsc::Sender<Callback>,
    token: &CancellationToken,
) {
    let callback = tokio::select! {
        _ = token.cancelled() => return,
        decoded = decode_callback(&mut stream, password) => match decoded {
            Ok(cb) => cb,
            Err(err) => {
                // 解码失败静默终止, 不产生回调
                debug!(%err, "callback decode failed");
                return;
            }
        },
    };
    tokio::select! {
        _ = token.cancelled() => {
            debug!("callback dropped: scope cancelled before delivery");
        }
        sent = tx.send(callback) => {
            if sent.is_err() {
                debug!("callback dropped: channel closed");
            }
        }
    }
}

async fn decode_callback(stream: &mut BufStream<TcpStream>, password: &str) -> Result<Callback> {
    let line = read_line(stream).await?;
    let info = Info::parse(&line, password)?;
    if info.message_type != "-CALLBACK" {
        return Err(Error::Protocol);
    }
    let mut header = if info.is_encrypted() {
        let raw = read_until_crlfcrlf(stream).await?;
        parse_header_block(&info.decrypt(&raw[..raw.len() - 4])?)?
    } else {
        read_headers(stream).await?
    };
    Ok(Callback {
        name: header.remove("Application-Name").unwrap_or_default(),
        id: header.remove("Notification-ID").unwrap_or_default(),
        result: header
            .remove("Notification-Callback-Result")
            .and_then(|v| CallbackResult::from_token(&v)),
        context: header
            .remove("Notification-Callback-Context")
            .unwrap_or_default(),
        context_type: header
            .remove("Notification-Callback-Context-Type")
            .unwrap_or_default(),
        timestamp: header
            .remove("Notification-Callback-Timestamp")
            .and_then(|v| NaiveDateTime::parse_from_str(v.trim(), TIMESTAMP_FORMAT).ok())
            .map(|dt| dt.and_utc()),
        header,
    })
}

async fn read_line<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = r.read_line(&mut line).await?;
    if n == 0 {
        return Err(Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
    }
    Ok(line)
}

/// 按行读 MIME 风格头, 空行结束
async fn read_headers<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<Headers> {
    let mut headers = Headers::new();
    loop {
        let line = read_line(r).await?;
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.is_empty() {
            return Ok(headers);
        }
        let (key, value) = line.split_once(':').ok_or(Error::Protocol)?;
        headers.insert(key.trim(), value.trim());
    }
}

/// 解密后的头块按 CRLF 切分解析
fn parse_header_block(data: &[u8]) -> Result<Headers> {
    let text = std::str::from_utf8(data).map_err(|_| Error::Protocol)?;
    let mut headers = Headers::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or(Error::Protocol)?;
        headers.insert(key.trim(), value.trim());
    }
    Ok(headers)
}

/// 读到 CRLFCRLF 为止, 返回含终结符的全部字节
async fn read_until_crlfcrlf<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    loop {
        let byte = r.read_u8().await?;
        buf.push(byte);
        if buf.ends_with(b"\r\n\r\n") {
            return Ok(buf);
        }
    }
}
