//! 测试用 GNTP mock 服务端
//!
//! 读完整个请求 (信息行 / 头块 / 资源), 然后按预先排队的脚本应答。

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use desktop_notify::gntp::{EncryptionAlgorithm, ErrorCode, HashAlgorithm, Info};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};

pub const PASSWORD: &str = "password";

/// 预排队的应答脚本
pub enum Mock {
    /// 正常 -OK
    Ok {
        action: &'static str,
        encryption: EncryptionAlgorithm,
    },
    /// -OK 之后吊住连接不关闭, 模拟迟迟不来的回调
    OkHold { action: &'static str },
    /// -OK 之后按原样写出字节, 模拟非法回调帧
    OkThenRaw {
        action: &'static str,
        raw: &'static [u8],
    },
    /// -OK 之后送一帧 -CALLBACK
    Callback {
        result: &'static str,
        context: &'static str,
        context_type: &'static str,
        encryption: EncryptionAlgorithm,
    },
    /// -ERROR
    Error { code: i32 },
    /// 加密的 -ERROR (协议禁止)
    EncryptedError,
    /// 原样写出字节
    Raw(&'static [u8]),
}

pub struct MockServer {
    pub addr: String,
    password: Arc<Mutex<String>>,
    mocks: Arc<Mutex<VecDeque<Mock>>>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("local addr").to_string();
        let password = Arc::new(Mutex::new(String::new()));
        let mocks: Arc<Mutex<VecDeque<Mock>>> = Arc::new(Mutex::new(VecDeque::new()));

        let accept_password = Arc::clone(&password);
        let accept_mocks = Arc::clone(&mocks);
        tokio::spawn(async move {
            loop {
                let Ok((conn, _)) = listener.accept().await else {
                    return;
                };
                let password = accept_password.lock().unwrap().clone();
                let mock = accept_mocks.lock().unwrap().pop_front();
                tokio::spawn(handle(conn, password, mock));
            }
        });

        MockServer {
            addr,
            password,
            mocks,
        }
    }

    pub fn set_password(&self, password: &str) {
        *self.password.lock().unwrap() = password.to_owned();
    }

    pub fn mock(&self, mock: Mock) {
        self.mocks.lock().unwrap().push_back(mock);
    }
}

async fn handle(conn: TcpStream, password: String, mock: Option<Mock>) {
    let mut stream = BufStream::new(conn);
    let Some(info) = read_request(&mut stream, &password).await else {
        return;
    };
    let mock = mock.unwrap_or(Mock::Error {
        code: ErrorCode::INTERNAL_SERVER_ERROR.0,
    });
    let _ = respond(&mut stream, &info, &password, mock).await;
}

async fn respond(
    stream: &mut BufStream<TcpStream>,
    _info: &Info,
    password: &str,
    mock: Mock,
) -> std::io::Result<()> {
    match mock {
        Mock::Ok { action, encryption } => {
            write_ok(stream, password, action, encryption).await?;
        }
        Mock::OkHold { action } => {
            write_ok(stream, password, action, EncryptionAlgorithm::None).await?;
            // 等对端关闭
            let mut byte = [0u8; 1];
            let _ = stream.read(&mut byte).await;
        }
        Mock::OkThenRaw { action, raw } => {
            write_ok(stream, password, action, EncryptionAlgorithm::None).await?;
            stream.write_all(raw).await?;
            stream.flush().await?;
        }
        Mock::Callback {
            result,
            context,
            context_type,
            encryption,
        } => {
            write_ok(stream, password, "NOTIFY", EncryptionAlgorithm::None).await?;
            write_callback(stream, password, result, context, context_type, encryption).await?;
        }
        Mock::Error { code } => {
            let line = format!(
                "GNTP/1.0 -ERROR NONE\r\nError-Code: {code}\r\nError-Description: {}\r\nX-Server: mock\r\n\r\n",
                ErrorCode(code).description(),
            );
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await?;
        }
        Mock::EncryptedError => {
            let mut info = Info::new(
                "-ERROR",
                HashAlgorithm::Sha256,
                EncryptionAlgorithm::Aes,
            );
            info.set_password(password).expect("cipher");
            stream
                .write_all(format!("{info}\r\n").as_bytes())
                .await?;
            stream.flush().await?;
        }
        Mock::Raw(raw) => {
            stream.write_all(raw).await?;
            stream.flush().await?;
        }
    }
    Ok(())
}

async fn write_ok(
    stream: &mut BufStream<TcpStream>,
    password: &str,
    action: &str,
    encryption: EncryptionAlgorithm,
) -> std::io::Result<()> {
    if encryption == EncryptionAlgorithm::None || password.is_empty() {
        let msg =
            format!("GNTP/1.0 -OK NONE\r\nResponse-Action: {action}\r\nNotification-ID:\r\n\r\n");
        stream.write_all(msg.as_bytes()).await?;
    } else {
        let mut info = Info::new("-OK", HashAlgorithm::Sha256, encryption);
        info.set_password(password).expect("cipher");
        let body = format!("Response-Action: {action}\r\nNotification-ID:\r\n");
        let ciphertext = info.encrypt(body.as_bytes()).expect("encrypt");
        stream.write_all(format!("{info}\r\n").as_bytes()).await?;
        stream.write_all(&ciphertext).await?;
        stream.write_all(b"\r\n\r\n").await?;
    }
    stream.flush().await
}

async fn write_callback(
    stream: &mut BufStream<TcpStream>,
    password: &str,
    result: &str,
    context: &str,
    context_type: &str,
    encryption: EncryptionAlgorithm,
) -> std::io::Result<()> {
    let headers = format!(
        "Application-Name: desktop-notify\r\nNotification-ID: ID\r\n\
         Notification-Callback-Result: {result}\r\n\
         Notification-Callback-Context: {context}\r\n\
         Notification-Callback-Context-Type: {context_type}\r\n\
         Notification-Callback-Timestamp: 2006-01-02 15:04:05Z\r\n\
         X-Extra: 1\r\n"
    );
    if encryption == EncryptionAlgorithm::None || password.is_empty() {
        stream.write_all(b"GNTP/1.0 -CALLBACK NONE\r\n").await?;
        stream.write_all(headers.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
    } else {
        let mut info = Info::new("-CALLBACK", HashAlgorithm::Sha256, encryption);
        info.set_password(password).expect("cipher");
        let ciphertext = info.encrypt(headers.as_bytes()).expect("encrypt");
        stream.write_all(format!("{info}\r\n").as_bytes()).await?;
        stream.write_all(&ciphertext).await?;
        stream.write_all(b"\r\n\r\n").await?;
    }
    stream.flush().await
}

/// 读完一个完整请求, 返回解析出的信息行
async fn read_request(stream: &mut BufStream<TcpStream>, password: &str) -> Option<Info> {
    let mut line = String::new();
    let n = stream.read_line(&mut line).await.ok()?;
    if n == 0 {
        return None;
    }
    let info = Info::parse(&line, password).ok()?;

    if info.is_encrypted() {
        let body = read_until_crlfcrlf(stream).await?;
        // 请求体必须可解密
        info.decrypt(&body[..body.len() - 4]).ok()?;
    } else {
        let first = read_block(stream).await?;
        if info.message_type == "REGISTER" {
            let count: usize = first
                .iter()
                .find_map(|l| l.strip_prefix("Notifications-Count:"))
                .and_then(|v| v.trim().parse().ok())?;
            for _ in 0..count {
                read_block(stream).await?;
            }
        }
    }

    // 资源与终结符
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await.ok()?;
        if n == 0 {
            return None;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        trimmed.strip_prefix("Identifier:")?;
        let mut length_line = String::new();
        stream.read_line(&mut length_line).await.ok()?;
        let length: usize = length_line
            .trim_end()
            .strip_prefix("Length:")?
            .trim()
            .parse()
            .ok()?;
        let mut blank = String::new();
        stream.read_line(&mut blank).await.ok()?;
        if !blank.trim_end().is_empty() {
            return None;
        }
        let mut blob = vec![0u8; length];
        stream.read_exact(&mut blob).await.ok()?;
        let mut crlfcrlf = [0u8; 4];
        stream.read_exact(&mut crlfcrlf).await.ok()?;
        if &crlfcrlf != b"\r\n\r\n" {
            return None;
        }
    }
    Some(info)
}

async fn read_block(stream: &mut BufStream<TcpStream>) -> Option<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await.ok()?;
        if n == 0 {
            return None;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            return Some(lines);
        }
        lines.push(trimmed.to_owned());
    }
}

async fn read_until_crlfcrlf(stream: &mut BufStream<TcpStream>) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    loop {
        let byte = stream.read_u8().await.ok()?;
        buf.push(byte);
        if buf.ends_with(b"\r\n\r\n") {
            return Some(buf);
        }
    }
}
