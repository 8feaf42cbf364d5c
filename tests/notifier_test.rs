//! 门面层测试 - GNTP 后端

mod support;

use desktop_notify::gntp::{Client, EncryptionAlgorithm, GntpNotifier};
use desktop_notify::{Error, Icon, Notifier, Options, Value};
use support::{Mock, MockServer};

fn notifier_for(server: &MockServer) -> GntpNotifier {
    let mut client = Client::new();
    client.server = server.addr.clone();
    client.name = "desktop-notify".to_owned();
    GntpNotifier::new(client)
}

fn mock_ok(server: &MockServer, action: &'static str) {
    server.mock(Mock::Ok {
        action,
        encryption: EncryptionAlgorithm::None,
    });
}

#[tokio::test]
async fn test_register_and_notify() {
    let server = MockServer::start().await;
    let mut notifier = notifier_for(&server);

    let mut opts = Options::new();
    opts.insert("gntp:display-name".into(), Value::Str("Event".into()));
    opts.insert("gntp:sticky".into(), Value::Bool(true));
    opts.insert("gntp:priority".into(), Value::Int(2));
    mock_ok(&server, "REGISTER");
    notifier
        .register("event", Some(Icon::Bytes(b"icon".to_vec())), &opts)
        .await
        .expect("register");

    // 模板可反复派发, 标题正文只进副本
    mock_ok(&server, "NOTIFY");
    notifier.notify("event", "Title A", "Body A").await.expect("notify a");
    mock_ok(&server, "NOTIFY");
    notifier.notify("event", "Title B", "Body B").await.expect("notify b");

    // 重复注册替换模板, 事件表整体重发
    mock_ok(&server, "REGISTER");
    notifier
        .register("event", None, &Options::new())
        .await
        .expect("re-register");

    notifier.close().await.expect("close");
    // close 幂等
    notifier.close().await.expect("close again");
    notifier
        .sys()
        .downcast_ref::<Client>()
        .expect("sys")
        .wait()
        .await;
}

#[tokio::test]
async fn test_register_multiple_events_resends_all() {
    let server = MockServer::start().await;
    let mut notifier = notifier_for(&server);

    mock_ok(&server, "REGISTER");
    notifier
        .register("first", None, &Options::new())
        .await
        .expect("register first");
    // 第二次注册携带两条通知 (mock 校验 Notifications-Count 并读掉两个块)
    mock_ok(&server, "REGISTER");
    notifier
        .register("second", None, &Options::new())
        .await
        .expect("register second");
}

#[tokio::test]
async fn test_unknown_event() {
    let server = MockServer::start().await;
    let mut notifier = notifier_for(&server);

    match notifier.notify("missing", "Title", "Body").await {
        Err(Error::UnknownEvent(event)) => assert_eq!(event, "missing"),
        other => panic!("expected UnknownEvent, got {other:?}"),
    }
}

#[tokio::test]
async fn test_option_type_mismatches() {
    let server = MockServer::start().await;
    let mut notifier = notifier_for(&server);

    for (key, value) in [
        ("gntp:display-name", Value::Bool(true)),
        ("gntp:enabled", Value::Int(1)),
        ("gntp:sticky", Value::Str("true".into())),
        ("gntp:priority", Value::Str("2".into())),
        ("gntp:priority", Value::Int(i64::from(i32::MAX) + 1)),
        // 非本后端的键同样拒绝
        ("windows:sound", Value::Bool(false)),
    ] {
        let mut opts = Options::new();
        opts.insert(key.into(), value);
        match notifier.register("event", None, &opts).await {
            Err(Error::TypeMismatch { option, .. }) => assert_eq!(option, key),
            other => panic!("expected TypeMismatch for {key}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_unsupported_icon_fails_at_dispatch() {
    let server = MockServer::start().await;
    let mut notifier = notifier_for(&server);

    // 空图像在发送时被图像归一化拒绝
    let empty = image::DynamicImage::ImageLuma8(image::GrayImage::new(0, 0));
    match notifier
        .register("event", Some(Icon::Image(empty)), &Options::new())
        .await
    {
        Err(Error::UnsupportedImage(_)) => {}
        other => panic!("expected UnsupportedImage, got {other:?}"),
    }
}
