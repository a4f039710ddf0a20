use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Request, Response, StatusCode};
use http_body::Full;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower::ServiceExt;

use tetherio_engine::body::ResponseBody;
use tetherio_engine::{
    DisconnectReason, EngineIoConfig, EngineIoHandler, EngineIoService, SendPacket, Socket,
};

/// Records everything the engine reports and echoes messages back.
#[derive(Debug, Clone)]
struct RecordingHandler {
    msg_tx: mpsc::UnboundedSender<String>,
    bin_tx: mpsc::UnboundedSender<Vec<u8>>,
    disconnect_tx: mpsc::UnboundedSender<DisconnectReason>,
}

impl EngineIoHandler for RecordingHandler {
    type Data = ();

    fn on_connect(&self, _socket: Arc<Socket<()>>) {}

    fn on_disconnect(&self, _socket: Arc<Socket<()>>, reason: DisconnectReason) {
        self.disconnect_tx.send(reason).ok();
    }

    fn on_message(&self, msg: String, socket: Arc<Socket<()>>) {
        self.msg_tx.send(msg.clone()).ok();
        socket.emit(SendPacket::Message(msg)).ok();
    }

    fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<()>>) {
        self.bin_tx.send(data.clone()).ok();
        socket.emit(SendPacket::Binary(data)).ok();
    }
}

struct Server {
    svc: EngineIoService<RecordingHandler>,
    msg_rx: mpsc::UnboundedReceiver<String>,
    bin_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    disconnect_rx: mpsc::UnboundedReceiver<DisconnectReason>,
}

fn create_server(config: EngineIoConfig) -> Server {
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let (bin_tx, bin_rx) = mpsc::unbounded_channel();
    let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
    let handler = RecordingHandler {
        msg_tx,
        bin_tx,
        disconnect_tx,
    };
    Server {
        svc: EngineIoService::with_config(handler, config),
        msg_rx,
        bin_rx,
        disconnect_rx,
    }
}

fn get(path: &str) -> Request<Full<Bytes>> {
    Request::get(path).body(Full::new(Bytes::new())).unwrap()
}

fn post(path: &str, body: impl Into<Bytes>, content_type: &str) -> Request<Full<Bytes>> {
    Request::post(path)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(body.into()))
        .unwrap()
}

async fn body_bytes<B>(res: Response<ResponseBody<B>>) -> Bytes
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    hyper::body::to_bytes(res.into_body()).await.unwrap()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenParams {
    sid: String,
    upgrades: Vec<String>,
    ping_interval: u64,
    ping_timeout: u64,
}

/// Open a session and return its sid.
async fn open_session(server: &Server) -> String {
    let res = server
        .svc
        .clone()
        .oneshot(get("/engine.io/?EIO=3&transport=polling"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_bytes(res).await;
    let params = parse_open(std::str::from_utf8(&body).unwrap());
    params.sid
}

fn parse_open(body: &str) -> OpenParams {
    let (len, packet) = body.split_once(':').expect("payload framing");
    assert_eq!(len.parse::<usize>().unwrap(), packet.chars().count());
    assert_eq!(&packet[..1], "0");
    serde_json::from_str(&packet[1..]).unwrap()
}

#[tokio::test]
async fn polling_handshake() {
    let server = create_server(EngineIoConfig::default());
    let res = server
        .svc
        .clone()
        .oneshot(get("/engine.io/?EIO=3&transport=polling"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(CONTENT_TYPE).unwrap(),
        "text/plain; charset=UTF-8"
    );
    let body = body_bytes(res).await;
    let params = parse_open(std::str::from_utf8(&body).unwrap());
    assert_eq!(params.sid, "1");
    assert_eq!(params.upgrades, vec!["websocket".to_string()]);
    assert_eq!(params.ping_interval, 25000);
    assert_eq!(params.ping_timeout, 60000);
}

#[tokio::test]
async fn sids_are_monotonic() {
    let server = create_server(EngineIoConfig::default());
    assert_eq!(open_session(&server).await, "1");
    assert_eq!(open_session(&server).await, "2");
    assert_eq!(open_session(&server).await, "3");
}

#[tokio::test]
async fn message_roundtrip() {
    let mut server = create_server(EngineIoConfig::default());
    let sid = open_session(&server).await;

    let res = server
        .svc
        .clone()
        .oneshot(post(
            &format!("/engine.io/?EIO=3&transport=polling&sid={sid}"),
            "6:4hello",
            "text/plain; charset=UTF-8",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_bytes(res).await.as_ref(), b"ok");
    assert_eq!(server.msg_rx.recv().await.unwrap(), "hello");

    // the echo got buffered, the next poll flushes it
    let res = server
        .svc
        .clone()
        .oneshot(get(&format!("/engine.io/?EIO=3&transport=polling&sid={sid}")))
        .await
        .unwrap();
    assert_eq!(body_bytes(res).await.as_ref(), b"6:4hello");
}

#[tokio::test]
async fn binary_roundtrip_with_binary_framing() {
    let mut server = create_server(EngineIoConfig::default());
    let sid = open_session(&server).await;

    let payload = [&[1u8, 4, 0xff, 0x04][..], &[1, 2, 3]].concat();
    let res = server
        .svc
        .clone()
        .oneshot(post(
            &format!("/engine.io/?EIO=3&transport=polling&sid={sid}"),
            payload,
            "application/octet-stream",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(server.bin_rx.recv().await.unwrap(), vec![1, 2, 3]);

    let res = server
        .svc
        .clone()
        .oneshot(get(&format!("/engine.io/?EIO=3&transport=polling&sid={sid}")))
        .await
        .unwrap();
    assert_eq!(
        res.headers().get(CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
    let body = body_bytes(res).await;
    assert_eq!(body.as_ref(), &[1, 4, 0xff, 0x04, 1, 2, 3][..]);
}

#[tokio::test]
async fn b64_fallback_uses_base64_packets() {
    let mut server = create_server(EngineIoConfig::default());
    let res = server
        .svc
        .clone()
        .oneshot(get("/engine.io/?EIO=3&transport=polling&b64=1"))
        .await
        .unwrap();
    let body = body_bytes(res).await;
    let sid = parse_open(std::str::from_utf8(&body).unwrap()).sid;

    let res = server
        .svc
        .clone()
        .oneshot(post(
            &format!("/engine.io/?EIO=3&transport=polling&sid={sid}"),
            "10:b4AQIDBA==",
            "text/plain; charset=UTF-8",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(server.bin_rx.recv().await.unwrap(), vec![1, 2, 3, 4]);

    // the echo must come back base64-encoded on this session
    let res = server
        .svc
        .clone()
        .oneshot(get(&format!("/engine.io/?EIO=3&transport=polling&sid={sid}")))
        .await
        .unwrap();
    assert_eq!(
        res.headers().get(CONTENT_TYPE).unwrap(),
        "text/plain; charset=UTF-8"
    );
    assert_eq!(body_bytes(res).await.as_ref(), b"10:b4AQIDBA==");
}

#[tokio::test]
async fn jsonp_handshake_is_wrapped_in_a_callback() {
    let server = create_server(EngineIoConfig::default());
    let res = server
        .svc
        .clone()
        .oneshot(get("/engine.io/?EIO=3&transport=polling&j=4"))
        .await
        .unwrap();
    assert_eq!(
        res.headers().get(CONTENT_TYPE).unwrap(),
        "text/javascript; charset=UTF-8"
    );
    let body = body_bytes(res).await;
    let body = std::str::from_utf8(&body).unwrap();
    assert!(body.starts_with("___eio[4](\""), "unexpected body: {body}");
    assert!(body.ends_with("\");"));
    assert!(body.contains("\\\"sid\\\""));
}

#[tokio::test]
async fn ping_is_answered_with_a_pong_echoing_the_payload() {
    let server = create_server(EngineIoConfig::default());
    let sid = open_session(&server).await;

    let res = server
        .svc
        .clone()
        .oneshot(post(
            &format!("/engine.io/?EIO=3&transport=polling&sid={sid}"),
            "7:2health",
            "text/plain; charset=UTF-8",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .svc
        .clone()
        .oneshot(get(&format!("/engine.io/?EIO=3&transport=polling&sid={sid}")))
        .await
        .unwrap();
    assert_eq!(body_bytes(res).await.as_ref(), b"7:3health");
}

#[tokio::test]
async fn heartbeat_timeout_closes_the_session() {
    let mut server = create_server(
        EngineIoConfig::builder()
            .ping_interval(Duration::from_millis(50))
            .ping_timeout(Duration::from_millis(50))
            .build(),
    );
    let sid = open_session(&server).await;

    let reason = tokio::time::timeout(Duration::from_secs(1), server.disconnect_rx.recv())
        .await
        .expect("session should have timed out")
        .unwrap();
    assert_eq!(reason, DisconnectReason::HeartbeatTimeout);

    let res = server
        .svc
        .clone()
        .oneshot(get(&format!("/engine.io/?EIO=3&transport=polling&sid={sid}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn close_packet_tears_the_session_down() {
    let mut server = create_server(EngineIoConfig::default());
    let sid = open_session(&server).await;

    let res = server
        .svc
        .clone()
        .oneshot(post(
            &format!("/engine.io/?EIO=3&transport=polling&sid={sid}"),
            "1:1",
            "text/plain; charset=UTF-8",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        server.disconnect_rx.recv().await.unwrap(),
        DisconnectReason::TransportClose
    );

    let res = server
        .svc
        .clone()
        .oneshot(post(
            &format!("/engine.io/?EIO=3&transport=polling&sid={sid}"),
            "6:4hello",
            "text/plain; charset=UTF-8",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overlapping_polls_close_the_session() {
    let mut server = create_server(EngineIoConfig::default());
    let sid = open_session(&server).await;

    // first GET parks on the empty buffer
    let svc = server.svc.clone();
    let path = format!("/engine.io/?EIO=3&transport=polling&sid={sid}");
    let parked = tokio::spawn(async move { svc.oneshot(get(&path)).await.unwrap() });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let res = server
        .svc
        .clone()
        .oneshot(get(&format!("/engine.io/?EIO=3&transport=polling&sid={sid}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        server.disconnect_rx.recv().await.unwrap(),
        DisconnectReason::MultipleHttpPollingError
    );
    // the parked request is released with the close packet
    let res = parked.await.unwrap();
    assert_eq!(body_bytes(res).await.as_ref(), b"1:1");
}

#[tokio::test]
async fn unknown_sid_is_rejected() {
    let server = create_server(EngineIoConfig::default());
    let res = server
        .svc
        .clone()
        .oneshot(get("/engine.io/?EIO=3&transport=polling&sid=zzz"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_outside_engine_path_hits_the_inner_service() {
    let server = create_server(EngineIoConfig::default());
    let res = server.svc.clone().oneshot(get("/whatever")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_protocol_version_is_rejected() {
    let server = create_server(EngineIoConfig::default());
    let res = server
        .svc
        .clone()
        .oneshot(get("/engine.io/?EIO=4&transport=polling"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_post_is_rejected() {
    let server = create_server(EngineIoConfig::builder().max_payload(64).build());
    let sid = open_session(&server).await;

    let msg = "4".to_string() + &"a".repeat(200);
    let body = format!("{}:{}", msg.len(), msg);
    let res = server
        .svc
        .clone()
        .oneshot(post(
            &format!("/engine.io/?EIO=3&transport=polling&sid={sid}"),
            body,
            "text/plain; charset=UTF-8",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn websocket_handshake_returns_switching_protocols() {
    let server = create_server(EngineIoConfig::default());
    let req = Request::get("/engine.io/?EIO=3&transport=websocket")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let res = server.svc.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
    assert_eq!(
        res.headers().get("Sec-WebSocket-Accept").unwrap(),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}
