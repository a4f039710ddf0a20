use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Request, Response, StatusCode};
use http_body::Full;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use tetherio::adapter::LocalAdapter;
use tetherio::{AckSender, SocketIo, SocketIoService};
use tetherio_engine::body::ResponseBody;

type Svc = SocketIoService<LocalAdapter>;

/// Frame a packet the engine.io v3 string way: `<char count>:<packet>`.
fn frame(packet: &str) -> String {
    format!("{}:{}", packet.chars().count(), packet)
}

fn get(path: &str) -> Request<Full<Bytes>> {
    Request::get(path).body(Full::new(Bytes::new())).unwrap()
}

fn post(path: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
    Request::post(path)
        .header(CONTENT_TYPE, "text/plain; charset=UTF-8")
        .body(Full::new(body.into()))
        .unwrap()
}

async fn body_string<B>(res: Response<ResponseBody<B>>) -> String
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Open an engine.io session over polling and return its sid.
async fn open_session(svc: &Svc) -> String {
    let res = svc
        .clone()
        .oneshot(get("/socket.io/?EIO=3&transport=polling&b64=1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_string(res).await;
    let (_, packet) = body.split_once(':').expect("payload framing");
    let open: Value = serde_json::from_str(&packet[1..]).unwrap();
    open["sid"].as_str().unwrap().to_string()
}

async fn send(svc: &Svc, sid: &str, packet: &str) {
    let res = svc
        .clone()
        .oneshot(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}"),
            frame(packet),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

async fn send_status(svc: &Svc, sid: &str, packet: &str) -> StatusCode {
    let res = svc
        .clone()
        .oneshot(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}"),
            frame(packet),
        ))
        .await
        .unwrap();
    res.status()
}

/// Poll the session; blocks until the server has something to flush.
async fn poll(svc: &Svc, sid: &str) -> String {
    let res = svc
        .clone()
        .oneshot(get(&format!(
            "/socket.io/?EIO=3&transport=polling&sid={sid}"
        )))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_string(res).await
}

/// Open a session and bind it to the root namespace, draining the
/// connect ack. The sleep lets the spawned connection callback register
/// its event handlers before the test goes on.
async fn connect(svc: &Svc, sid: &str) {
    send(svc, sid, "40").await;
    assert_eq!(poll(svc, sid).await, frame("40"));
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn connect_to_the_root_namespace() {
    let (svc, io) = SocketIo::new_svc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    io.ns("/", move |socket| {
        let tx = tx.clone();
        async move {
            tx.send(socket.sid.to_string()).ok();
        }
    });

    let sid = open_session(&svc).await;
    send(&svc, &sid, "40").await;
    assert_eq!(poll(&svc, &sid).await, frame("40"));
    assert_eq!(rx.recv().await.unwrap(), sid);
}

#[tokio::test]
async fn unknown_namespace_is_refused_on_the_wire() {
    let (svc, io) = SocketIo::new_svc();
    io.ns("/", |_socket| async {});

    let sid = open_session(&svc).await;
    send(&svc, &sid, "40/unknown,").await;
    assert_eq!(
        poll(&svc, &sid).await,
        frame("44/unknown,\"Invalid namespace\"")
    );
}

#[tokio::test]
async fn connect_to_a_custom_namespace_with_auth_query() {
    let (svc, io) = SocketIo::new_svc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    io.ns("/admin", move |socket| {
        let tx = tx.clone();
        async move {
            tx.send(socket.handshake.auth.clone()).ok();
        }
    });

    let sid = open_session(&svc).await;
    send(&svc, &sid, "40/admin?token=s3cr3t").await;
    assert_eq!(poll(&svc, &sid).await, frame("40/admin,"));
    assert_eq!(rx.recv().await.unwrap().as_deref(), Some("token=s3cr3t"));
}

#[tokio::test]
async fn event_reaches_the_typed_handler_and_is_echoed() {
    let (svc, io) = SocketIo::new_svc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    io.ns("/", move |socket| {
        let tx = tx.clone();
        async move {
            socket.on("chat", move |socket, data: String, _bin, _ack: AckSender<_>| {
                let tx = tx.clone();
                async move {
                    tx.send(data.clone()).ok();
                    socket.emit("chat-back", data).ok();
                }
            });
        }
    });

    let sid = open_session(&svc).await;
    connect(&svc, &sid).await;

    send(&svc, &sid, "42[\"chat\",\"hello\"]").await;
    assert_eq!(rx.recv().await.unwrap(), "hello");
    assert_eq!(
        poll(&svc, &sid).await,
        frame("42[\"chat-back\",\"hello\"]")
    );
}

#[tokio::test]
async fn client_requested_ack_is_answered() {
    let (svc, io) = SocketIo::new_svc();
    io.ns("/", |socket| async move {
        socket.on("ping", |_socket, data: String, _bin, ack: AckSender<_>| {
            async move {
                ack.send(data).ok();
            }
        });
    });

    let sid = open_session(&svc).await;
    connect(&svc, &sid).await;

    send(&svc, &sid, "421[\"ping\",\"pong-me\"]").await;
    assert_eq!(poll(&svc, &sid).await, frame("431[\"pong-me\"]"));
}

#[tokio::test]
async fn server_emit_with_ack_resolves_on_the_client_answer() {
    let (svc, io) = SocketIo::new_svc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    io.ns("/", move |socket| {
        let tx = tx.clone();
        async move {
            let res = socket.emit_with_ack::<String>("needs-ack", "data").await;
            tx.send(res).ok();
        }
    });

    let sid = open_session(&svc).await;
    send(&svc, &sid, "40").await;
    assert_eq!(poll(&svc, &sid).await, frame("40"));
    // the emit of the connection callback
    assert_eq!(poll(&svc, &sid).await, frame("421[\"needs-ack\",\"data\"]"));

    send(&svc, &sid, "431[\"the-answer\"]").await;
    let (data, binary) = rx.recv().await.unwrap().unwrap();
    assert_eq!(data, "the-answer");
    assert!(binary.is_empty());
}

#[tokio::test]
async fn binary_event_with_base64_attachment() {
    let (svc, io) = SocketIo::new_svc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    io.ns("/", move |socket| {
        let tx = tx.clone();
        async move {
            socket.on("bin", move |socket, data: Value, bin, _ack: AckSender<_>| {
                let tx = tx.clone();
                async move {
                    tx.send(bin.clone()).ok();
                    socket.bin(bin).emit("bin-back", data).ok();
                }
            });
        }
    });

    let sid = open_session(&svc).await;
    connect(&svc, &sid).await;

    // the header announces one attachment, sent right after as a base64
    // engine.io binary packet
    let header = "451-[\"bin\",{\"_placeholder\":true,\"num\":0}]";
    let payload = frame(header) + &frame("b4AQID");
    let res = svc
        .clone()
        .oneshot(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}"),
            payload,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(rx.recv().await.unwrap(), vec![vec![1, 2, 3]]);

    let expected = frame("451-[\"bin-back\",{\"_placeholder\":true,\"num\":0}]") + &frame("b4AQID");
    assert_eq!(poll(&svc, &sid).await, expected);
}

#[tokio::test]
async fn room_broadcast_excludes_the_sender() {
    let (svc, io) = SocketIo::new_svc();
    io.ns("/", |socket| async move {
        socket.join(vec!["lobby".to_string()]);
        socket.on("shout", |socket, data: String, _bin, _ack: AckSender<_>| {
            async move {
                socket.to("lobby").emit("heard", data).ok();
            }
        });
    });

    let listener = open_session(&svc).await;
    connect(&svc, &listener).await;
    let sender = open_session(&svc).await;
    connect(&svc, &sender).await;

    send(&svc, &sender, "42[\"shout\",\"hey\"]").await;
    assert_eq!(
        poll(&svc, &listener).await,
        frame("42[\"heard\",\"hey\"]")
    );

    // the sender itself gets nothing
    let svc2 = svc.clone();
    let pending = tokio::time::timeout(Duration::from_millis(100), async move {
        poll(&svc2, &sender).await
    })
    .await;
    assert!(pending.is_err());
}

#[tokio::test]
async fn broadcast_from_the_io_handle() {
    let (svc, io) = SocketIo::new_svc();
    io.ns("/", |_socket| async {});

    let sid = open_session(&svc).await;
    connect(&svc, &sid).await;

    io.of("/")
        .unwrap()
        .emit("announcement", json!({ "severity": "info" }))
        .unwrap();
    assert_eq!(
        poll(&svc, &sid).await,
        frame("42[\"announcement\",{\"severity\":\"info\"}]")
    );
}

#[tokio::test]
async fn server_side_disconnect_leaves_the_session_open() {
    let (svc, io) = SocketIo::new_svc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    io.ns("/", move |socket| {
        let tx = tx.clone();
        async move {
            let dtx = tx.clone();
            socket.on_disconnect(move |_socket, reason| {
                dtx.send(reason).ok();
            });
            socket.on("bye", |socket, _data: Value, _bin, _ack: AckSender<_>| {
                async move {
                    socket.disconnect().ok();
                }
            });
        }
    });

    let sid = open_session(&svc).await;
    connect(&svc, &sid).await;

    send(&svc, &sid, "42[\"bye\",null]").await;
    assert_eq!(
        rx.recv().await.unwrap(),
        tetherio::DisconnectReason::ServerNSDisconnect
    );
    // the namespace disconnect packet rides on the still-open session
    assert_eq!(poll(&svc, &sid).await, frame("41"));

    // the engine.io session still answers
    send(&svc, &sid, "2").await;
    assert_eq!(poll(&svc, &sid).await, frame("3"));
}

#[tokio::test]
async fn client_disconnect_packet_closes_the_socket() {
    let (svc, io) = SocketIo::new_svc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    io.ns("/", move |socket| {
        let tx = tx.clone();
        async move {
            socket.on_disconnect(move |_socket, reason| {
                tx.send(reason).ok();
            });
        }
    });

    let sid = open_session(&svc).await;
    connect(&svc, &sid).await;

    send(&svc, &sid, "41").await;
    assert_eq!(
        rx.recv().await.unwrap(),
        tetherio::DisconnectReason::ClientNSDisconnect
    );
}

#[tokio::test]
async fn malformed_packet_tears_the_session_down() {
    let (svc, io) = SocketIo::new_svc();
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let (close_tx, mut close_rx) = mpsc::unbounded_channel();
    io.ns("/", move |socket| {
        let err_tx = err_tx.clone();
        let close_tx = close_tx.clone();
        async move {
            socket.on_error(move |_socket, err| {
                err_tx.send(err.to_string()).ok();
            });
            socket.on_disconnect(move |_socket, reason| {
                close_tx.send(reason).ok();
            });
        }
    });

    let sid = open_session(&svc).await;
    connect(&svc, &sid).await;

    // an event whose name is not a string never parses
    send(&svc, &sid, "42[42]").await;
    assert!(err_rx.recv().await.is_some());
    assert_eq!(
        close_rx.recv().await.unwrap(),
        tetherio::DisconnectReason::PacketParsing
    );

    // the session is gone from the engine, a ping is refused
    assert_eq!(send_status(&svc, &sid, "2").await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn engine_session_close_disconnects_the_socket() {
    let (svc, io) = SocketIo::new_svc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    io.ns("/", move |socket| {
        let tx = tx.clone();
        async move {
            socket.on_disconnect(move |_socket, reason| {
                tx.send(reason).ok();
            });
        }
    });

    let sid = open_session(&svc).await;
    connect(&svc, &sid).await;

    // engine.io close packet tears the whole session down
    send(&svc, &sid, "1").await;
    assert_eq!(
        rx.recv().await.unwrap(),
        tetherio::DisconnectReason::TransportClose
    );
}
