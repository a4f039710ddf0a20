use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use tetherio_engine::{
    DisconnectReason, EngineIoConfig, EngineIoHandler, EngineIoService, SendPacket, Socket,
};
use tetherio_engine_client::{Dialer, Error, TransportType};

/// Echoes everything back and records disconnects.
#[derive(Debug, Clone)]
struct EchoHandler {
    disconnect_tx: mpsc::UnboundedSender<DisconnectReason>,
}

impl EngineIoHandler for EchoHandler {
    type Data = ();

    fn on_connect(&self, _socket: Arc<Socket<()>>) {}

    fn on_disconnect(&self, _socket: Arc<Socket<()>>, reason: DisconnectReason) {
        self.disconnect_tx.send(reason).ok();
    }

    fn on_message(&self, msg: String, socket: Arc<Socket<()>>) {
        socket.emit(SendPacket::Message(msg)).ok();
    }

    fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<()>>) {
        socket.emit(SendPacket::Binary(data)).ok();
    }
}

/// Bind an echo server on a random loopback port and return its url.
async fn serve() -> (String, mpsc::UnboundedReceiver<DisconnectReason>) {
    let config = EngineIoConfig::builder()
        .ping_interval(Duration::from_millis(50))
        .ping_timeout(Duration::from_millis(100))
        .build();
    let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
    let svc = EngineIoService::with_config(EchoHandler { disconnect_tx }, config);
    let make_svc = hyper::service::make_service_fn(move |_| {
        let svc = svc.clone();
        async move { Ok::<_, Infallible>(svc) }
    });
    let server = hyper::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    (format!("http://{addr}/engine.io/"), disconnect_rx)
}

#[tokio::test]
async fn polling_dial_and_echo() {
    let (url, _disconnect_rx) = serve().await;
    let client = Dialer::new()
        .transports([TransportType::Polling])
        .dial(&url)
        .await
        .unwrap();
    assert_eq!(client.transport_type(), TransportType::Polling);

    client
        .emit(SendPacket::Message("hello".to_string()))
        .unwrap();
    assert_eq!(
        client.recv().await,
        Some(SendPacket::Message("hello".to_string()))
    );
}

#[tokio::test]
async fn polling_echoes_binary_with_the_binary_framing() {
    let (url, _disconnect_rx) = serve().await;
    let client = Dialer::new()
        .transports([TransportType::Polling])
        .dial(&url)
        .await
        .unwrap();

    client.emit(SendPacket::Binary(vec![1, 2, 3])).unwrap();
    assert_eq!(client.recv().await, Some(SendPacket::Binary(vec![1, 2, 3])));
}

#[tokio::test]
async fn websocket_dial_and_echo() {
    let (url, _disconnect_rx) = serve().await;
    let client = Dialer::new()
        .transports([TransportType::Websocket])
        .dial(&url)
        .await
        .unwrap();
    assert_eq!(client.transport_type(), TransportType::Websocket);

    client
        .emit(SendPacket::Message("over ws".to_string()))
        .unwrap();
    client.emit(SendPacket::Binary(vec![4, 2])).unwrap();
    assert_eq!(
        client.recv().await,
        Some(SendPacket::Message("over ws".to_string()))
    );
    assert_eq!(client.recv().await, Some(SendPacket::Binary(vec![4, 2])));
}

#[tokio::test]
async fn heartbeat_keeps_the_session_alive() {
    let (url, mut disconnect_rx) = serve().await;
    let client = Dialer::new()
        .transports([TransportType::Polling])
        .dial(&url)
        .await
        .unwrap();

    // several ping cycles worth of silence from the application
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(client.connected());
    assert!(disconnect_rx.try_recv().is_err());
}

#[tokio::test]
async fn close_tears_the_server_session_down() {
    let (url, mut disconnect_rx) = serve().await;
    let client = Dialer::new()
        .transports([TransportType::Polling])
        .dial(&url)
        .await
        .unwrap();

    client.close();
    let reason = tokio::time::timeout(Duration::from_secs(1), disconnect_rx.recv())
        .await
        .expect("server never saw the close");
    assert_eq!(reason, Some(DisconnectReason::TransportClose));
    assert!(!client.connected());
    assert!(client.emit(SendPacket::Message("late".to_string())).is_err());
}

#[tokio::test]
async fn dialing_a_non_engineio_endpoint_is_an_invalid_open() {
    // a server whose first packet is a pong, not an open
    let make_svc = hyper::service::make_service_fn(|_| async {
        Ok::<_, Infallible>(hyper::service::service_fn(|_req| async {
            Ok::<_, Infallible>(hyper::Response::new(hyper::Body::from("1:3")))
        }))
    });
    let server = hyper::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);

    let err = Dialer::new()
        .transports([TransportType::Polling])
        .dial(&format!("http://{addr}/engine.io/"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOpen));
}
