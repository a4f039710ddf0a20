use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use tetherio_engine::packet::Packet;
use tetherio_engine::{SendPacket, Sid, TransportType};

use crate::errors::Error;
use crate::transport::polling::PollingClient;
use crate::transport::ws::WsClient;
use crate::transport::{build_uri, TransportRx, TransportTx};

/// Dial settings: the transports to try, in order.
#[derive(Debug, Clone)]
pub struct Dialer {
    transports: Vec<TransportType>,
}

impl Default for Dialer {
    fn default() -> Self {
        Self {
            transports: vec![TransportType::Polling, TransportType::Websocket],
        }
    }
}

impl Dialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict or reorder the transports tried by [`dial`](Dialer::dial).
    ///
    /// # Panics
    ///
    /// Panics if the iterator is empty.
    pub fn transports(mut self, transports: impl IntoIterator<Item = TransportType>) -> Self {
        self.transports = transports.into_iter().collect();
        assert!(
            !self.transports.is_empty(),
            "at least one transport is required"
        );
        self
    }

    /// Dial `url` with each configured transport until one completes the
    /// open handshake, and return the connected session.
    pub async fn dial(&self, url: &str) -> Result<Client, Error> {
        let mut last_err = Error::InvalidUrl(url.to_string());
        for transport in &self.transports {
            match Client::connect(*transport, url).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    debug!("dial over {} failed: {}", transport, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

/// An engine.io session seen from the client end.
///
/// Messages queued with [`emit`](Client::emit) are flushed by a writer
/// task, inbound messages are read with [`recv`](Client::recv). The
/// heartbeat runs in the background: a ping goes out every
/// `ping_interval` and the session dies when nothing comes back within
/// `ping_interval + ping_timeout`.
pub struct Client {
    /// The session id allocated by the server.
    pub sid: Sid,
    transport: TransportType,
    out_tx: mpsc::Sender<Packet>,
    in_rx: Mutex<mpsc::Receiver<SendPacket>>,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Client {
    async fn connect(transport: TransportType, url: &str) -> Result<Self, Error> {
        let (open, tx, rx) = match transport {
            TransportType::Polling => {
                let mut client = PollingClient::new(url)?;
                let open = client.handshake().await?;
                (
                    open,
                    TransportTx::Polling(client.clone()),
                    TransportRx::Polling(client),
                )
            }
            TransportType::Websocket => {
                let uri = build_uri(url, TransportType::Websocket)?;
                let mut client = WsClient::connect(&uri).await?;
                let open = client.handshake().await?;
                let (sink, source) = client.split();
                (
                    open,
                    TransportTx::Websocket(sink),
                    TransportRx::Websocket(source),
                )
            }
        };

        let ping_interval = Duration::from_millis(open.ping_interval);
        let deadline = ping_interval + Duration::from_millis(open.ping_timeout);

        let (out_tx, out_rx) = mpsc::channel(128);
        let (in_tx, in_rx) = mpsc::channel(128);
        let connected = Arc::new(AtomicBool::new(true));

        let tasks = vec![
            tokio::spawn(read_loop(rx, in_tx, deadline, connected.clone())),
            tokio::spawn(write_loop(tx, out_rx, connected.clone())),
            tokio::spawn(heartbeat_loop(out_tx.clone(), ping_interval)),
        ];

        debug!("[sid={}] session open over {}", open.sid, transport);
        Ok(Self {
            sid: open.sid,
            transport,
            out_tx,
            in_rx: Mutex::new(in_rx),
            connected,
            tasks,
        })
    }

    /// The next message from the server, `None` once the session is
    /// closed and drained.
    pub async fn recv(&self) -> Option<SendPacket> {
        self.in_rx.lock().await.recv().await
    }

    /// Queue a message for the writer task.
    pub fn emit(&self, packet: SendPacket) -> Result<(), Error> {
        if !self.connected() {
            return Err(Error::Closed);
        }
        self.out_tx.try_send(packet.into())?;
        Ok(())
    }

    /// The transport the session was dialed over.
    pub fn transport_type(&self) -> TransportType {
        self.transport
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the session: tell the server, then let the background tasks
    /// wind down.
    pub fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("[sid={}] closing session", self.sid);
            self.out_tx.try_send(Packet::Close).ok();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("sid", &self.sid)
            .field("transport", &self.transport)
            .field("connected", &self.connected)
            .finish()
    }
}

/// Drive the inbound side. Every packet resets the read deadline, pongs
/// and fillers do nothing else, a close packet or a dead transport ends
/// the session.
async fn read_loop(
    mut rx: TransportRx,
    in_tx: mpsc::Sender<SendPacket>,
    deadline: Duration,
    connected: Arc<AtomicBool>,
) {
    loop {
        let packets = match tokio::time::timeout(deadline, rx.recv()).await {
            Ok(Ok(packets)) => packets,
            Ok(Err(e)) => {
                debug!("read loop error: {}", e);
                break;
            }
            Err(_) => {
                debug!("read deadline elapsed, closing the session");
                break;
            }
        };
        for packet in packets {
            let msg = match packet {
                Packet::Message(msg) => SendPacket::Message(msg),
                Packet::Binary(data) => SendPacket::Binary(data),
                Packet::Close => {
                    connected.store(false, Ordering::SeqCst);
                    return;
                }
                _ => continue,
            };
            if in_tx.send(msg).await.is_err() {
                return;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

/// Flush the outbound queue, batching whatever is already waiting into a
/// single payload.
async fn write_loop(
    mut tx: TransportTx,
    mut out_rx: mpsc::Receiver<Packet>,
    connected: Arc<AtomicBool>,
) {
    while let Some(packet) = out_rx.recv().await {
        let mut packets = vec![packet];
        while let Ok(packet) = out_rx.try_recv() {
            packets.push(packet);
        }
        let closing = packets.iter().any(|p| matches!(p, Packet::Close));
        if let Err(e) = tx.send(packets).await {
            debug!("write loop error: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    connected.store(false, Ordering::SeqCst);
}

/// The v3 heartbeat is client-driven: ping every `ping_interval`, the
/// server echoes a pong the read loop counts against its deadline.
async fn heartbeat_loop(out_tx: mpsc::Sender<Packet>, ping_interval: Duration) {
    let mut interval = tokio::time::interval(ping_interval);
    interval.tick().await;
    loop {
        interval.tick().await;
        if out_tx.send(Packet::Ping(String::new())).await.is_err() {
            break;
        }
    }
}
