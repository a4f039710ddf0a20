use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt, TryStreamExt};
use http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use http::{HeaderValue, Request, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::handler::EngineIoHandler;
use crate::packet::{OpenPacket, Packet};
use crate::payload::BINARY_MESSAGE_TYPE;
use crate::sid::Sid;
use crate::socket::{DisconnectReason, Socket};
use crate::transport::TransportType;

/// Handle a websocket handshake request: spawn a task that waits for the
/// http upgrade and return the `101 Switching Protocols` response.
///
/// Without a `sid` a fresh websocket session is created; with one the
/// existing polling session goes through the upgrade handshake.
pub fn new_req<H, R, B>(
    engine: Arc<EngineIo<H>>,
    sid: Option<Sid>,
    req: Request<R>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
{
    let ws_key = req
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .ok_or(Error::UpgradeError)?
        .clone();

    let req = req.map(|_| ());
    tokio::spawn(async move {
        if let Err(e) = on_init(engine, sid, req).await {
            debug!("websocket connection error: {:?}", e);
        }
    });

    ws_response(&ws_key)
}

/// Wait for the http upgrade, run the engine.io handshake and then pump
/// packets in both directions until the session dies.
async fn on_init<H>(engine: Arc<EngineIo<H>>, sid: Option<Sid>, mut req: Request<()>) -> Result<(), Error>
where
    H: EngineIoHandler,
{
    let conn = hyper::upgrade::on(&mut req)
        .await
        .map_err(|_| Error::UpgradeError)?;
    let mut ws = WebSocketStream::from_raw_socket(conn, Role::Server, None).await;

    let socket = match sid {
        None => {
            let (parts, _) = req.into_parts();
            let socket = engine.create_session(TransportType::Websocket, parts, true);
            init_handshake(&engine, socket.id, &mut ws).await?;
            socket
        }
        Some(sid) => {
            let socket = engine.get_socket(sid)?;
            if socket.is_ws() {
                return Err(Error::UpgradeError);
            }
            upgrade_handshake(&socket, &mut ws).await?;
            socket
        }
    };

    let (tx, rx) = ws.split();
    let w_engine = engine.clone();
    let w_socket = socket.clone();
    tokio::spawn(async move {
        if let Err(e) = forward_to_client(w_socket.clone(), tx).await {
            debug!("[sid={}] error closing websocket: {:?}", w_socket.id, e);
            w_engine.close_session(w_socket.id, DisconnectReason::TransportError);
        }
    });
    forward_to_handler(engine, socket, rx).await
}

/// Send the open packet as a single text frame, websocket sessions skip
/// the payload framing entirely.
async fn init_handshake<H, S>(
    engine: &Arc<EngineIo<H>>,
    sid: Sid,
    ws: &mut WebSocketStream<S>,
) -> Result<(), Error>
where
    H: EngineIoHandler,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let packet = Packet::Open(OpenPacket::new(TransportType::Websocket, sid, &engine.config));
    ws.send(Message::Text(packet.try_into()?)).await?;
    Ok(())
}

/// Run the upgrade handshake over an established polling session:
///
/// 1. the client probes with a `ping` carrying `probe`, echoed in a `pong`;
/// 2. the polling buffer is paused, any parked GET is released with a noop;
/// 3. the client confirms with an `upgrade` packet;
/// 4. the session is rebound to the websocket transport.
///
/// A failure after the pause resumes the polling buffer so the session
/// keeps working on its previous transport.
async fn upgrade_handshake<D, S>(
    socket: &Arc<Socket<D>>,
    ws: &mut WebSocketStream<S>,
) -> Result<(), Error>
where
    D: Default + Send + Sync + 'static,
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("[sid={}] websocket upgrade handshake", socket.id);
    match recv_packet(ws).await? {
        Packet::Ping(probe) if probe == "probe" => {
            ws.send(Message::Text(Packet::Pong(probe).try_into()?)).await?;
        }
        packet => return Err(Error::BadPacket(packet)),
    }

    socket.pauser.pause().await;

    match recv_packet(ws).await {
        Ok(Packet::Upgrade) => (),
        Ok(packet) => {
            socket.pauser.resume();
            return Err(Error::BadPacket(packet));
        }
        Err(e) => {
            socket.pauser.resume();
            return Err(e);
        }
    }

    // wait for any in-flight polling flush to release the buffer before
    // rebinding, so no packet is flushed on both transports
    let _rx = socket.internal_rx.lock().await;
    socket.upgrade_to_websocket();
    debug!("[sid={}] upgrade complete", socket.id);
    Ok(())
}

async fn recv_packet<S>(ws: &mut WebSocketStream<S>) -> Result<Packet, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match ws.try_next().await? {
            Some(Message::Text(text)) => return Packet::try_from(text),
            Some(Message::Ping(_) | Message::Pong(_)) => continue,
            _ => return Err(Error::UpgradeError),
        }
    }
}

/// Drain the session buffer into the websocket sink.
async fn forward_to_client<D, S>(
    socket: Arc<Socket<D>>,
    mut tx: SplitSink<WebSocketStream<S>, Message>,
) -> Result<(), Error>
where
    D: Default + Send + Sync + 'static,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut rx = socket.internal_rx.lock().await;
    while let Some(packet) = rx.recv().await {
        match packet {
            Packet::Close => {
                tx.send(Message::Close(None)).await.ok();
                rx.close();
                break;
            }
            // stale filler from the polling era, nothing to forward
            Packet::Noop => continue,
            Packet::Binary(data) => {
                let mut frame = Vec::with_capacity(data.len() + 1);
                frame.push(BINARY_MESSAGE_TYPE);
                frame.extend_from_slice(&data);
                tx.send(Message::Binary(frame)).await?;
            }
            packet => {
                tx.send(Message::Text(packet.try_into()?)).await?;
            }
        }
    }
    Ok(())
}

/// Feed incoming websocket frames to the handler until the connection or
/// the session closes.
async fn forward_to_handler<H, S>(
    engine: Arc<EngineIo<H>>,
    socket: Arc<Socket<H::Data>>,
    mut rx: SplitStream<WebSocketStream<S>>,
) -> Result<(), Error>
where
    H: EngineIoHandler,
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = rx.next().await {
        let res = match msg {
            Ok(Message::Text(text)) => match Packet::try_from(text) {
                Ok(Packet::Close) => {
                    engine.close_session(socket.id, DisconnectReason::TransportClose);
                    break;
                }
                Ok(Packet::Ping(data)) => socket.ping_received(data),
                Ok(Packet::Message(msg)) => {
                    engine.handler.on_message(msg, socket.clone());
                    Ok(())
                }
                Ok(packet) => Err(Error::BadPacket(packet)),
                Err(e) => Err(e),
            },
            Ok(Message::Binary(mut data)) => {
                if data.first() == Some(&BINARY_MESSAGE_TYPE) {
                    data.remove(0);
                    engine.handler.on_binary(data, socket.clone());
                    Ok(())
                } else {
                    Err(Error::InvalidPacketType)
                }
            }
            Ok(Message::Close(_)) => {
                engine.close_session(socket.id, DisconnectReason::TransportClose);
                break;
            }
            Ok(_) => Ok(()),
            Err(e) => {
                debug!("[sid={}] websocket error: {:?}", socket.id, e);
                engine.close_session(socket.id, DisconnectReason::TransportError);
                break;
            }
        };
        if let Err(e) = res {
            debug!("[sid={}] invalid packet: {:?}", socket.id, e);
            engine.close_session(socket.id, DisconnectReason::PacketParsingError);
            break;
        }
    }
    Ok(())
}

fn ws_response<B>(ws_key: &HeaderValue) -> Result<Response<ResponseBody<B>>, Error> {
    let derived = derive_accept_key(ws_key.as_bytes());
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(UPGRADE, HeaderValue::from_static("websocket"))
        .header(CONNECTION, HeaderValue::from_static("Upgrade"))
        .header(SEC_WEBSOCKET_ACCEPT, derived)
        .body(ResponseBody::empty_response())
        .map_err(Error::Http)
}
