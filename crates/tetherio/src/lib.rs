//! A socket.io server implementation, speaking the v2 protocol over the
//! [`tetherio-engine`](tetherio_engine) transport layer.
//!
//! Namespaces are registered on a [`SocketIo`] handle; each connecting
//! socket gets typed event callbacks, acknowledgements, rooms and
//! broadcasting:
//!
//! ```no_run
//! use serde_json::Value;
//! use tetherio::{AckSender, SocketIo};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (svc, io) = SocketIo::new_svc();
//!
//!     io.ns("/", |socket| async move {
//!         socket.on("message", |socket, data: Value, bin, _ack: AckSender<_>| async move {
//!             socket.bin(bin).emit("message-back", data).ok();
//!         });
//!         socket.on("join", |socket, room: String, _bin, _ack: AckSender<_>| async move {
//!             socket.join(vec![room.clone()]);
//!             socket.within(room).emit("new-member", socket.sid).ok();
//!         });
//!     });
//!
//!     hyper::Server::bind(&"127.0.0.1:3000".parse()?)
//!         .serve(hyper::service::make_service_fn(move |_| {
//!             let svc = svc.clone();
//!             async move { Ok::<_, std::convert::Infallible>(svc) }
//!         }))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! The service answers under `/socket.io` by default and falls through to
//! an inner [`tower::Service`](tower::Service) for every other path; use
//! [`SocketIo::new_layer`] to stack it on an existing one.

pub mod adapter;
pub mod errors;
pub mod packet;

mod client;
mod config;
mod handler;
mod handshake;
mod io;
mod layer;
mod ns;
mod operators;
mod service;
mod socket;

pub use config::{SocketIoConfig, TransportType};
pub use errors::{AckError, BroadcastError, Error, SendError};
pub use handler::{AckResponse, AckSender};
pub use handshake::Handshake;
pub use io::{SocketIo, SocketIoBuilder};
pub use layer::SocketIoLayer;
pub use ns::Namespace;
pub use operators::Operators;
pub use service::SocketIoService;
pub use socket::{DisconnectReason, Socket};
