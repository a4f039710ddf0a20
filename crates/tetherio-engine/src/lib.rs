//! An engine.io (protocol v3) server implementation, exposed as a
//! [`tower::Service`] so it can run standalone under
//! [`hyper`] or be plugged in an existing service stack.
//!
//! Both official transports are provided: http long-polling (with the
//! `b64` and jsonp fallbacks) and websocket, including the hot upgrade
//! from polling to websocket.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tetherio_engine::{DisconnectReason, EngineIoHandler, EngineIoService, SendPacket, Socket};
//!
//! #[derive(Debug, Default)]
//! struct EchoHandler;
//!
//! impl EngineIoHandler for EchoHandler {
//!     type Data = ();
//!
//!     fn on_connect(&self, socket: Arc<Socket<()>>) {
//!         println!("socket connect {}", socket.id);
//!     }
//!     fn on_disconnect(&self, socket: Arc<Socket<()>>, reason: DisconnectReason) {
//!         println!("socket disconnect {}: {:?}", socket.id, reason);
//!     }
//!     fn on_message(&self, msg: String, socket: Arc<Socket<()>>) {
//!         socket.emit(SendPacket::Message(msg)).ok();
//!     }
//!     fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<()>>) {
//!         socket.emit(SendPacket::Binary(data)).ok();
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let svc = EngineIoService::new(EchoHandler);
//!     let make_svc = hyper::service::make_service_fn(move |_| {
//!         let svc = svc.clone();
//!         async move { Ok::<_, std::convert::Infallible>(svc) }
//!     });
//!     hyper::Server::bind(&"0.0.0.0:3000".parse()?)
//!         .serve(make_svc)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod config;
pub mod errors;
pub mod handler;
pub mod layer;
pub mod packet;
pub mod service;
pub mod sid;
pub mod socket;
pub mod transport;

pub mod futures;
pub mod payload;

pub(crate) mod engine;

pub use config::{EngineIoConfig, EngineIoConfigBuilder};
pub use errors::Error;
pub use handler::EngineIoHandler;
pub use layer::EngineIoLayer;
pub use packet::SendPacket;
pub use service::{EngineIoService, NotFoundService};
pub use sid::Sid;
pub use socket::{DisconnectReason, Socket};
pub use transport::TransportType;
