//! An engine.io (protocol v3) client.
//!
//! [`Dialer`] opens a session over http long-polling or websocket and
//! returns a [`Client`] exchanging messages through the same
//! [`SendPacket`] type the server side uses. The heartbeat runs in the
//! background, so a connected client only has to read and write.
//!
//! ```no_run
//! use tetherio_engine_client::{Dialer, SendPacket};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Dialer::new().dial("http://localhost:3000/engine.io/").await?;
//!     client.emit(SendPacket::Message("hello".to_string()))?;
//!     while let Some(msg) = client.recv().await {
//!         println!("{:?}", msg);
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;

mod client;
mod transport;

pub use client::{Client, Dialer};
pub use errors::Error;
pub use tetherio_engine::{SendPacket, Sid, TransportType};
