//! # slot-connector: Game server link
//!
//! [`RemoteSpinProvider`] implements `SpinProvider` over a WebSocket or
//! newline-delimited TCP connection. Spin requests and responses are JSON
//! frames matched by ID; see [`protocol`] for the frame catalogue.
//!
//! ```ignore
//! let provider = ConnectorBuilder::from_url("ws://localhost:8080/slots")?
//!     .auth(&token)
//!     .connect()
//!     .await?;
//! ```

pub mod connector;
pub mod protocol;

pub use connector::*;
pub use protocol::*;
