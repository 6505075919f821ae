//! Client SDK for the edit-lock coordinator.
//!
//! - [`Transport`]: the one seam between sessions and the network.
//!   [`WsTransport`] talks to `elk-daemon` over `/v1/ws`.
//! - [`EditSession`]: one open edit view. Acquires, heartbeats and releases
//!   a lease, and reports `Denied` with the holder when someone else has it.
//! - [`LockListView`]: a record list's view of who is editing what.
//! - [`LocksClient`]: one-shot HTTP snapshot fetch for tools.
//!
//! Sessions receive their transport as an `Arc<dyn Transport>`; there is no
//! process-wide connection.

pub mod http;
pub mod list_view;
pub mod session;
pub mod transport;
pub mod ws_transport;

pub use http::LocksClient;
pub use list_view::LockListView;
pub use session::{EditSession, SessionState};
pub use transport::{Transport, TransportError};
pub use ws_transport::WsTransport;
