//! Peer synchronisation protocol
//!
//! Wire format, transport traits and the HTTP client used to pull from
//! peer nodes. The reconciler depends only on the traits.

pub mod http_client;
pub mod traits;
pub mod types;

pub use http_client::{HttpConnector, HttpPeerClient};
pub use traits::{PeerConnector, PeerTransport};
pub use types::*;

// vim: ts=4
