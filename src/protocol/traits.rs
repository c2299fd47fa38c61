//! Transport traits used by the reconciler
//!
//! The reconciler and orchestrator depend only on these traits, so tests can
//! substitute in-memory peers for the HTTP client.

use async_trait::async_trait;

use super::types::{FullMetadata, Inventory, Peer, PeerResult};

/// An authenticated session with one peer
#[async_trait]
pub trait PeerTransport: Send + Sync {
	/// Id of the peer this session talks to
	fn peer_id(&self) -> &str;

	/// Identifier to digest for every record the peer shares
	async fn get_inventory(&self) -> PeerResult<Inventory>;

	/// Fetch one record, verified against `expected_digest`
	async fn get_full_metadata(
		&self,
		identifier: &str,
		expected_digest: &str,
	) -> PeerResult<FullMetadata>;
}

/// Opens sessions with configured peers
#[async_trait]
pub trait PeerConnector: Send + Sync {
	async fn connect(&self, peer: &Peer) -> PeerResult<Box<dyn PeerTransport>>;
}

// vim: ts=4
