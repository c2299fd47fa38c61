//! Synchronisation orchestrator
//!
//! Drives one reconciliation pass per configured peer, one peer at a time.
//! The storage lock is held for the whole of each pass and released on every
//! exit path. A failing peer is logged and the remaining peers still run.

use std::sync::Arc;

use crate::callbacks::{NoCallbacks, SyncCallbacks, SyncEvent};
use crate::error::SyncError;
use crate::lock::StorageLock;
use crate::logging::*;
use crate::protocol::{Peer, PeerConnector};
use crate::reconcile::{PeerReport, Reconciler, SyncRunCache};
use crate::storage::Storage;

/// A peer whose pass failed as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFailure {
	pub peer: String,
	pub reason: String,
}

/// Outcome of a synchronisation run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
	pub peers: Vec<PeerReport>,
	pub failed_peers: Vec<PeerFailure>,
}

impl SyncReport {
	pub fn added(&self) -> usize {
		self.peers.iter().map(|p| p.added).sum()
	}

	pub fn updated(&self) -> usize {
		self.peers.iter().map(|p| p.updated).sum()
	}

	pub fn deleted(&self) -> usize {
		self.peers.iter().map(|p| p.deleted).sum()
	}

	pub fn skipped(&self) -> usize {
		self.peers.iter().map(|p| p.skipped).sum()
	}

	pub fn failed_records(&self) -> usize {
		self.peers.iter().map(|p| p.failed).sum()
	}

	/// Identifiers added or updated across all peers
	pub fn changed_identifiers(&self) -> Vec<String> {
		self.peers.iter().flat_map(|p| p.changed_ids.iter().cloned()).collect()
	}
}

pub struct Synchronizer {
	storage: Arc<Storage>,
	lock: Arc<dyn StorageLock>,
	connector: Arc<dyn PeerConnector>,
	peers: Vec<Peer>,
	callbacks: Arc<dyn SyncCallbacks>,
}

impl Synchronizer {
	pub fn new(
		storage: Arc<Storage>,
		lock: Arc<dyn StorageLock>,
		connector: Arc<dyn PeerConnector>,
		peers: Vec<Peer>,
	) -> Self {
		Synchronizer { storage, lock, connector, peers, callbacks: Arc::new(NoCallbacks) }
	}

	/// Deliver sync events to `callbacks`
	pub fn with_callbacks(mut self, callbacks: Arc<dyn SyncCallbacks>) -> Self {
		self.callbacks = callbacks;
		self
	}

	pub fn peers(&self) -> &[Peer] {
		&self.peers
	}

	/// Synchronise with every configured peer, or only with `only_peer`
	pub async fn run(&self, only_peer: Option<&str>) -> Result<SyncReport, SyncError> {
		let selected: Vec<&Peer> = match only_peer {
			Some(name) => {
				let peer = self.peers.iter().find(|p| p.id == name).ok_or_else(|| {
					SyncError::InvalidConfig { message: format!("Unknown peer '{}'", name) }
				})?;
				vec![peer]
			}
			None => self.peers.iter().collect(),
		};

		let reconciler = Reconciler::new(self.storage.clone(), self.callbacks.clone());
		let mut cache = SyncRunCache::new();
		let mut report = SyncReport::default();

		for peer in selected {
			info!(peer = %peer.id, "Synchronising with {}", peer.url);
			match self.sync_peer(&reconciler, peer, &mut cache).await {
				Ok(peer_report) => {
					info!(
						peer = %peer.id,
						added = peer_report.added,
						updated = peer_report.updated,
						deleted = peer_report.deleted,
						skipped = peer_report.skipped,
						failed = peer_report.failed,
						"Peer synchronised"
					);
					report.peers.push(peer_report);
				}
				Err(e) => {
					error!(peer = %peer.id, "Synchronisation failed: {}", e);
					self.callbacks.on_event(&SyncEvent::PeerFailed {
						peer: peer.id.clone(),
						reason: e.to_string(),
					});
					report.failed_peers.push(PeerFailure { peer: peer.id.clone(), reason: e.to_string() });
				}
			}
		}

		debug!("Clearing run cache with {} entries", cache.len());
		cache.clear();
		Ok(report)
	}

	async fn sync_peer(
		&self,
		reconciler: &Reconciler,
		peer: &Peer,
		cache: &mut SyncRunCache,
	) -> Result<PeerReport, SyncError> {
		let _guard = self.lock.acquire()?;
		debug!(peer = %peer.id, lock = self.lock.name(), "Storage lock acquired");
		let transport = self.connector.connect(peer).await?;
		reconciler.run(peer, transport.as_ref(), cache).await
	}
}

// vim: ts=4
