//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tempfile::TempDir;

use metasync::protocol::PeerResult;
use metasync::{
	FullMetadata, Inventory, Peer, PeerConnector, PeerError, PeerKind, PeerTransport, Storage,
	StorageRecord, SyncCallbacks, SyncEvent,
};

pub fn open_storage(tmp: &TempDir, base_url: &str) -> Storage {
	Storage::open(
		&tmp.path().join("storage"),
		&tmp.path().join("records.redb"),
		base_url,
		std::time::Duration::from_secs(86400),
	)
	.unwrap()
}

/// Create and publish a master copy
pub fn publish(storage: &Storage, document: &str) -> StorageRecord {
	let mut record = storage.create_record(document).unwrap();
	record.publish();
	storage.update_storage(&mut record, false).unwrap();
	record
}

pub fn peer(id: &str, kind: PeerKind) -> Peer {
	Peer {
		id: id.to_string(),
		url: format!("http://{}.example/", id),
		username: "syncuser".to_string(),
		password: "secret".to_string(),
		kind,
	}
}

/// In-memory peer serving a snapshot of another node's storage
#[derive(Clone, Default)]
pub struct FakePeer {
	pub id: String,
	pub inventory: Inventory,
	pub records: HashMap<String, FullMetadata>,
	/// Identifiers whose fetch fails with a connection error
	pub failing: HashSet<String>,
}

impl FakePeer {
	/// Snapshot everything `storage` shares
	pub fn from_storage(id: &str, storage: &Storage) -> Self {
		let inventory = storage.shared_inventory().unwrap();
		let records = inventory
			.keys()
			.map(|identifier| (identifier.clone(), storage.full_metadata(identifier).unwrap()))
			.collect();
		FakePeer { id: id.to_string(), inventory, records, failing: HashSet::new() }
	}
}

#[async_trait]
impl PeerTransport for FakePeer {
	fn peer_id(&self) -> &str {
		&self.id
	}

	async fn get_inventory(&self) -> PeerResult<Inventory> {
		Ok(self.inventory.clone())
	}

	async fn get_full_metadata(
		&self,
		identifier: &str,
		expected_digest: &str,
	) -> PeerResult<FullMetadata> {
		if self.failing.contains(identifier) {
			return Err(PeerError::Connection {
				url: format!("fake://{}", self.id),
				message: "connection reset".to_string(),
			});
		}
		let full = self.records.get(identifier).cloned().ok_or_else(|| PeerError::Http {
			url: format!("fake://{}", self.id),
			status: 404,
		})?;
		let actual = full.digest();
		if actual != expected_digest {
			return Err(PeerError::CorruptData {
				identifier: identifier.to_string(),
				expected: expected_digest.to_string(),
				actual,
			});
		}
		Ok(full)
	}
}

/// Connector handing out fake peers; unknown peers are unreachable
#[derive(Default)]
pub struct FakeConnector {
	pub peers: HashMap<String, FakePeer>,
	pub connects: Mutex<Vec<String>>,
}

#[async_trait]
impl PeerConnector for FakeConnector {
	async fn connect(&self, peer: &Peer) -> PeerResult<Box<dyn PeerTransport>> {
		self.connects.lock().unwrap().push(peer.id.clone());
		match self.peers.get(&peer.id) {
			Some(fake) => Ok(Box::new(fake.clone())),
			None => Err(PeerError::Connection {
				url: peer.url.clone(),
				message: "connection refused".to_string(),
			}),
		}
	}
}

/// Callbacks collecting every event
#[derive(Default)]
pub struct EventLog {
	pub events: Mutex<Vec<SyncEvent>>,
}

impl EventLog {
	pub fn snapshot(&self) -> Vec<SyncEvent> {
		self.events.lock().unwrap().clone()
	}
}

impl SyncCallbacks for EventLog {
	fn on_event(&self, event: &SyncEvent) {
		self.events.lock().unwrap().push(event.clone());
	}
}

// vim: ts=4
