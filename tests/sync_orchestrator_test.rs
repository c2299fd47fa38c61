//! Orchestrator behaviour across several peers

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::{open_storage, peer, publish, EventLog, FakeConnector, FakePeer};
use metasync::{
	FileLock, MemoryLock, PeerKind, StorageLock, SyncError, SyncEvent, Synchronizer,
	STORAGE_LOCK_NAME,
};

fn connector_with(peers: Vec<FakePeer>) -> Arc<FakeConnector> {
	let mut connector = FakeConnector::default();
	for fake in peers {
		connector.peers.insert(fake.id.clone(), fake);
	}
	Arc::new(connector)
}

#[tokio::test]
async fn test_unreachable_peer_does_not_stop_the_run() {
	let src_dir = TempDir::new().unwrap();
	let source = open_storage(&src_dir, "http://node-c.example/");
	publish(&source, "<resource><name>One</name></resource>");
	publish(&source, "<resource><name>Two</name></resource>");
	let connector = connector_with(vec![FakePeer::from_storage("node-c", &source)]);

	let dst_dir = TempDir::new().unwrap();
	let target = Arc::new(open_storage(&dst_dir, "http://node-a.example/"));
	let lock = Arc::new(MemoryLock::new(STORAGE_LOCK_NAME));
	let events = Arc::new(EventLog::default());

	// node-b is not known to the connector and fails to connect
	let peers = vec![peer("node-b", PeerKind::Core), peer("node-c", PeerKind::Proxied)];
	let synchronizer = Synchronizer::new(target.clone(), lock.clone(), connector.clone(), peers)
		.with_callbacks(events.clone());

	let report = synchronizer.run(None).await.unwrap();
	assert_eq!(report.failed_peers.len(), 1);
	assert_eq!(report.failed_peers[0].peer, "node-b");
	assert_eq!(report.peers.len(), 1);
	assert_eq!(report.added(), 2);
	assert_eq!(report.changed_identifiers().len(), 2);
	assert_eq!(target.local_inventory("node-c").unwrap().len(), 2);

	assert_eq!(*connector.connects.lock().unwrap(), vec!["node-b".to_string(), "node-c".to_string()]);
	assert!(!lock.is_held());
	assert!(events
		.snapshot()
		.iter()
		.any(|e| matches!(e, SyncEvent::PeerFailed { peer, .. } if peer == "node-b")));
}

#[tokio::test]
async fn test_single_peer_mode() {
	let src_dir = TempDir::new().unwrap();
	let source = open_storage(&src_dir, "http://node-c.example/");
	publish(&source, "<resource><name>One</name></resource>");
	let connector = connector_with(vec![FakePeer::from_storage("node-c", &source)]);

	let dst_dir = TempDir::new().unwrap();
	let target = Arc::new(open_storage(&dst_dir, "http://node-a.example/"));
	let peers = vec![peer("node-b", PeerKind::Core), peer("node-c", PeerKind::Core)];
	let synchronizer = Synchronizer::new(
		target,
		Arc::new(MemoryLock::new(STORAGE_LOCK_NAME)),
		connector.clone(),
		peers,
	);

	let report = synchronizer.run(Some("node-c")).await.unwrap();
	assert!(report.failed_peers.is_empty());
	assert_eq!(report.added(), 1);
	assert_eq!(*connector.connects.lock().unwrap(), vec!["node-c".to_string()]);

	match synchronizer.run(Some("node-x")).await {
		Err(SyncError::InvalidConfig { .. }) => {}
		other => panic!("expected invalid config, got {:?}", other.map(|r| r.peers.len())),
	}
}

#[tokio::test]
async fn test_held_lock_fails_each_peer() {
	let dst_dir = TempDir::new().unwrap();
	let target = Arc::new(open_storage(&dst_dir, "http://node-a.example/"));
	let lock = Arc::new(FileLock::new(dst_dir.path(), STORAGE_LOCK_NAME));
	let connector = connector_with(vec![]);

	let _held = lock.acquire().unwrap();
	let peers = vec![peer("node-b", PeerKind::Core), peer("node-c", PeerKind::Core)];
	let synchronizer = Synchronizer::new(target, lock.clone(), connector.clone(), peers);

	let report = synchronizer.run(None).await.unwrap();
	assert_eq!(report.failed_peers.len(), 2);
	assert!(connector.connects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_file_lock_released_after_run() {
	let dst_dir = TempDir::new().unwrap();
	let target = Arc::new(open_storage(&dst_dir, "http://node-a.example/"));
	let lock = Arc::new(FileLock::new(dst_dir.path(), STORAGE_LOCK_NAME));
	let synchronizer = Synchronizer::new(
		target,
		lock.clone(),
		connector_with(vec![]),
		vec![peer("node-b", PeerKind::Core)],
	);

	let report = synchronizer.run(None).await.unwrap();
	assert_eq!(report.failed_peers.len(), 1);
	assert!(!lock.path().exists());
}

// vim: ts=4
