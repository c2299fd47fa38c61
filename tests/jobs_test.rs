//! Scheduled jobs running next to the server on one storage handle

mod common;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

use common::{open_storage, peer, publish, FakeConnector, FakePeer};
use metasync::config::SyncUser;
use metasync::protocol::HttpPeerClient;
use metasync::serve::{serve, ServerState};
use metasync::{
	Config, CopyStatus, JobSchedule, Jobs, MemoryLock, Peer, PeerKind, PeerTransport, StorageLock,
	STORAGE_LOCK_NAME,
};

const DOC: &str = "<resource><name>Treebank</name></resource>";

/// Poll `condition` for up to five seconds
async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
	for _ in 0..100 {
		if condition() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	false
}

#[tokio::test]
async fn test_scheduled_sync_feeds_the_server() {
	let src_dir = TempDir::new().unwrap();
	let source = open_storage(&src_dir, "http://node-b.example/");
	let a = publish(&source, DOC);
	let mut connector = FakeConnector::default();
	connector.peers.insert("node-b".to_string(), FakePeer::from_storage("node-b", &source));

	let dst_dir = TempDir::new().unwrap();
	let target = Arc::new(open_storage(&dst_dir, "http://node-a.example/"));

	let mut config = Config::default();
	config.node_id = "node-a".to_string();
	config.sync_users =
		vec![SyncUser { username: "syncuser".to_string(), password: "secret".to_string() }];
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let url = format!("http://{}/", listener.local_addr().unwrap());
	let (server_tx, server_rx) = oneshot::channel::<()>();
	let server = tokio::spawn(serve(
		listener,
		Arc::new(ServerState::new(target.clone(), config)),
		async move {
			let _ = server_rx.await;
		},
	));

	let lock = Arc::new(MemoryLock::new(STORAGE_LOCK_NAME));
	let schedule = JobSchedule {
		sync_interval: Some(Duration::from_millis(100)),
		digest_interval: Duration::from_secs(60),
	};
	let jobs = Jobs::new(
		target.clone(),
		lock.clone(),
		Arc::new(connector),
		vec![peer("node-b", PeerKind::Proxied)],
		schedule,
	);
	let (jobs_tx, jobs_rx) = oneshot::channel::<()>();
	let jobs = tokio::spawn(jobs.run(async move {
		let _ = jobs_rx.await;
	}));

	let storage = target.clone();
	let identifier = a.identifier.clone();
	assert!(wait_for(|| storage.get(&identifier).unwrap().is_some()).await);

	// The proxy copy is advertised by the server sharing the same storage
	let node_a = Peer {
		id: "node-a".to_string(),
		url,
		username: "syncuser".to_string(),
		password: "secret".to_string(),
		kind: PeerKind::Core,
	};
	let client = HttpPeerClient::login(&node_a, Duration::from_secs(10)).await.unwrap();
	let inventory = client.get_inventory().await.unwrap();
	assert_eq!(inventory.get(&a.identifier), a.digest_checksum.as_ref());
	drop(client);

	jobs_tx.send(()).unwrap();
	jobs.await.unwrap();
	server_tx.send(()).unwrap();
	server.await.unwrap().unwrap();

	assert!(!lock.is_held());
	assert_eq!(target.require(&a.identifier).unwrap().copy_status, CopyStatus::Proxy);
}

#[tokio::test]
async fn test_scheduled_digest_refresh() {
	let dir = TempDir::new().unwrap();
	let storage = Arc::new(open_storage(&dir, "http://node-a.example/"));
	let mut record = publish(&storage, DOC);
	let old = chrono::Utc::now() - chrono::Duration::days(2);
	record.digest_modified = Some(old);
	storage.save(&mut record).unwrap();

	// The first refresh finds the lock held and is skipped
	let lock = Arc::new(MemoryLock::new(STORAGE_LOCK_NAME));
	let held = lock.acquire().unwrap();

	let schedule = JobSchedule { sync_interval: None, digest_interval: Duration::from_millis(100) };
	let jobs = Jobs::new(
		storage.clone(),
		lock.clone(),
		Arc::new(FakeConnector::default()),
		Vec::new(),
		schedule,
	);
	let (jobs_tx, jobs_rx) = oneshot::channel::<()>();
	let jobs = tokio::spawn(jobs.run(async move {
		let _ = jobs_rx.await;
	}));

	tokio::time::sleep(Duration::from_millis(250)).await;
	assert_eq!(storage.require(&record.identifier).unwrap().digest_modified, Some(old));

	held.release();
	let check = storage.clone();
	let identifier = record.identifier.clone();
	assert!(wait_for(|| check.require(&identifier).unwrap().digest_modified != Some(old)).await);

	jobs_tx.send(()).unwrap();
	jobs.await.unwrap();
	assert!(!lock.is_held());
}

// vim: ts=4
