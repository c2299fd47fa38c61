//! Periodic jobs of a serving node
//!
//! The record database admits one open handle at a time, so a node running
//! `serve` also runs its synchronisation and digest refresh in-process over
//! the storage it serves from. Both jobs take the storage lock; a tick that
//! finds the lock held is skipped and retried on the next one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use crate::admin;
use crate::config::Config;
use crate::error::SyncError;
use crate::lock::{FileLock, StorageLock, STORAGE_LOCK_NAME};
use crate::logging::*;
use crate::protocol::{HttpConnector, Peer, PeerConnector};
use crate::storage::Storage;
use crate::sync::Synchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSchedule {
	/// `None` disables the synchronisation job
	pub sync_interval: Option<Duration>,
	pub digest_interval: Duration,
}

impl JobSchedule {
	pub fn from_config(config: &Config) -> Self {
		JobSchedule {
			sync_interval: config.sync_interval(),
			digest_interval: config.digest_interval(),
		}
	}
}

pub struct Jobs {
	storage: Arc<Storage>,
	lock: Arc<dyn StorageLock>,
	synchronizer: Synchronizer,
	schedule: JobSchedule,
}

impl Jobs {
	pub fn new(
		storage: Arc<Storage>,
		lock: Arc<dyn StorageLock>,
		connector: Arc<dyn PeerConnector>,
		peers: Vec<Peer>,
		schedule: JobSchedule,
	) -> Self {
		let synchronizer = Synchronizer::new(storage.clone(), lock.clone(), connector, peers);
		Jobs { storage, lock, synchronizer, schedule }
	}

	/// Jobs over HTTP peers with the configured lock and schedule
	pub fn from_config(config: &Config, storage: Arc<Storage>) -> Self {
		Jobs::new(
			storage,
			Arc::new(FileLock::new(&config.lock_dir(), STORAGE_LOCK_NAME)),
			Arc::new(HttpConnector::new(config.request_timeout())),
			config.peers(),
			JobSchedule::from_config(config),
		)
	}

	/// Run both jobs on their intervals until `shutdown` completes.
	///
	/// Each job runs once right away. A job in progress is finished before
	/// shutdown is observed.
	pub async fn run<F>(self, shutdown: F)
	where
		F: Future<Output = ()>,
	{
		tokio::pin!(shutdown);
		let mut digest_timer = timer(self.schedule.digest_interval);
		let mut sync_timer = self.schedule.sync_interval.map(timer);

		info!(
			peers = self.synchronizer.peers().len(),
			sync_interval = ?self.schedule.sync_interval,
			digest_interval = ?self.schedule.digest_interval,
			"Background jobs started"
		);

		loop {
			tokio::select! {
				_ = &mut shutdown => break,
				_ = digest_timer.tick() => self.refresh_digests().await,
				_ = next_tick(&mut sync_timer) => self.synchronise().await,
			}
		}
		debug!("Background jobs stopped");
	}

	async fn synchronise(&self) {
		match self.synchronizer.run(None).await {
			Ok(report) => info!(
				added = report.added(),
				updated = report.updated(),
				deleted = report.deleted(),
				failed_records = report.failed_records(),
				failed_peers = report.failed_peers.len(),
				"Scheduled synchronisation finished"
			),
			Err(e) => error!("Scheduled synchronisation failed: {}", e),
		}
	}

	async fn refresh_digests(&self) {
		let storage = self.storage.clone();
		let lock = self.lock.clone();
		let result =
			tokio::task::spawn_blocking(move || admin::update_digests(&storage, lock.as_ref())).await;

		match result {
			Ok(Ok(report)) => {
				debug!(checked = report.checked, refreshed = report.refreshed, "Digests checked")
			}
			Ok(Err(SyncError::Lock(e))) => {
				info!(lock = self.lock.name(), "Skipping digest refresh: {}", e)
			}
			Ok(Err(e)) => error!("Digest refresh failed: {}", e),
			Err(e) => error!("Digest refresh task failed: {}", e),
		}
	}
}

fn timer(period: Duration) -> Interval {
	let mut interval = tokio::time::interval(period);
	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
	interval
}

async fn next_tick(timer: &mut Option<Interval>) {
	match timer {
		Some(timer) => {
			timer.tick().await;
		}
		None => std::future::pending().await,
	}
}

// vim: ts=4
