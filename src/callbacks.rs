//! Hook and callback traits for storage and synchronisation events

use crate::record::StorageRecord;

/// Post-commit hook called by the storage layer.
///
/// Runs synchronously after a record change has been persisted. Index
/// refreshes and similar side effects belong here.
pub trait StorageHook: Send + Sync {
	/// Called after `update_storage` or an upsert persisted a change
	fn on_storage_updated(&self, _record: &StorageRecord) {}

	/// Called after a record and its folder were removed
	fn on_record_removed(&self, _identifier: &str) {}
}

/// Hook that does nothing
pub struct NoHook;

impl StorageHook for NoHook {}

/// Structured event emitted during a synchronisation run
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
	PeerStarted { peer: String },
	RecordAdded { peer: String, identifier: String },
	RecordUpdated { peer: String, identifier: String },
	RecordRemoved { peer: String, identifier: String },
	RecordFailed { peer: String, identifier: String, reason: String },
	/// An incoming copy tried to replace a local master copy
	AuthorityViolation { peer: String, identifier: String },
	PeerFinished { peer: String, added: usize, updated: usize, deleted: usize, failed: usize },
	PeerFailed { peer: String, reason: String },
}

/// Consumer of synchronisation events (notifiers, reporting)
pub trait SyncCallbacks: Send + Sync {
	fn on_event(&self, event: &SyncEvent);
}

/// Callbacks that ignore every event
pub struct NoCallbacks;

impl SyncCallbacks for NoCallbacks {
	fn on_event(&self, _event: &SyncEvent) {}
}

impl<F> SyncCallbacks for F
where
	F: Fn(&SyncEvent) + Send + Sync,
{
	fn on_event(&self, event: &SyncEvent) {
		self(event)
	}
}


// vim: ts=4
