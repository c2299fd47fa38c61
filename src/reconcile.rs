//! Inventory diffing and plan application for one peer
//!
//! The local inventory holds only records previously pulled from the peer.
//! One pass over the remote inventory classifies every identifier:
//!
//! - unknown locally and not claimed by another source: add
//! - known with a different digest: update
//! - local entries the peer no longer advertises: delete
//!
//! Each plan entry is applied independently; a failing entry is logged and
//! counted without stopping the rest.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::callbacks::{SyncCallbacks, SyncEvent};
use crate::error::SyncError;
use crate::logging::*;
use crate::protocol::{Inventory, Peer, PeerTransport};
use crate::record::StorageRecord;
use crate::storage::Storage;

/// Classified identifiers for one peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
	pub to_add: BTreeSet<String>,
	pub to_update: BTreeSet<String>,
	pub to_delete: BTreeSet<String>,
	/// Advertised identifiers already owned by, or attributed to, another source
	pub skipped: BTreeSet<String>,
}

impl ReconcilePlan {
	pub fn is_empty(&self) -> bool {
		self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
	}
}

/// Diff a local and a remote inventory.
///
/// `is_foreign` reports whether an identifier missing from `local` is
/// already held locally from a different source.
pub fn plan<F>(local: &Inventory, remote: &Inventory, mut is_foreign: F) -> ReconcilePlan
where
	F: FnMut(&str) -> bool,
{
	let mut remaining = local.clone();
	let mut plan = ReconcilePlan::default();

	for (identifier, remote_digest) in remote {
		match remaining.remove(identifier) {
			None => {
				if is_foreign(identifier) {
					plan.skipped.insert(identifier.clone());
				} else {
					plan.to_add.insert(identifier.clone());
				}
			}
			Some(local_digest) => {
				if &local_digest != remote_digest {
					plan.to_update.insert(identifier.clone());
				}
			}
		}
	}

	plan.to_delete = remaining.keys().cloned().collect();
	plan
}

/// Identifiers applied during one synchronisation run, with the peer that supplied them
#[derive(Debug, Default)]
pub struct SyncRunCache {
	applied: HashMap<String, String>,
}

impl SyncRunCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn mark_applied(&mut self, identifier: &str, peer: &str) {
		self.applied.insert(identifier.to_string(), peer.to_string());
	}

	pub fn applied_by(&self, identifier: &str) -> Option<&str> {
		self.applied.get(identifier).map(|s| s.as_str())
	}

	pub fn len(&self) -> usize {
		self.applied.len()
	}

	pub fn is_empty(&self) -> bool {
		self.applied.is_empty()
	}

	pub fn clear(&mut self) {
		self.applied.clear();
	}
}

/// Outcome of one peer pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerReport {
	pub peer: String,
	pub added: usize,
	pub updated: usize,
	pub deleted: usize,
	pub skipped: usize,
	pub failed: usize,
	/// Identifiers added or updated, in application order
	pub changed_ids: Vec<String>,
}

#[derive(Clone, Copy)]
enum Upsert {
	Add,
	Update,
}

pub struct Reconciler {
	storage: Arc<Storage>,
	callbacks: Arc<dyn SyncCallbacks>,
}

impl Reconciler {
	pub fn new(storage: Arc<Storage>, callbacks: Arc<dyn SyncCallbacks>) -> Self {
		Reconciler { storage, callbacks }
	}

	/// Run one reconciliation pass against a connected peer.
	///
	/// Only peer-level failures (inventory fetch, local database access) are
	/// returned as errors; record-level failures are counted in the report.
	pub async fn run(
		&self,
		peer: &Peer,
		transport: &dyn PeerTransport,
		cache: &mut SyncRunCache,
	) -> Result<PeerReport, SyncError> {
		self.callbacks.on_event(&SyncEvent::PeerStarted { peer: peer.id.clone() });

		debug!(peer = %peer.id, session = transport.peer_id(), "Fetching inventory");
		let remote = transport.get_inventory().await?;
		let local = self.storage.local_inventory(&peer.id)?;
		let sources: HashMap<String, Option<String>> = self
			.storage
			.records()?
			.into_iter()
			.map(|record| (record.identifier, record.source_node))
			.collect();

		let plan = plan(&local, &remote, |identifier| {
			if let Some(other) = cache.applied_by(identifier) {
				if other != peer.id {
					return true;
				}
			}
			match sources.get(identifier) {
				Some(source) => source.as_deref() != Some(peer.id.as_str()),
				None => false,
			}
		});

		info!(
			peer = %peer.id,
			remote = remote.len(),
			local = local.len(),
			add = plan.to_add.len(),
			update = plan.to_update.len(),
			delete = plan.to_delete.len(),
			"Reconciling"
		);

		let mut report = PeerReport { peer: peer.id.clone(), ..Default::default() };

		for identifier in &plan.skipped {
			warn!(
				peer = %peer.id,
				identifier = %identifier,
				"Identifier already held from a different source, not adding"
			);
			report.skipped += 1;
		}

		for identifier in &plan.to_add {
			self.apply_upsert(peer, transport, &remote, identifier, Upsert::Add, cache, &mut report)
				.await;
		}
		for identifier in &plan.to_update {
			self.apply_upsert(peer, transport, &remote, identifier, Upsert::Update, cache, &mut report)
				.await;
		}

		for identifier in &plan.to_delete {
			match self.storage.remove_record(identifier) {
				Ok(_) => {
					info!(peer = %peer.id, identifier = %identifier, "Removed record");
					report.deleted += 1;
					self.callbacks.on_event(&SyncEvent::RecordRemoved {
						peer: peer.id.clone(),
						identifier: identifier.clone(),
					});
				}
				Err(e) => {
					error!(peer = %peer.id, identifier = %identifier, "Failed to remove record: {}", e);
					self.record_failed(peer, identifier, &e.to_string(), &mut report);
				}
			}
		}

		self.callbacks.on_event(&SyncEvent::PeerFinished {
			peer: peer.id.clone(),
			added: report.added,
			updated: report.updated,
			deleted: report.deleted,
			failed: report.failed,
		});
		Ok(report)
	}

	#[allow(clippy::too_many_arguments)]
	async fn apply_upsert(
		&self,
		peer: &Peer,
		transport: &dyn PeerTransport,
		remote: &Inventory,
		identifier: &str,
		kind: Upsert,
		cache: &mut SyncRunCache,
		report: &mut PeerReport,
	) {
		let digest = match remote.get(identifier) {
			Some(digest) => digest,
			None => return,
		};

		match self.fetch_and_store(peer, transport, identifier, digest).await {
			Ok(_) => {
				cache.mark_applied(identifier, &peer.id);
				report.changed_ids.push(identifier.to_string());
				let event = match kind {
					Upsert::Add => {
						report.added += 1;
						info!(peer = %peer.id, identifier = %identifier, "Added record");
						SyncEvent::RecordAdded { peer: peer.id.clone(), identifier: identifier.to_string() }
					}
					Upsert::Update => {
						report.updated += 1;
						info!(peer = %peer.id, identifier = %identifier, "Updated record");
						SyncEvent::RecordUpdated {
							peer: peer.id.clone(),
							identifier: identifier.to_string(),
						}
					}
				};
				self.callbacks.on_event(&event);
			}
			Err(e) if e.is_authority_violation() => {
				warn!(
					peer = %peer.id,
					identifier = %identifier,
					security = true,
					"Peer tried to overwrite a local master copy: {}",
					e
				);
				self.callbacks.on_event(&SyncEvent::AuthorityViolation {
					peer: peer.id.clone(),
					identifier: identifier.to_string(),
				});
				self.record_failed(peer, identifier, &e.to_string(), report);
			}
			Err(e) => {
				error!(peer = %peer.id, identifier = %identifier, "Failed to apply record: {}", e);
				self.record_failed(peer, identifier, &e.to_string(), report);
			}
		}
	}

	async fn fetch_and_store(
		&self,
		peer: &Peer,
		transport: &dyn PeerTransport,
		identifier: &str,
		digest: &str,
	) -> Result<StorageRecord, SyncError> {
		let full = transport.get_full_metadata(identifier, digest).await?;
		let record = self.storage.add_or_update_resource(
			identifier,
			&full,
			peer.copy_status(),
			&peer.id,
		)?;
		Ok(record)
	}

	fn record_failed(&self, peer: &Peer, identifier: &str, reason: &str, report: &mut PeerReport) {
		report.failed += 1;
		self.callbacks.on_event(&SyncEvent::RecordFailed {
			peer: peer.id.clone(),
			identifier: identifier.to_string(),
			reason: reason.to_string(),
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn inventory(entries: &[(&str, &str)]) -> Inventory {
		entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	fn set(ids: &[&str]) -> BTreeSet<String> {
		ids.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn test_plan_add_and_delete() {
		let local = inventory(&[("A", "d1"), ("B", "d2")]);
		let remote = inventory(&[("B", "d2"), ("C", "d3")]);
		let plan = plan(&local, &remote, |_| false);

		assert_eq!(plan.to_add, set(&["C"]));
		assert!(plan.to_update.is_empty());
		assert_eq!(plan.to_delete, set(&["A"]));
	}

	#[test]
	fn test_plan_update_on_digest_change() {
		let local = inventory(&[("A", "d1")]);
		let remote = inventory(&[("A", "d2")]);
		let plan = plan(&local, &remote, |_| false);

		assert_eq!(plan.to_update, set(&["A"]));
		assert!(plan.to_add.is_empty());
		assert!(plan.to_delete.is_empty());
	}

	#[test]
	fn test_plan_skips_foreign_identifiers() {
		let local = Inventory::new();
		let remote = inventory(&[("M", "d1"), ("N", "d2")]);
		let plan = plan(&local, &remote, |id| id == "M");

		assert_eq!(plan.skipped, set(&["M"]));
		assert_eq!(plan.to_add, set(&["N"]));
	}

	#[test]
	fn test_plan_unchanged_is_empty() {
		let local = inventory(&[("A", "d1")]);
		assert!(plan(&local, &local.clone(), |_| false).is_empty());
	}

	#[test]
	fn test_run_cache() {
		let mut cache = SyncRunCache::new();
		cache.mark_applied("A", "node-b");
		assert_eq!(cache.applied_by("A"), Some("node-b"));
		assert_eq!(cache.len(), 1);
		cache.clear();
		assert!(cache.is_empty());
	}
}

// vim: ts=4
