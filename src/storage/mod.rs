//! Persisted storage records and their on-disk artifacts
//!
//! Every shared record owns a folder `{root}/{identifier}/` holding:
//!
//! - `metadata-XXXX.xml`, one per revision
//! - `storage-global.json`, attributes synchronised with peers
//! - `storage-local.json`, node-private bookkeeping
//! - `resource.tar.gz`, the digest archive (master and proxy copies)
//! - an optional `archive.*` binary payload
//!
//! Internal records live only in the database.

pub mod db;
pub mod digest;
pub mod document;

use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::callbacks::{NoHook, StorageHook};
use crate::checksum;
use crate::config::Config;
use crate::error::StorageError;
use crate::logging::*;
use crate::protocol::{FullMetadata, Inventory};
use crate::record::{
	generate_identifier, metadata_file_name, GlobalAttributes, StorageRecord,
	ALLOWED_ARCHIVE_EXTENSIONS, GLOBAL_ATTRIBUTES_FILE, LOCAL_ATTRIBUTES_FILE, PAYLOAD_BASE_NAME,
};
use crate::types::CopyStatus;

use db::RecordDb;

/// Prefix of folders used while replacing a record from a peer
pub const STAGING_PREFIX: &str = ".staging-";

/// What a storage update changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageUpdate {
	pub source_url_updated: bool,
	pub metadata_updated: bool,
	pub global_updated: bool,
	pub digest_updated: bool,
	pub local_updated: bool,
}

impl StorageUpdate {
	pub fn any(&self) -> bool {
		self.source_url_updated
			|| self.metadata_updated
			|| self.global_updated
			|| self.digest_updated
			|| self.local_updated
	}
}

/// Record store plus artifact tree
pub struct Storage {
	root: PathBuf,
	db: RecordDb,
	base_url: String,
	max_digest_age: Duration,
	hook: Arc<dyn StorageHook>,
}

impl Storage {
	/// Open a storage tree, creating the root and the database if needed
	pub fn open(
		root: &Path,
		database_path: &Path,
		base_url: &str,
		max_digest_age: std::time::Duration,
	) -> Result<Self, StorageError> {
		fs::create_dir_all(root)?;
		let db = RecordDb::open(database_path)?;
		let max_digest_age = Duration::from_std(max_digest_age).map_err(|e| {
			StorageError::Validation { message: format!("Invalid maximum digest age: {}", e) }
		})?;
		Ok(Storage {
			root: root.to_path_buf(),
			db,
			base_url: base_url.to_string(),
			max_digest_age,
			hook: Arc::new(NoHook),
		})
	}

	pub fn from_config(config: &Config) -> Result<Self, StorageError> {
		Self::open(
			&config.storage_root,
			&config.database_path(),
			&config.base_url,
			config.max_digest_age(),
		)
	}

	/// Install a post-commit hook
	pub fn with_hook(mut self, hook: Arc<dyn StorageHook>) -> Self {
		self.hook = hook;
		self
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	/// Storage folder of a record
	pub fn folder(&self, identifier: &str) -> PathBuf {
		self.root.join(identifier)
	}

	pub fn get(&self, identifier: &str) -> Result<Option<StorageRecord>, StorageError> {
		self.db.get(identifier)
	}

	pub fn require(&self, identifier: &str) -> Result<StorageRecord, StorageError> {
		self.db
			.get(identifier)?
			.ok_or_else(|| StorageError::NotFound { identifier: identifier.to_string() })
	}

	pub fn records(&self) -> Result<Vec<StorageRecord>, StorageError> {
		self.db.all()
	}

	/// Create a new internal master copy from a metadata document
	pub fn create_record(&self, document: &str) -> Result<StorageRecord, StorageError> {
		let mut record = StorageRecord::new_master(document);
		self.save(&mut record)?;
		self.update_storage(&mut record, false)?;
		Ok(record)
	}

	/// Validate and persist a record without touching its artifacts.
	///
	/// Assigns an identifier if the record has none.
	pub fn save(&self, record: &mut StorageRecord) -> Result<(), StorageError> {
		match &record.staged_document {
			Some(doc) => {
				document::canonicalize(doc)?;
			}
			None => document::validate(&record.metadata)?,
		}
		self.ensure_identifier(record)?;
		self.db.put(record)
	}

	fn ensure_identifier(&self, record: &mut StorageRecord) -> Result<(), StorageError> {
		if !record.identifier.is_empty() {
			return Ok(());
		}
		loop {
			let candidate = generate_identifier();
			if !self.db.contains(&candidate)? && !self.folder(&candidate).exists() {
				record.identifier = candidate;
				return Ok(());
			}
			debug!("Identifier collision on {}, generating another", candidate);
		}
	}

	/// Bring the record's derived artifacts in line with its content.
	///
	/// Staged document content is canonicalised and absorbed. For shared
	/// records the metadata file, both attribute snapshots and the digest
	/// are rewritten where they changed; `force_digest` rebuilds everything.
	/// The record is persisted and the hook notified if anything changed.
	pub fn update_storage(
		&self,
		record: &mut StorageRecord,
		force_digest: bool,
	) -> Result<StorageUpdate, StorageError> {
		self.ensure_identifier(record)?;
		let is_new = !self.db.contains(&record.identifier)?;
		let folder = self.folder(&record.identifier);

		let update = self.refresh(&folder, record, force_digest)?;

		if update.any() || is_new {
			self.db.put(record)?;
		}
		if update.any() {
			debug!(identifier = %record.identifier, ?update, "Storage updated");
			self.hook.on_storage_updated(record);
		}
		Ok(update)
	}

	/// Artifact refresh shared by `update_storage` and the peer upsert
	fn refresh(
		&self,
		folder: &Path,
		record: &mut StorageRecord,
		force_digest: bool,
	) -> Result<StorageUpdate, StorageError> {
		// Validation happens before any filesystem access
		let canonical = match &record.staged_document {
			Some(doc) => Some(document::canonicalize(doc)?),
			None => {
				document::validate(&record.metadata)?;
				None
			}
		};

		let mut update = StorageUpdate::default();

		if record.is_master() && record.source_url != self.base_url {
			record.source_url = self.base_url.clone();
			update.source_url_updated = true;
		}

		if let Some(doc) = canonical {
			if doc != record.metadata {
				let first_content = record.metadata.is_empty();
				record.metadata = doc;
				record.modified = Utc::now();
				update.metadata_updated = true;
				if record.is_master() && record.publication_status.is_shared() && !first_content {
					record.revision += 1;
				}
			}
		}
		record.staged_document = None;

		if !record.publication_status.is_shared() {
			return Ok(update);
		}

		fs::create_dir_all(folder)?;

		let metadata_path = folder.join(metadata_file_name(record.revision));
		if force_digest || !metadata_path.exists() {
			fs::write(&metadata_path, record.metadata.as_bytes())?;
		}

		let global_json = record.global_attributes().to_json()?;
		let global_path = folder.join(GLOBAL_ATTRIBUTES_FILE);
		if global_json != record.global_storage {
			update.global_updated = true;
			record.global_storage = global_json;
		}
		if update.global_updated || force_digest || !global_path.exists() {
			fs::write(&global_path, record.global_storage.as_bytes())?;
		}

		if force_digest
			|| update.metadata_updated
			|| update.global_updated
			|| record.digest_checksum.is_none()
		{
			digest::create_digest(folder, record)?;
			update.digest_updated = true;
		}

		let local_json = record.local_attributes().to_json()?;
		let local_path = folder.join(LOCAL_ATTRIBUTES_FILE);
		if local_json != record.local_storage {
			update.local_updated = true;
			record.local_storage = local_json;
		}
		if update.local_updated || force_digest || !local_path.exists() {
			fs::write(&local_path, record.local_storage.as_bytes())?;
		}

		Ok(update)
	}

	/// Current digest checksum, refreshed first if it has gone stale.
	///
	/// A fresh digest of a shared record gets its `digest_last_checked`
	/// stamped instead.
	pub fn get_digest_checksum(
		&self,
		record: &mut StorageRecord,
	) -> Result<Option<String>, StorageError> {
		if !record.publication_status.is_shared() {
			return Ok(record.digest_checksum.clone());
		}
		let now = Utc::now();
		if digest::is_stale(record, now, self.max_digest_age) {
			debug!(identifier = %record.identifier, "Refreshing stale digest");
			self.update_storage(record, true)?;
		} else {
			record.digest_last_checked = Some(now);
			record.local_storage = record.local_attributes().to_json()?;
			let folder = self.folder(&record.identifier);
			if folder.is_dir() {
				fs::write(folder.join(LOCAL_ATTRIBUTES_FILE), record.local_storage.as_bytes())?;
			}
			self.db.put(record)?;
		}
		Ok(record.digest_checksum.clone())
	}

	/// First existing binary payload among the allowed archive extensions
	pub fn download_path(&self, record: &StorageRecord) -> Option<PathBuf> {
		let folder = self.folder(&record.identifier);
		ALLOWED_ARCHIVE_EXTENSIONS
			.iter()
			.map(|ext| folder.join(format!("{}.{}", PAYLOAD_BASE_NAME, ext)))
			.find(|path| path.is_file())
	}

	/// Recompute the payload checksum of a master copy.
	///
	/// Returns whether the stored checksum changed.
	pub fn compute_checksum(&self, record: &mut StorageRecord) -> Result<bool, StorageError> {
		if !record.is_master() {
			return Ok(false);
		}
		let checksum = match self.download_path(record) {
			Some(path) => Some(checksum::checksum_reader(fs::File::open(path)?)?),
			None => None,
		};
		if checksum == record.checksum {
			return Ok(false);
		}
		record.checksum = checksum;
		self.db.put(record)?;
		Ok(true)
	}

	/// Authority-checked upsert of a record fetched from a peer as `identifier`.
	///
	/// Fails with a validation error if the payload describes a different
	/// record, and with `AuthorityViolation` if a local master copy exists and
	/// the incoming copy is not a master copy. Otherwise the fetched content
	/// is staged in a scratch folder, any previous record is removed and the
	/// staged folder takes its place.
	pub fn add_or_update_resource(
		&self,
		identifier: &str,
		full: &FullMetadata,
		copy_status: CopyStatus,
		source_node: &str,
	) -> Result<StorageRecord, StorageError> {
		let metadata = std::str::from_utf8(&full.metadata).map_err(|e| StorageError::Validation {
			message: format!("Metadata document is not UTF-8: {}", e),
		})?;
		let global_json = std::str::from_utf8(&full.global_json).map_err(|e| {
			StorageError::Validation { message: format!("Global attributes are not UTF-8: {}", e) }
		})?;
		document::validate(metadata)?;
		let global = GlobalAttributes::from_json(global_json)?;
		if global.identifier != identifier {
			return Err(StorageError::Validation {
				message: format!(
					"Payload requested as {} describes record {:?}",
					identifier, global.identifier
				),
			});
		}
		if !checksum::is_checksum(&global.identifier) {
			return Err(StorageError::Validation {
				message: format!("Invalid identifier {:?}", global.identifier),
			});
		}
		if !global.publication_status.is_shared() {
			return Err(StorageError::Validation {
				message: format!("Record {} is internal and cannot be imported", global.identifier),
			});
		}

		if let Some(existing) = self.db.get(&global.identifier)? {
			if !copy_status.may_replace(existing.copy_status) {
				return Err(StorageError::AuthorityViolation {
					identifier: global.identifier,
					incoming: copy_status.to_string(),
				});
			}
		}

		let mut record =
			StorageRecord::from_peer(global, metadata.to_string(), copy_status, source_node);

		let staging = self.root.join(format!("{}{}", STAGING_PREFIX, identifier));
		if staging.exists() {
			fs::remove_dir_all(&staging)?;
		}
		if let Err(e) = self.refresh(&staging, &mut record, true) {
			let _ = fs::remove_dir_all(&staging);
			return Err(e);
		}

		let folder = self.folder(&identifier);
		if folder.exists() {
			fs::remove_dir_all(&folder)?;
		}
		fs::rename(&staging, &folder)?;
		self.db.put(&record)?;
		self.hook.on_storage_updated(&record);
		Ok(record)
	}

	/// Remove a record's database row and folder
	pub fn remove_record(&self, identifier: &str) -> Result<bool, StorageError> {
		let existed = self.db.remove(identifier)?;
		let folder = self.folder(identifier);
		if folder.exists() {
			fs::remove_dir_all(&folder)?;
		}
		if existed {
			self.hook.on_record_removed(identifier);
		}
		Ok(existed)
	}

	/// Identifier to digest for every record pulled from `peer`
	pub fn local_inventory(&self, peer: &str) -> Result<Inventory, StorageError> {
		let mut inventory = BTreeMap::new();
		for record in self.db.all()? {
			if record.source_node.as_deref() != Some(peer) {
				continue;
			}
			if let Some(digest) = record.digest_checksum {
				inventory.insert(record.identifier, digest);
			}
		}
		Ok(inventory)
	}

	/// Identifier to digest for every record this node shares with peers.
	///
	/// Covers ingested and published master and proxy copies, tombstones
	/// included. Stale digests are refreshed on the way.
	pub fn shared_inventory(&self) -> Result<Inventory, StorageError> {
		let mut inventory = BTreeMap::new();
		for mut record in self.db.all()? {
			if !record.publication_status.is_shared() || !record.copy_status.is_reshared() {
				continue;
			}
			if let Some(digest) = self.get_digest_checksum(&mut record)? {
				inventory.insert(record.identifier, digest);
			}
		}
		Ok(inventory)
	}

	/// Full metadata of a shared record, building the digest first if missing
	pub fn full_metadata(&self, identifier: &str) -> Result<FullMetadata, StorageError> {
		let mut record = self.require(identifier)?;
		if record.digest_checksum.is_none() {
			self.update_storage(&mut record, true)?;
		}
		Ok(FullMetadata {
			metadata: record.metadata.into_bytes(),
			global_json: record.global_storage.into_bytes(),
		})
	}
}


// vim: ts=4
