//! Storage record model
//!
//! A [`StorageRecord`] is the persisted unit of replication: one metadata
//! document plus the bookkeeping needed to share it with peers. The record
//! itself never touches the filesystem; [`crate::storage::Storage`] owns the
//! on-disk artifacts derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::types::{CopyStatus, PublicationStatus};

/// Attribute snapshot shared with peers
pub const GLOBAL_ATTRIBUTES_FILE: &str = "storage-global.json";

/// Attribute snapshot private to this node
pub const LOCAL_ATTRIBUTES_FILE: &str = "storage-local.json";

/// Digest archive holding the current metadata and global attributes
pub const DIGEST_ARCHIVE_FILE: &str = "resource.tar.gz";

/// Base name of an optional binary payload
pub const PAYLOAD_BASE_NAME: &str = "archive";

/// Extensions accepted for the binary payload, in lookup order
pub const ALLOWED_ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar.gz", "gz", "tgz", "tar", "bzip2"];

/// Prefix and suffix of revision-numbered metadata files
pub const METADATA_FILE_PREFIX: &str = "metadata-";
pub const METADATA_FILE_SUFFIX: &str = ".xml";

/// Name of the metadata file written for a given revision
pub fn metadata_file_name(revision: u32) -> String {
	format!("{}{:04}{}", METADATA_FILE_PREFIX, revision, METADATA_FILE_SUFFIX)
}

/// Generate a fresh 64 character identifier
pub fn generate_identifier() -> String {
	format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// One shareable metadata item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
	pub identifier: String,
	pub revision: u32,
	pub publication_status: PublicationStatus,
	pub copy_status: CopyStatus,
	#[serde(default)]
	pub deleted: bool,

	/// Hash of the binary payload (master copies only)
	#[serde(default)]
	pub checksum: Option<String>,

	#[serde(default)]
	pub digest_checksum: Option<String>,
	#[serde(default)]
	pub digest_modified: Option<DateTime<Utc>>,
	#[serde(default)]
	pub digest_last_checked: Option<DateTime<Utc>>,

	/// Canonical metadata document
	#[serde(default)]
	pub metadata: String,
	/// Serialised [`GlobalAttributes`] as last written
	#[serde(default)]
	pub global_storage: String,
	/// Serialised [`LocalAttributes`] as last written
	#[serde(default)]
	pub local_storage: String,

	/// Peer a remote or proxy copy was pulled from
	#[serde(default)]
	pub source_node: Option<String>,
	/// Base URL of the node holding the master copy
	#[serde(default)]
	pub source_url: String,

	pub created: DateTime<Utc>,
	pub modified: DateTime<Utc>,

	/// New domain content waiting to be canonicalised by the next storage update
	#[serde(skip)]
	pub staged_document: Option<String>,
}

impl StorageRecord {
	/// New internal master copy holding `document` as pending content.
	///
	/// The identifier stays empty until the record is saved.
	pub fn new_master(document: impl Into<String>) -> Self {
		let now = Utc::now();
		StorageRecord {
			identifier: String::new(),
			revision: 1,
			publication_status: PublicationStatus::Internal,
			copy_status: CopyStatus::Master,
			deleted: false,
			checksum: None,
			digest_checksum: None,
			digest_modified: None,
			digest_last_checked: None,
			metadata: String::new(),
			global_storage: String::new(),
			local_storage: String::new(),
			source_node: None,
			source_url: String::new(),
			created: now,
			modified: now,
			staged_document: Some(document.into()),
		}
	}

	/// Rebuild a non-master copy from attributes and metadata fetched from a peer
	pub fn from_peer(
		global: GlobalAttributes,
		metadata: String,
		copy_status: CopyStatus,
		source_node: &str,
	) -> Self {
		StorageRecord {
			identifier: global.identifier,
			revision: global.revision,
			publication_status: global.publication_status,
			copy_status,
			deleted: global.deleted,
			checksum: None,
			digest_checksum: None,
			digest_modified: None,
			digest_last_checked: None,
			metadata,
			global_storage: String::new(),
			local_storage: String::new(),
			source_node: Some(source_node.to_string()),
			source_url: global.source_url,
			created: global.created,
			modified: global.modified,
			staged_document: None,
		}
	}

	pub fn is_master(&self) -> bool {
		self.copy_status == CopyStatus::Master
	}

	/// Stage new domain content for the next storage update
	pub fn set_document(&mut self, document: impl Into<String>) {
		self.staged_document = Some(document.into());
	}

	/// internal -> ingested
	pub fn ingest(&mut self) {
		if self.publication_status == PublicationStatus::Internal {
			self.publication_status = PublicationStatus::Ingested;
		}
	}

	pub fn publish(&mut self) {
		self.publication_status = PublicationStatus::Published;
	}

	/// published -> ingested; internal records stay internal
	pub fn unpublish(&mut self) {
		if self.publication_status == PublicationStatus::Published {
			self.publication_status = PublicationStatus::Ingested;
		}
	}

	/// Set the tombstone flag; it reaches peers through the global attributes
	pub fn mark_deleted(&mut self) {
		self.deleted = true;
	}

	pub fn global_attributes(&self) -> GlobalAttributes {
		GlobalAttributes {
			identifier: self.identifier.clone(),
			created: self.created,
			modified: self.modified,
			revision: self.revision,
			publication_status: self.publication_status,
			deleted: self.deleted,
			source_url: self.source_url.clone(),
		}
	}

	pub fn local_attributes(&self) -> LocalAttributes {
		LocalAttributes {
			digest_checksum: self.digest_checksum.clone(),
			digest_modified: self.digest_modified,
			digest_last_checked: self.digest_last_checked,
			copy_status: self.copy_status,
			source_node: self.source_node.clone(),
		}
	}
}

/// Attributes synchronised between nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAttributes {
	pub identifier: String,
	pub created: DateTime<Utc>,
	pub modified: DateTime<Utc>,
	pub revision: u32,
	pub publication_status: PublicationStatus,
	pub deleted: bool,
	pub source_url: String,
}

impl GlobalAttributes {
	pub fn to_json(&self) -> Result<String, StorageError> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	pub fn from_json(json: &str) -> Result<Self, StorageError> {
		serde_json::from_str(json).map_err(|e| StorageError::Validation {
			message: format!("Invalid global attributes: {}", e),
		})
	}
}

/// Node-private bookkeeping, never transmitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalAttributes {
	pub digest_checksum: Option<String>,
	pub digest_modified: Option<DateTime<Utc>>,
	pub digest_last_checked: Option<DateTime<Utc>>,
	pub copy_status: CopyStatus,
	pub source_node: Option<String>,
}

impl LocalAttributes {
	pub fn to_json(&self) -> Result<String, StorageError> {
		Ok(serde_json::to_string_pretty(self)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_metadata_file_name() {
		assert_eq!(metadata_file_name(1), "metadata-0001.xml");
		assert_eq!(metadata_file_name(12345), "metadata-12345.xml");
	}

	#[test]
	fn test_generated_identifier_shape() {
		let id = generate_identifier();
		assert!(crate::checksum::is_checksum(&id));
		assert_ne!(id, generate_identifier());
	}

	#[test]
	fn test_publication_transitions() {
		let mut record = StorageRecord::new_master("<a/>");
		record.unpublish();
		assert_eq!(record.publication_status, PublicationStatus::Internal);
		record.ingest();
		assert_eq!(record.publication_status, PublicationStatus::Ingested);
		record.publish();
		record.ingest();
		assert_eq!(record.publication_status, PublicationStatus::Published);
		record.unpublish();
		assert_eq!(record.publication_status, PublicationStatus::Ingested);
	}

	#[test]
	fn test_global_attributes_roundtrip_bytes() {
		let mut record = StorageRecord::new_master("<a/>");
		record.identifier = generate_identifier();
		record.source_url = "http://node-a/".to_string();
		let json = record.global_attributes().to_json().unwrap();
		let parsed = GlobalAttributes::from_json(&json).unwrap();
		assert_eq!(parsed.to_json().unwrap(), json);
	}

	#[test]
	fn test_staged_document_not_persisted() {
		let record = StorageRecord::new_master("<a/>");
		let json = serde_json::to_string(&record).unwrap();
		let back: StorageRecord = serde_json::from_str(&json).unwrap();
		assert_eq!(back.staged_document, None);
	}
}

// vim: ts=4
