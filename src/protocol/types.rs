//! Wire types for the peer synchronisation protocol
//!
//! Both endpoints answer with a gzip-compressed tar archive:
//!
//! - `GET /sync/` holds `inventory.json`, a list of `{"id", "digest"}` objects
//! - `GET /sync/{id}/metadata/` holds `metadata.xml` and `storage-global.json`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::archive;
use crate::checksum::{checksum_pair, is_checksum};
use crate::error::PeerError;
use crate::logging::*;
use crate::types::CopyStatus;

/// Protocol version advertised by `/sync/` responses
pub const PROTOCOL_VERSION: &str = "1";

/// Response header carrying [`PROTOCOL_VERSION`]
pub const VERSION_HEADER: &str = "x-metasync-version";

pub const INVENTORY_ENTRY: &str = "inventory.json";
pub const METADATA_ENTRY: &str = "metadata.xml";
pub const GLOBAL_ENTRY: &str = "storage-global.json";

/// Text the login page contains once a session is established
pub const LOGGED_IN_MARKER: &str = "Logout";

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";
pub const SESSION_COOKIE: &str = "sessionid";

/// Identifier to digest checksum
pub type Inventory = BTreeMap<String, String>;

/// Result type for peer operations
pub type PeerResult<T> = Result<T, PeerError>;

/// One advertised record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
	#[serde(rename = "id", alias = "identifier")]
	pub identifier: String,
	pub digest: String,
}

/// Metadata document and global attributes of one record, as raw bytes
#[derive(Debug, Clone, PartialEq)]
pub struct FullMetadata {
	pub metadata: Vec<u8>,
	pub global_json: Vec<u8>,
}

impl FullMetadata {
	pub fn digest(&self) -> String {
		checksum_pair(&self.metadata, &self.global_json)
	}
}

pub fn encode_inventory(inventory: &Inventory) -> std::io::Result<Vec<u8>> {
	let entries: Vec<InventoryEntry> = inventory
		.iter()
		.map(|(identifier, digest)| InventoryEntry {
			identifier: identifier.clone(),
			digest: digest.clone(),
		})
		.collect();
	let json = serde_json::to_vec(&entries)?;
	archive::pack(&[(INVENTORY_ENTRY, json.as_slice())])
}

/// Parse an inventory archive; entries with malformed identifiers are dropped
pub fn decode_inventory(bytes: &[u8], url: &str) -> PeerResult<Inventory> {
	let malformed = |message: String| PeerError::Connection {
		url: url.to_string(),
		message: format!("Malformed inventory: {}", message),
	};
	let mut entries = archive::unpack(bytes).map_err(|e| malformed(e.to_string()))?;
	let json = entries
		.remove(INVENTORY_ENTRY)
		.ok_or_else(|| malformed(format!("missing {}", INVENTORY_ENTRY)))?;
	let list: Vec<InventoryEntry> =
		serde_json::from_slice(&json).map_err(|e| malformed(e.to_string()))?;

	let mut inventory = Inventory::new();
	for entry in list {
		if !is_checksum(&entry.identifier) {
			warn!(url = %url, identifier = %entry.identifier, "Ignoring inventory entry with malformed identifier");
			continue;
		}
		inventory.insert(entry.identifier, entry.digest);
	}
	Ok(inventory)
}

pub fn encode_full_metadata(full: &FullMetadata) -> std::io::Result<Vec<u8>> {
	archive::pack(&[
		(METADATA_ENTRY, full.metadata.as_slice()),
		(GLOBAL_ENTRY, full.global_json.as_slice()),
	])
}

/// Parse a record archive and check it against the advertised digest.
///
/// Any damage to the archive is reported as `CorruptData`.
pub fn decode_full_metadata(
	bytes: &[u8],
	identifier: &str,
	expected_digest: &str,
) -> PeerResult<FullMetadata> {
	let corrupt = |actual: String| PeerError::CorruptData {
		identifier: identifier.to_string(),
		expected: expected_digest.to_string(),
		actual,
	};
	let mut entries =
		archive::unpack(bytes).map_err(|e| corrupt(format!("unreadable archive ({})", e)))?;
	let metadata = entries
		.remove(METADATA_ENTRY)
		.ok_or_else(|| corrupt(format!("missing {}", METADATA_ENTRY)))?;
	let global_json = entries
		.remove(GLOBAL_ENTRY)
		.ok_or_else(|| corrupt(format!("missing {}", GLOBAL_ENTRY)))?;

	let full = FullMetadata { metadata, global_json };
	let actual = full.digest();
	if actual != expected_digest {
		return Err(corrupt(actual));
	}
	Ok(full)
}

/// How this node relates to a configured peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
	/// Synchronised directly; pulled records become remote copies
	Core,
	/// Synchronised on behalf of downstream peers; pulled records become proxy copies
	Proxied,
}

/// A configured peer node
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
	pub id: String,
	pub url: String,
	pub username: String,
	pub password: String,
	pub kind: PeerKind,
}

impl Peer {
	/// Copy status given to records pulled from this peer
	pub fn copy_status(&self) -> CopyStatus {
		match self.kind {
			PeerKind::Core => CopyStatus::Remote,
			PeerKind::Proxied => CopyStatus::Proxy,
		}
	}
}


// vim: ts=4
