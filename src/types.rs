//! Status enums shared by the storage and sync layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Publication status of a storage record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
	/// Visible only on this node, never serialised to disk artifacts or peers
	Internal,
	Ingested,
	Published,
}

impl PublicationStatus {
	/// Ingested and published records are written to disk and shared
	pub fn is_shared(self) -> bool {
		!matches!(self, PublicationStatus::Internal)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			PublicationStatus::Internal => "internal",
			PublicationStatus::Ingested => "ingested",
			PublicationStatus::Published => "published",
		}
	}
}

impl fmt::Display for PublicationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Which node is authoritative for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
	/// This node holds the authoritative copy
	Master,
	/// Pulled from the node holding the master copy
	Remote,
	/// Pulled from elsewhere and re-shared to downstream peers
	Proxy,
}

impl CopyStatus {
	/// Copies this node advertises to its own peers
	pub fn is_reshared(self) -> bool {
		matches!(self, CopyStatus::Master | CopyStatus::Proxy)
	}

	/// Authority rule: a master copy may only be replaced by another master copy.
	pub fn may_replace(self, existing: CopyStatus) -> bool {
		existing != CopyStatus::Master || self == CopyStatus::Master
	}

	pub fn as_str(self) -> &'static str {
		match self {
			CopyStatus::Master => "master",
			CopyStatus::Remote => "remote",
			CopyStatus::Proxy => "proxy",
		}
	}
}

impl fmt::Display for CopyStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}


// vim: ts=4
