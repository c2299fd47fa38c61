//! Error types for storage and synchronisation operations

use std::error::Error;
use std::fmt;
use std::io;

/// Errors raised by the storage layer
#[derive(Debug)]
pub enum StorageError {
	/// Metadata document or attribute payload is malformed
	Validation { message: String },

	/// Attempt to overwrite a master copy with a non-master payload
	AuthorityViolation { identifier: String, incoming: String },

	/// No record with this identifier
	NotFound { identifier: String },

	/// Filesystem failure while writing artifacts
	Io(io::Error),

	/// Record database failure
	Database { message: String },

	/// Record database is held open by another process
	DatabaseBusy { path: String },

	/// JSON encoding or decoding failure
	Serialization { message: String },

	/// Digest archive could not be built or read
	Archive { message: String },
}

impl fmt::Display for StorageError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StorageError::Validation { message } => write!(f, "Validation failed: {}", message),
			StorageError::AuthorityViolation { identifier, incoming } => write!(
				f,
				"Refusing to overwrite master copy {} with a {} copy",
				identifier, incoming
			),
			StorageError::NotFound { identifier } => {
				write!(f, "No storage record with identifier {}", identifier)
			}
			StorageError::Io(e) => write!(f, "I/O error: {}", e),
			StorageError::Database { message } => write!(f, "Database error: {}", message),
			StorageError::DatabaseBusy { path } => write!(
				f,
				"Database {} is in use by another process (a running server runs sync and digest jobs itself)",
				path
			),
			StorageError::Serialization { message } => {
				write!(f, "Serialization error: {}", message)
			}
			StorageError::Archive { message } => write!(f, "Archive error: {}", message),
		}
	}
}

impl Error for StorageError {}

impl From<io::Error> for StorageError {
	fn from(e: io::Error) -> Self {
		StorageError::Io(e)
	}
}

impl From<serde_json::Error> for StorageError {
	fn from(e: serde_json::Error) -> Self {
		StorageError::Serialization { message: e.to_string() }
	}
}

impl From<redb::Error> for StorageError {
	fn from(e: redb::Error) -> Self {
		StorageError::Database { message: e.to_string() }
	}
}

impl From<redb::DatabaseError> for StorageError {
	fn from(e: redb::DatabaseError) -> Self {
		StorageError::Database { message: e.to_string() }
	}
}

impl From<redb::TransactionError> for StorageError {
	fn from(e: redb::TransactionError) -> Self {
		StorageError::Database { message: e.to_string() }
	}
}

impl From<redb::TableError> for StorageError {
	fn from(e: redb::TableError) -> Self {
		StorageError::Database { message: e.to_string() }
	}
}

impl From<redb::StorageError> for StorageError {
	fn from(e: redb::StorageError) -> Self {
		StorageError::Database { message: e.to_string() }
	}
}

impl From<redb::CommitError> for StorageError {
	fn from(e: redb::CommitError) -> Self {
		StorageError::Database { message: e.to_string() }
	}
}

/// Errors raised while talking to a peer node
#[derive(Debug)]
pub enum PeerError {
	/// Peer unreachable, bad status, or unparsable response
	Connection { url: String, message: String },

	/// Login handshake did not confirm a logged-in session
	Authentication { url: String, message: String },

	/// Peer does not advertise a compatible protocol version
	IncompatibleVersion { url: String, expected: String, found: Option<String> },

	/// Fetched content does not match its advertised digest
	CorruptData { identifier: String, expected: String, actual: String },

	/// Request exceeded the configured timeout
	Timeout { url: String },

	/// Peer answered with an unexpected HTTP status
	Http { url: String, status: u16 },
}

impl PeerError {
	/// Whether this error invalidates the whole peer pass rather than one record
	pub fn is_connection_failure(&self) -> bool {
		!matches!(self, PeerError::CorruptData { .. })
	}
}

impl fmt::Display for PeerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PeerError::Connection { url, message } => {
				write!(f, "Connection to {} failed: {}", url, message)
			}
			PeerError::Authentication { url, message } => {
				write!(f, "Login at {} failed: {}", url, message)
			}
			PeerError::IncompatibleVersion { url, expected, found } => match found {
				Some(found) => write!(
					f,
					"Peer {} speaks protocol version {}, expected {}",
					url, found, expected
				),
				None => write!(f, "Peer {} does not advertise a protocol version", url),
			},
			PeerError::CorruptData { identifier, expected, actual } => write!(
				f,
				"Checksum error for record {}: expected {}, got {}",
				identifier, expected, actual
			),
			PeerError::Timeout { url } => write!(f, "Request to {} timed out", url),
			PeerError::Http { url, status } => {
				write!(f, "Peer {} answered with HTTP status {}", url, status)
			}
		}
	}
}

impl Error for PeerError {}

/// Errors from the storage lock
#[derive(Debug)]
pub enum LockError {
	/// Lock is held by another live process
	Held { name: String, pid: Option<u32> },

	/// Lock file could not be created or removed
	Io { name: String, source: io::Error },
}

impl fmt::Display for LockError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LockError::Held { name, pid: Some(pid) } => {
				write!(f, "Lock '{}' is held by process {}", name, pid)
			}
			LockError::Held { name, pid: None } => write!(f, "Lock '{}' is already held", name),
			LockError::Io { name, source } => write!(f, "Lock '{}' failed: {}", name, source),
		}
	}
}

impl Error for LockError {}

/// Top-level error for synchronisation and administrative jobs
#[derive(Debug)]
pub enum SyncError {
	/// Configuration is missing or inconsistent
	InvalidConfig { message: String },

	/// Storage layer error (nested)
	Storage(StorageError),

	/// Peer communication error (nested)
	Peer(PeerError),

	/// Storage lock error (nested)
	Lock(LockError),

	/// I/O error
	Io(io::Error),
}

impl SyncError {
	/// Whether this is the authority rule rejecting an incoming copy
	pub fn is_authority_violation(&self) -> bool {
		matches!(self, SyncError::Storage(StorageError::AuthorityViolation { .. }))
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::Storage(e) => write!(f, "Storage error: {}", e),
			SyncError::Peer(e) => write!(f, "Peer error: {}", e),
			SyncError::Lock(e) => write!(f, "Lock error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for SyncError {}

impl From<StorageError> for SyncError {
	fn from(e: StorageError) -> Self {
		SyncError::Storage(e)
	}
}

impl From<PeerError> for SyncError {
	fn from(e: PeerError) -> Self {
		SyncError::Peer(e)
	}
}

impl From<LockError> for SyncError {
	fn from(e: LockError) -> Self {
		SyncError::Lock(e)
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_corrupt_data_is_record_level() {
		let corrupt = PeerError::CorruptData {
			identifier: "abc".to_string(),
			expected: "1".to_string(),
			actual: "2".to_string(),
		};
		assert!(!corrupt.is_connection_failure());
		assert!(PeerError::Timeout { url: "http://x/".to_string() }.is_connection_failure());
	}

	#[test]
	fn test_authority_violation_classification() {
		let err: SyncError = StorageError::AuthorityViolation {
			identifier: "abc".to_string(),
			incoming: "remote".to_string(),
		}
		.into();
		assert!(err.is_authority_violation());
		assert!(err.to_string().contains("master copy abc"));
	}
}

// vim: ts=4
