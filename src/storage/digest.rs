//! Digest archive creation and staleness checks

use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::Path;

use crate::archive;
use crate::checksum::checksum_pair;
use crate::error::StorageError;
use crate::protocol::{GLOBAL_ENTRY, METADATA_ENTRY};
use crate::record::{StorageRecord, DIGEST_ARCHIVE_FILE};

/// Digest value for a metadata document and its global attributes
pub fn compute_digest(metadata: &str, global_json: &str) -> String {
	checksum_pair(metadata.as_bytes(), global_json.as_bytes())
}

/// Archive bytes holding the metadata document and global attributes
pub fn digest_archive_bytes(metadata: &str, global_json: &str) -> Result<Vec<u8>, StorageError> {
	archive::pack(&[(METADATA_ENTRY, metadata.as_bytes()), (GLOBAL_ENTRY, global_json.as_bytes())])
		.map_err(|e| StorageError::Archive { message: e.to_string() })
}

/// Recompute the digest checksum and write the digest archive into `folder`.
///
/// Only master and proxy copies get an archive on disk, since only they
/// are served to other nodes. Every copy gets a checksum.
pub fn create_digest(folder: &Path, record: &mut StorageRecord) -> Result<(), StorageError> {
	if record.copy_status.is_reshared() {
		let bytes = digest_archive_bytes(&record.metadata, &record.global_storage)?;
		let target = folder.join(DIGEST_ARCHIVE_FILE);
		let tmp = folder.join(format!("{}.tmp", DIGEST_ARCHIVE_FILE));
		fs::write(&tmp, &bytes)?;
		fs::rename(&tmp, &target)?;
	}

	let now = Utc::now();
	record.digest_checksum = Some(compute_digest(&record.metadata, &record.global_storage));
	record.digest_modified = Some(now);
	record.digest_last_checked = Some(now);
	Ok(())
}

/// Whether the digest must be refreshed.
///
/// A digest is refreshed once it was built more than half the maximum age
/// ago. `digest_last_checked` only records when it was last looked at.
pub fn is_stale(record: &StorageRecord, now: DateTime<Utc>, max_age: Duration) -> bool {
	if record.digest_checksum.is_none() {
		return true;
	}
	let expiration = now - max_age / 2;
	record.digest_modified.map_or(true, |modified| modified < expiration)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn record_with_digest(age: Duration) -> StorageRecord {
		let mut record = StorageRecord::new_master("<a/>");
		let at = Utc::now() - age;
		record.digest_checksum = Some("x".repeat(64));
		record.digest_modified = Some(at);
		record.digest_last_checked = Some(at);
		record
	}

	#[test]
	fn test_staleness_window() {
		let max_age = Duration::hours(24);
		let now = Utc::now();
		assert!(is_stale(&record_with_digest(Duration::hours(13)), now, max_age));
		assert!(!is_stale(&record_with_digest(Duration::hours(11)), now, max_age));
		assert!(is_stale(&StorageRecord::new_master("<a/>"), now, max_age));

		let mut checked = record_with_digest(Duration::hours(13));
		checked.digest_last_checked = Some(now);
		assert!(is_stale(&checked, now, max_age));
	}

	#[test]
	fn test_remote_copy_gets_no_archive() {
		let tmp = TempDir::new().unwrap();
		let mut record = StorageRecord::new_master("<a/>");
		record.metadata = "<a/>".to_string();
		record.global_storage = "{}".to_string();
		record.copy_status = crate::types::CopyStatus::Remote;

		create_digest(tmp.path(), &mut record).unwrap();
		assert!(!tmp.path().join(DIGEST_ARCHIVE_FILE).exists());
		assert_eq!(record.digest_checksum, Some(compute_digest("<a/>", "{}")));

		record.copy_status = crate::types::CopyStatus::Proxy;
		create_digest(tmp.path(), &mut record).unwrap();
		assert!(tmp.path().join(DIGEST_ARCHIVE_FILE).exists());
	}
}

// vim: ts=4
