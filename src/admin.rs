//! Administrative storage jobs
//!
//! Each job that mutates the storage tree runs under the storage lock.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{StorageError, SyncError};
use crate::lock::StorageLock;
use crate::logging::*;
use crate::record::{
	StorageRecord, ALLOWED_ARCHIVE_EXTENSIONS, DIGEST_ARCHIVE_FILE, GLOBAL_ATTRIBUTES_FILE,
	LOCAL_ATTRIBUTES_FILE, METADATA_FILE_PREFIX, METADATA_FILE_SUFFIX, PAYLOAD_BASE_NAME,
};
use crate::storage::Storage;
use crate::types::PublicationStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestReport {
	pub checked: usize,
	pub refreshed: usize,
	pub failed: usize,
}

/// Refresh every stale digest of a record this node shares
pub fn update_digests(storage: &Storage, lock: &dyn StorageLock) -> Result<DigestReport, SyncError> {
	let _guard = lock.acquire()?;
	let mut report = DigestReport::default();

	for mut record in storage.records()? {
		if !record.publication_status.is_shared() || !record.copy_status.is_reshared() {
			continue;
		}
		report.checked += 1;
		let before = record.digest_modified;
		match storage.get_digest_checksum(&mut record) {
			Ok(_) => {
				if record.digest_modified != before {
					report.refreshed += 1;
				}
			}
			Err(e) => {
				error!(identifier = %record.identifier, "Failed to refresh digest: {}", e);
				report.failed += 1;
			}
		}
	}

	info!(checked = report.checked, refreshed = report.refreshed, "Digest update finished");
	Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
	pub rebuilt: usize,
	pub removed_files: usize,
	pub removed_folders: usize,
	pub failed: usize,
}

/// Rebuild all artifacts and remove everything the storage tree should not contain
pub fn repair_storage(storage: &Storage, lock: &dyn StorageLock) -> Result<RepairReport, SyncError> {
	let _guard = lock.acquire()?;
	let mut report = RepairReport::default();
	let records = storage.records()?;
	let known: HashSet<&str> = records.iter().map(|r| r.identifier.as_str()).collect();

	for record in &records {
		let mut record = record.clone();
		let folder = storage.folder(&record.identifier);

		if !record.publication_status.is_shared() {
			if folder.exists() {
				fs::remove_dir_all(&folder).map_err(StorageError::from)?;
				report.removed_folders += 1;
			}
			continue;
		}

		if let Err(e) = storage.update_storage(&mut record, true) {
			error!(identifier = %record.identifier, "Failed to rebuild storage: {}", e);
			report.failed += 1;
			continue;
		}
		report.rebuilt += 1;
		report.removed_files += remove_superfluous_files(&folder, &record)?;
	}

	for entry in fs::read_dir(storage.root()).map_err(StorageError::from)? {
		let entry = entry.map_err(StorageError::from)?;
		if !entry.file_type().map_err(StorageError::from)?.is_dir() {
			continue;
		}
		let name = entry.file_name().to_string_lossy().into_owned();
		if !known.contains(name.as_str()) {
			warn!("Removing orphaned folder {}", entry.path().display());
			fs::remove_dir_all(entry.path()).map_err(StorageError::from)?;
			report.removed_folders += 1;
		}
	}

	info!(
		rebuilt = report.rebuilt,
		removed_files = report.removed_files,
		removed_folders = report.removed_folders,
		"Storage repair finished"
	);
	Ok(report)
}

fn is_expected_file(name: &str, record: &StorageRecord) -> bool {
	if name == GLOBAL_ATTRIBUTES_FILE || name == LOCAL_ATTRIBUTES_FILE {
		return true;
	}
	if name == DIGEST_ARCHIVE_FILE {
		return record.copy_status.is_reshared();
	}
	if let Some(rest) = name.strip_prefix(METADATA_FILE_PREFIX) {
		if let Some(number) = rest.strip_suffix(METADATA_FILE_SUFFIX) {
			return !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
		}
	}
	ALLOWED_ARCHIVE_EXTENSIONS
		.iter()
		.any(|ext| name == format!("{}.{}", PAYLOAD_BASE_NAME, ext))
}

fn remove_superfluous_files(folder: &Path, record: &StorageRecord) -> Result<usize, StorageError> {
	let mut removed = 0;
	for entry in fs::read_dir(folder)? {
		let entry = entry?;
		let name = entry.file_name().to_string_lossy().into_owned();
		let is_file = entry.file_type()?.is_file();
		if is_file && is_expected_file(&name, record) {
			continue;
		}
		debug!(identifier = %record.identifier, "Removing superfluous {}", name);
		if is_file {
			fs::remove_file(entry.path())?;
		} else {
			fs::remove_dir_all(entry.path())?;
		}
		removed += 1;
	}
	Ok(removed)
}

/// Remove every record pulled from one of `nodes`
pub fn remove_node(
	storage: &Storage,
	lock: &dyn StorageLock,
	nodes: &[String],
) -> Result<usize, SyncError> {
	let _guard = lock.acquire()?;
	let mut removed = 0;
	for record in storage.records()? {
		let from_node = match &record.source_node {
			Some(source) => nodes.iter().any(|n| n == source),
			None => false,
		};
		if from_node && storage.remove_record(&record.identifier)? {
			removed += 1;
		}
	}
	info!("Removed {} records from nodes {:?}", removed, nodes);
	Ok(removed)
}

/// `(identifier, digest)` of every published, non-deleted record
pub fn resource_list(storage: &Storage) -> Result<Vec<(String, String)>, StorageError> {
	Ok(storage
		.records()?
		.into_iter()
		.filter(|r| r.publication_status == PublicationStatus::Published && !r.deleted)
		.filter_map(|r| Some((r.identifier, r.digest_checksum?)))
		.collect())
}


// vim: ts=4
