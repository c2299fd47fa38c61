//! Record table backed by redb
//!
//! Records are stored as JSON under their identifier.

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

use crate::error::StorageError;
use crate::record::StorageRecord;

/// Key: record identifier
/// Value: serialized StorageRecord (JSON bytes)
const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

pub struct RecordDb {
	db: redb::Database,
}

impl RecordDb {
	/// Open or create the record database
	pub fn open(path: &Path) -> Result<Self, StorageError> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent)?;
			}
		}
		let db = match redb::Database::create(path) {
			Ok(db) => db,
			Err(redb::DatabaseError::DatabaseAlreadyOpen) => {
				return Err(StorageError::DatabaseBusy { path: path.display().to_string() });
			}
			Err(e) => return Err(e.into()),
		};
		{
			let write_txn = db.begin_write()?;
			let _ = write_txn.open_table(RECORDS_TABLE)?;
			write_txn.commit()?;
		}
		Ok(RecordDb { db })
	}

	pub fn get(&self, identifier: &str) -> Result<Option<StorageRecord>, StorageError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(RECORDS_TABLE)?;

		let entry = table.get(identifier)?;
		match entry {
			Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
			None => Ok(None),
		}
	}

	pub fn contains(&self, identifier: &str) -> Result<bool, StorageError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(RECORDS_TABLE)?;
		let found = table.get(identifier)?.is_some();
		Ok(found)
	}

	/// Insert or replace a record
	pub fn put(&self, record: &StorageRecord) -> Result<(), StorageError> {
		let bytes = serde_json::to_vec(record)?;

		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(RECORDS_TABLE)?;
			table.insert(record.identifier.as_str(), bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	/// Delete a record, returning whether it existed
	pub fn remove(&self, identifier: &str) -> Result<bool, StorageError> {
		let write_txn = self.db.begin_write()?;
		let existed = {
			let mut table = write_txn.open_table(RECORDS_TABLE)?;
			let removed = table.remove(identifier)?;
			removed.is_some()
		};
		write_txn.commit()?;
		Ok(existed)
	}

	/// All records in identifier order
	pub fn all(&self) -> Result<Vec<StorageRecord>, StorageError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(RECORDS_TABLE)?;

		let mut records = Vec::new();
		for item in table.iter()? {
			let (_key, value) = item?;
			records.push(serde_json::from_slice(value.value())?);
		}
		Ok(records)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_put_get_remove() {
		let tmp = TempDir::new().unwrap();
		let db = RecordDb::open(&tmp.path().join("records.redb")).unwrap();

		let mut record = StorageRecord::new_master("<a/>");
		record.identifier = "id-1".to_string();
		record.metadata = "<a/>".to_string();
		db.put(&record).unwrap();

		assert!(db.contains("id-1").unwrap());
		let loaded = db.get("id-1").unwrap().unwrap();
		assert_eq!(loaded.metadata, "<a/>");
		assert_eq!(db.all().unwrap().len(), 1);

		assert!(db.remove("id-1").unwrap());
		assert!(!db.remove("id-1").unwrap());
		assert!(db.get("id-1").unwrap().is_none());
	}

	#[test]
	fn test_second_open_reports_busy() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("records.redb");
		let _first = RecordDb::open(&path).unwrap();

		match RecordDb::open(&path) {
			Err(StorageError::DatabaseBusy { path: busy }) => assert!(busy.ends_with("records.redb")),
			Err(e) => panic!("expected busy database, got {}", e),
			Ok(_) => panic!("expected busy database"),
		}
	}
}

// vim: ts=4
