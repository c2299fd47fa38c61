//! Process-wide storage lock
//!
//! All storage-mutating jobs (synchronisation, digest refresh, repair) take
//! the same named lock before touching the storage tree. The lock is
//! advisory: callers must agree to acquire it.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::LockError;
use crate::logging::*;

/// Name of the lock guarding the storage tree
pub const STORAGE_LOCK_NAME: &str = "storage";

/// Capability to take an exclusive lock
pub trait StorageLock: Send + Sync {
	fn name(&self) -> &str;

	/// Take the lock; it is released when the guard drops
	fn acquire(&self) -> Result<LockGuard, LockError>;
}

/// Releases its lock when dropped
pub struct LockGuard {
	release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
	fn new(release: impl FnOnce() + Send + 'static) -> Self {
		LockGuard { release: Some(Box::new(release)) }
	}

	/// Release explicitly instead of at scope end
	pub fn release(mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}
}

impl Drop for LockGuard {
	fn drop(&mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}
}

/// Lock file holding the owner's PID
pub struct FileLock {
	name: String,
	path: PathBuf,
}

impl FileLock {
	pub fn new(dir: &Path, name: &str) -> Self {
		FileLock { name: name.to_string(), path: dir.join(format!("{}.lock", name)) }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn try_create(&self) -> std::io::Result<()> {
		let mut file = OpenOptions::new().write(true).create_new(true).open(&self.path)?;
		writeln!(file, "{}", std::process::id())?;
		Ok(())
	}

	fn owner(&self) -> Option<u32> {
		fs::read_to_string(&self.path).ok()?.trim().parse().ok()
	}
}

impl StorageLock for FileLock {
	fn name(&self) -> &str {
		&self.name
	}

	fn acquire(&self) -> Result<LockGuard, LockError> {
		let io_err = |source| LockError::Io { name: self.name.clone(), source };

		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).map_err(io_err)?;
		}

		match self.try_create() {
			Ok(()) => {}
			Err(e) if e.kind() == ErrorKind::AlreadyExists => {
				let owner = self.owner();
				if owner.map_or(false, is_process_alive) {
					return Err(LockError::Held { name: self.name.clone(), pid: owner });
				}
				warn!("Removing stale lock {} left by process {:?}", self.path.display(), owner);
				fs::remove_file(&self.path).map_err(io_err)?;
				self.try_create().map_err(|e| {
					if e.kind() == ErrorKind::AlreadyExists {
						LockError::Held { name: self.name.clone(), pid: None }
					} else {
						io_err(e)
					}
				})?;
			}
			Err(e) => return Err(io_err(e)),
		}

		debug!("Acquired lock {}", self.path.display());
		let path = self.path.clone();
		Ok(LockGuard::new(move || {
			if let Err(e) = fs::remove_file(&path) {
				warn!("Failed to remove lock file {}: {}", path.display(), e);
			}
		}))
	}
}

/// In-process lock for tests and embedded use
#[derive(Clone)]
pub struct MemoryLock {
	name: String,
	held: Arc<AtomicBool>,
}

impl MemoryLock {
	pub fn new(name: &str) -> Self {
		MemoryLock { name: name.to_string(), held: Arc::new(AtomicBool::new(false)) }
	}

	pub fn is_held(&self) -> bool {
		self.held.load(Ordering::SeqCst)
	}
}

impl StorageLock for MemoryLock {
	fn name(&self) -> &str {
		&self.name
	}

	fn acquire(&self) -> Result<LockGuard, LockError> {
		if self.held.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
			return Err(LockError::Held { name: self.name.clone(), pid: None });
		}
		let held = self.held.clone();
		Ok(LockGuard::new(move || held.store(false, Ordering::SeqCst)))
	}
}

/// Check if a process with given PID is currently alive
#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
	Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(target_os = "linux"))]
fn is_process_alive(_pid: u32) -> bool {
	// Without /proc, assume the owner is alive
	true
}


// vim: ts=4
