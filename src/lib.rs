//! # Metasync - Metadata Repository Storage and Peer Synchronisation
//!
//! Each node keeps a collection of storage records (metadata documents plus
//! derived artifacts) and periodically pulls from its configured peers. Peers
//! advertise an inventory of `(identifier, digest)` pairs; a node diffs it
//! against what it previously pulled from that peer and applies the
//! resulting adds, updates and removals. A master copy is never overwritten
//! by a copy from elsewhere.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use metasync::{Config, HttpConnector, FileLock, Storage, Synchronizer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let storage = Arc::new(Storage::from_config(&config)?);
//!     let lock = Arc::new(FileLock::new(&config.lock_dir(), "storage"));
//!     let connector = Arc::new(HttpConnector::new(config.request_timeout()));
//!     let report = Synchronizer::new(storage, lock, connector, config.peers()).run(None).await?;
//!     println!("Added {} records", report.added());
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod archive;
pub mod callbacks;
pub mod checksum;
pub mod config;
pub mod error;
pub mod jobs;
pub mod lock;
pub mod logging;
pub mod protocol;
pub mod reconcile;
pub mod record;
pub mod serve;
pub mod storage;
pub mod sync;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use callbacks::{NoCallbacks, NoHook, StorageHook, SyncCallbacks, SyncEvent};
pub use config::Config;
pub use error::{LockError, PeerError, StorageError, SyncError};
pub use jobs::{JobSchedule, Jobs};
pub use lock::{FileLock, LockGuard, MemoryLock, StorageLock, STORAGE_LOCK_NAME};
pub use protocol::{FullMetadata, HttpConnector, Inventory, Peer, PeerConnector, PeerKind, PeerTransport};
pub use reconcile::{PeerReport, ReconcilePlan, Reconciler, SyncRunCache};
pub use record::StorageRecord;
pub use storage::{Storage, StorageUpdate};
pub use sync::{SyncReport, Synchronizer};
pub use types::{CopyStatus, PublicationStatus};

// vim: ts=4
