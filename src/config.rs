//! Node configuration
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (TOML, `--config`)
//! 3. Environment variables (`METASYNC_*` prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;
use crate::protocol::{Peer, PeerKind};

/// Credentials and location of one peer node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
	pub url: String,
	#[serde(default)]
	pub username: String,
	#[serde(default)]
	pub password: String,
}

/// Account accepted by this node's `/login/` endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncUser {
	pub username: String,
	pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Id of this node as known to its peers
	pub node_id: String,

	/// Public base URL of this node; written into master copies
	pub base_url: String,

	/// Root of the per-record artifact folders
	pub storage_root: PathBuf,

	/// Record database (defaults to `records.redb` under the storage root)
	pub database_path: Option<PathBuf>,

	/// Directory of the storage lock file (defaults to the storage root)
	pub lock_path: Option<PathBuf>,

	/// Address the peer-facing server binds to
	pub listen_addr: String,

	/// Maximum age of an advertised digest, in seconds
	pub max_digest_age_secs: u64,

	/// Timeout for each request to a peer, in seconds
	pub request_timeout_secs: u64,

	/// Period of the in-process synchronisation job of `serve`, in seconds; 0 disables it
	pub sync_interval_secs: u64,

	/// Require a logged-in session for `/sync/` endpoints
	pub sync_needs_authentication: bool,

	pub sync_users: Vec<SyncUser>,

	/// Peers synchronised directly
	pub core_nodes: BTreeMap<String, PeerConfig>,

	/// Peers synchronised on behalf of downstream nodes
	pub proxied_nodes: BTreeMap<String, PeerConfig>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			node_id: "local".to_string(),
			base_url: "http://127.0.0.1:8000/".to_string(),
			storage_root: PathBuf::from("./storage"),
			database_path: None,
			lock_path: None,
			listen_addr: "127.0.0.1:8000".to_string(),
			max_digest_age_secs: 86400,
			request_timeout_secs: 30,
			sync_interval_secs: 3600,
			sync_needs_authentication: true,
			sync_users: Vec::new(),
			core_nodes: BTreeMap::new(),
			proxied_nodes: BTreeMap::new(),
		}
	}
}

impl Config {
	/// Load defaults, then `path` if given, then environment overrides
	pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => Config::default(),
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, SyncError> {
		let text = std::fs::read_to_string(path).map_err(|e| SyncError::InvalidConfig {
			message: format!("Cannot read {}: {}", path.display(), e),
		})?;
		Self::from_toml(&text).map_err(|e| SyncError::InvalidConfig {
			message: format!("{}: {}", path.display(), e),
		})
	}

	pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	/// Apply `METASYNC_*` overrides using `lookup` to read variables
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyncError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(v) = lookup("METASYNC_NODE_ID") {
			self.node_id = v;
		}
		if let Some(v) = lookup("METASYNC_BASE_URL") {
			self.base_url = v;
		}
		if let Some(v) = lookup("METASYNC_STORAGE_ROOT") {
			self.storage_root = PathBuf::from(v);
		}
		if let Some(v) = lookup("METASYNC_DATABASE_PATH") {
			self.database_path = Some(PathBuf::from(v));
		}
		if let Some(v) = lookup("METASYNC_LISTEN_ADDR") {
			self.listen_addr = v;
		}
		if let Some(v) = lookup("METASYNC_MAX_DIGEST_AGE_SECS") {
			self.max_digest_age_secs = parse_number("METASYNC_MAX_DIGEST_AGE_SECS", &v)?;
		}
		if let Some(v) = lookup("METASYNC_REQUEST_TIMEOUT_SECS") {
			self.request_timeout_secs = parse_number("METASYNC_REQUEST_TIMEOUT_SECS", &v)?;
		}
		if let Some(v) = lookup("METASYNC_SYNC_INTERVAL_SECS") {
			self.sync_interval_secs = parse_number("METASYNC_SYNC_INTERVAL_SECS", &v)?;
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		let invalid = |message: String| Err(SyncError::InvalidConfig { message });

		if self.node_id.trim().is_empty() {
			return invalid("node_id must not be empty".to_string());
		}
		if self.max_digest_age_secs == 0 {
			return invalid("max_digest_age_secs must be positive".to_string());
		}
		if self.request_timeout_secs == 0 {
			return invalid("request_timeout_secs must be positive".to_string());
		}
		for (id, peer) in self.core_nodes.iter().chain(self.proxied_nodes.iter()) {
			if peer.url.trim().is_empty() {
				return invalid(format!("peer '{}' has no url", id));
			}
		}
		if let Some(id) = self.core_nodes.keys().find(|id| self.proxied_nodes.contains_key(*id)) {
			return invalid(format!("peer '{}' is configured as both core and proxied node", id));
		}
		Ok(())
	}

	pub fn database_path(&self) -> PathBuf {
		self.database_path.clone().unwrap_or_else(|| self.storage_root.join("records.redb"))
	}

	pub fn lock_dir(&self) -> PathBuf {
		self.lock_path.clone().unwrap_or_else(|| self.storage_root.clone())
	}

	pub fn max_digest_age(&self) -> Duration {
		Duration::from_secs(self.max_digest_age_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn sync_interval(&self) -> Option<Duration> {
		match self.sync_interval_secs {
			0 => None,
			secs => Some(Duration::from_secs(secs)),
		}
	}

	/// Period of the digest refresh job: half the maximum digest age
	pub fn digest_interval(&self) -> Duration {
		self.max_digest_age() / 2
	}

	/// Configured peers, core nodes first
	pub fn peers(&self) -> Vec<Peer> {
		let core = self.core_nodes.iter().map(|(id, p)| (id, p, PeerKind::Core));
		let proxied = self.proxied_nodes.iter().map(|(id, p)| (id, p, PeerKind::Proxied));
		core.chain(proxied)
			.map(|(id, p, kind)| Peer {
				id: id.clone(),
				url: p.url.clone(),
				username: p.username.clone(),
				password: p.password.clone(),
				kind,
			})
			.collect()
	}

	/// Whether a username/password pair may log in
	pub fn check_credentials(&self, username: &str, password: &str) -> bool {
		self.sync_users.iter().any(|u| u.username == username && u.password == password)
	}
}

fn parse_number(key: &str, value: &str) -> Result<u64, SyncError> {
	value.trim().parse().map_err(|_| SyncError::InvalidConfig {
		message: format!("{} must be a number, got '{}'", key, value),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
node_id = "node-a"
base_url = "http://node-a.example/"
storage_root = "/var/lib/metasync"
max_digest_age_secs = 3600

[[sync_users]]
username = "syncuser"
password = "secret"

[core_nodes.node-b]
url = "http://node-b.example/"
username = "syncuser"
password = "secret"

[proxied_nodes.node-c]
url = "http://node-c.example/"
"#;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.max_digest_age_secs, 86400);
		assert_eq!(config.request_timeout_secs, 30);
		assert!(config.sync_needs_authentication);
		assert!(config.validate().is_ok());
		assert_eq!(config.database_path(), PathBuf::from("./storage/records.redb"));
		assert_eq!(config.sync_interval(), Some(Duration::from_secs(3600)));
		assert_eq!(config.digest_interval(), Duration::from_secs(43200));
	}

	#[test]
	fn test_config_from_toml() {
		let config = Config::from_toml(SAMPLE).unwrap();
		assert_eq!(config.node_id, "node-a");
		assert_eq!(config.max_digest_age_secs, 3600);
		assert_eq!(config.request_timeout_secs, 30);
		assert!(config.check_credentials("syncuser", "secret"));
		assert!(!config.check_credentials("syncuser", "wrong"));

		let peers = config.peers();
		assert_eq!(peers.len(), 2);
		assert_eq!(peers[0].id, "node-b");
		assert_eq!(peers[0].kind, PeerKind::Core);
		assert_eq!(peers[1].id, "node-c");
		assert_eq!(peers[1].kind, PeerKind::Proxied);
	}

	#[test]
	fn test_env_overrides() {
		let mut config = Config::from_toml(SAMPLE).unwrap();
		config
			.apply_env(|key| match key {
				"METASYNC_NODE_ID" => Some("node-z".to_string()),
				"METASYNC_REQUEST_TIMEOUT_SECS" => Some("5".to_string()),
				_ => None,
			})
			.unwrap();
		assert_eq!(config.node_id, "node-z");
		assert_eq!(config.request_timeout(), Duration::from_secs(5));
		assert_eq!(config.sync_interval(), None);

		let err = config.apply_env(|key| {
			if key == "METASYNC_MAX_DIGEST_AGE_SECS" {
				Some("soon".to_string())
			} else {
				None
			}
		});
		assert!(matches!(err, Err(SyncError::InvalidConfig { .. })));
	}

	#[test]
	fn test_validate_rejects_bad_values() {
		let mut config = Config::default();
		config.node_id = String::new();
		assert!(config.validate().is_err());

		let mut config = Config::default();
		config.request_timeout_secs = 0;
		assert!(config.validate().is_err());

		let mut config = Config::from_toml(SAMPLE).unwrap();
		let dup = config.core_nodes["node-b"].clone();
		config.proxied_nodes.insert("node-b".to_string(), dup);
		assert!(config.validate().is_err());
	}
}

// vim: ts=4
