//! HTTP peer client
//!
//! Logs in with a cookie-based handshake (fetch the anti-forgery token,
//! then post the credentials) and reuses the session cookies for the
//! inventory and metadata requests.

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;

use super::traits::{PeerConnector, PeerTransport};
use super::types::*;
use crate::error::PeerError;
use crate::logging::*;

/// Authenticated HTTP session with one peer
pub struct HttpPeerClient {
	peer_id: String,
	base_url: Url,
	client: reqwest::Client,
}

impl HttpPeerClient {
	/// Log in to a peer and keep the session for later requests
	pub async fn login(peer: &Peer, timeout: Duration) -> PeerResult<Self> {
		let base_url = parse_base_url(&peer.url)?;
		let login_url = join(&base_url, "login/")?;

		let jar = Arc::new(Jar::default());
		let client = reqwest::Client::builder()
			.cookie_provider(jar.clone())
			.timeout(timeout)
			.build()
			.map_err(|e| connection(&peer.url, e.to_string()))?;

		debug!(peer = %peer.id, "Fetching login form from {}", login_url);
		let response = client.get(login_url.clone()).send().await.map_err(|e| request_error(&login_url, e))?;
		check_status(&login_url, response.status())?;

		let token = cookie_value(jar.as_ref(), &login_url, CSRF_COOKIE).ok_or_else(|| {
			PeerError::Authentication {
				url: login_url.to_string(),
				message: "No anti-forgery token issued".to_string(),
			}
		})?;

		let response = client
			.post(login_url.clone())
			.header(reqwest::header::REFERER, login_url.as_str())
			.form(&[
				("username", peer.username.as_str()),
				("password", peer.password.as_str()),
				(CSRF_FIELD, token.as_str()),
			])
			.send()
			.await
			.map_err(|e| request_error(&login_url, e))?;
		let status = response.status();
		let body = response.text().await.map_err(|e| request_error(&login_url, e))?;
		if !status.is_success() || !body.contains(LOGGED_IN_MARKER) {
			return Err(PeerError::Authentication {
				url: login_url.to_string(),
				message: format!("Login as '{}' not confirmed (HTTP {})", peer.username, status.as_u16()),
			});
		}

		info!(peer = %peer.id, "Logged in at {}", base_url);
		Ok(HttpPeerClient { peer_id: peer.id.clone(), base_url, client })
	}

	async fn fetch(&self, url: &Url) -> PeerResult<reqwest::Response> {
		let response = self.client.get(url.clone()).send().await.map_err(|e| request_error(url, e))?;
		check_status(url, response.status())?;
		Ok(response)
	}
}

#[async_trait]
impl PeerTransport for HttpPeerClient {
	fn peer_id(&self) -> &str {
		&self.peer_id
	}

	async fn get_inventory(&self) -> PeerResult<Inventory> {
		let url = join(&self.base_url, "sync/")?;
		let response = self.fetch(&url).await?;

		let found = response
			.headers()
			.get(VERSION_HEADER)
			.and_then(|v| v.to_str().ok())
			.map(|v| v.to_string());
		if found.as_deref() != Some(PROTOCOL_VERSION) {
			return Err(PeerError::IncompatibleVersion {
				url: url.to_string(),
				expected: PROTOCOL_VERSION.to_string(),
				found,
			});
		}

		let bytes = response.bytes().await.map_err(|e| request_error(&url, e))?;
		let inventory = decode_inventory(&bytes, url.as_str())?;
		debug!(peer = %self.peer_id, entries = inventory.len(), "Received inventory");
		Ok(inventory)
	}

	async fn get_full_metadata(
		&self,
		identifier: &str,
		expected_digest: &str,
	) -> PeerResult<FullMetadata> {
		let url = join(&self.base_url, &format!("sync/{}/metadata/", identifier))?;
		let response = self.fetch(&url).await?;
		let bytes = response.bytes().await.map_err(|e| request_error(&url, e))?;
		decode_full_metadata(&bytes, identifier, expected_digest)
	}
}

/// Connector logging in over HTTP
pub struct HttpConnector {
	timeout: Duration,
}

impl HttpConnector {
	pub fn new(timeout: Duration) -> Self {
		HttpConnector { timeout }
	}
}

#[async_trait]
impl PeerConnector for HttpConnector {
	async fn connect(&self, peer: &Peer) -> PeerResult<Box<dyn PeerTransport>> {
		let client = HttpPeerClient::login(peer, self.timeout).await?;
		Ok(Box::new(client))
	}
}

fn parse_base_url(url: &str) -> PeerResult<Url> {
	let normalized = if url.ends_with('/') { url.to_string() } else { format!("{}/", url) };
	Url::parse(&normalized).map_err(|e| connection(url, format!("Invalid URL: {}", e)))
}

fn join(base: &Url, path: &str) -> PeerResult<Url> {
	base.join(path).map_err(|e| connection(base.as_str(), format!("Invalid URL: {}", e)))
}

fn connection(url: &str, message: String) -> PeerError {
	PeerError::Connection { url: url.to_string(), message }
}

fn request_error(url: &Url, e: reqwest::Error) -> PeerError {
	if e.is_timeout() {
		PeerError::Timeout { url: url.to_string() }
	} else {
		connection(url.as_str(), e.to_string())
	}
}

fn check_status(url: &Url, status: StatusCode) -> PeerResult<()> {
	if status.is_success() {
		Ok(())
	} else {
		Err(PeerError::Http { url: url.to_string(), status: status.as_u16() })
	}
}

/// Value of one cookie the jar would send to `url`
fn cookie_value(jar: &Jar, url: &Url, name: &str) -> Option<String> {
	let header = jar.cookies(url)?;
	let header = header.to_str().ok()?;
	header.split(';').find_map(|pair| {
		let (key, value) = pair.trim().split_once('=')?;
		if key == name {
			Some(value.to_string())
		} else {
			None
		}
	})
}


// vim: ts=4
