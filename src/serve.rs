//! Peer-facing HTTP server
//!
//! Routes:
//! - `GET /login/`: issues a `csrftoken` cookie and the login form
//! - `POST /login/`: checks token and credentials, sets `sessionid`
//! - `GET /sync/`: inventory archive of every shared record
//! - `GET /sync/{identifier}/metadata/`: digest archive of one record

use axum::{
	body::Bytes,
	extract::{Form, Path, State},
	http::{header, HeaderMap, HeaderName, StatusCode},
	response::{Html, IntoResponse, Response},
	routing::get,
	Router,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::checksum::is_checksum;
use crate::config::Config;
use crate::error::{StorageError, SyncError};
use crate::jobs::Jobs;
use crate::logging::*;
use crate::protocol::{
	encode_inventory, CSRF_COOKIE, CSRF_FIELD, LOGGED_IN_MARKER, PROTOCOL_VERSION, SESSION_COOKIE,
	VERSION_HEADER,
};
use crate::record::DIGEST_ARCHIVE_FILE;
use crate::storage::Storage;

const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

pub struct ServerState {
	pub storage: Arc<Storage>,
	pub config: Config,
	/// Session id to username
	sessions: Mutex<HashMap<String, String>>,
	csrf_tokens: Mutex<HashSet<String>>,
}

impl ServerState {
	pub fn new(storage: Arc<Storage>, config: Config) -> Self {
		ServerState {
			storage,
			config,
			sessions: Mutex::new(HashMap::new()),
			csrf_tokens: Mutex::new(HashSet::new()),
		}
	}

	async fn session_user(&self, headers: &HeaderMap) -> Option<String> {
		let session = request_cookie(headers, SESSION_COOKIE)?;
		self.sessions.lock().await.get(&session).cloned()
	}

	async fn may_sync(&self, headers: &HeaderMap) -> bool {
		!self.config.sync_needs_authentication || self.session_user(headers).await.is_some()
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginForm {
	username: String,
	password: String,
	csrfmiddlewaretoken: String,
}

/// Build the router for a node
pub fn router(state: Arc<ServerState>) -> Router {
	Router::new()
		.route("/login/", get(login_form).post(login_submit))
		.route("/sync/", get(inventory))
		.route("/sync/:identifier/metadata/", get(full_metadata))
		.with_state(state)
}

/// Serve on an already bound listener until `shutdown` completes
pub async fn serve<F>(
	listener: tokio::net::TcpListener,
	state: Arc<ServerState>,
	shutdown: F,
) -> std::io::Result<()>
where
	F: Future<Output = ()> + Send + 'static,
{
	axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}

/// Bind the configured address and serve until SIGINT/SIGTERM.
///
/// The scheduled synchronisation and digest jobs run alongside the server on
/// the same storage handle and stop with it.
pub async fn run_server(config: Config, storage: Arc<Storage>) -> Result<(), SyncError> {
	let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
	info!("Node {} listening on {}", config.node_id, config.listen_addr);

	let (stop_tx, stop_rx) = watch::channel(false);
	let jobs = Jobs::from_config(&config, storage.clone());
	let jobs_handle = tokio::spawn(jobs.run(stopped(stop_rx)));

	let state = Arc::new(ServerState::new(storage, config));
	let result = serve(listener, state, async move {
		crate::utils::signal::shutdown_signal().await;
		let _ = stop_tx.send(true);
	})
	.await;

	if let Err(e) = jobs_handle.await {
		error!("Background jobs ended abnormally: {}", e);
	}
	result?;
	info!("Server stopped");
	Ok(())
}

/// Resolves once `rx` turns true or its sender is gone
async fn stopped(mut rx: watch::Receiver<bool>) {
	while !*rx.borrow() {
		if rx.changed().await.is_err() {
			break;
		}
	}
}

async fn login_form(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
	if let Some(user) = state.session_user(&headers).await {
		return logged_in_page(&user).into_response();
	}

	let token = uuid::Uuid::new_v4().simple().to_string();
	state.csrf_tokens.lock().await.insert(token.clone());
	let page = format!(
		"<html><body><form method=\"post\" action=\"/login/\">\
		<input type=\"hidden\" name=\"{}\" value=\"{}\"/>\
		<input name=\"username\"/><input name=\"password\" type=\"password\"/>\
		<input type=\"submit\" value=\"Login\"/></form></body></html>",
		CSRF_FIELD, token
	);
	(
		[(header::SET_COOKIE, format!("{}={}; Path=/", CSRF_COOKIE, token))],
		Html(page),
	)
		.into_response()
}

async fn login_submit(
	State(state): State<Arc<ServerState>>,
	headers: HeaderMap,
	Form(form): Form<LoginForm>,
) -> Response {
	let cookie_token = request_cookie(&headers, CSRF_COOKIE);
	let token_valid = match cookie_token {
		Some(token) if token == form.csrfmiddlewaretoken => {
			state.csrf_tokens.lock().await.remove(&token)
		}
		_ => false,
	};
	if !token_valid {
		warn!(security = true, "Rejected login for '{}': missing or invalid CSRF token", form.username);
		return (StatusCode::FORBIDDEN, "CSRF verification failed").into_response();
	}

	if !state.config.check_credentials(&form.username, &form.password) {
		warn!(security = true, "Rejected login for '{}': bad credentials", form.username);
		return (StatusCode::OK, Html("<html><body>Login failed</body></html>")).into_response();
	}

	let session = uuid::Uuid::new_v4().simple().to_string();
	state.sessions.lock().await.insert(session.clone(), form.username.clone());
	info!("User '{}' logged in", form.username);
	(
		[(header::SET_COOKIE, format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, session))],
		logged_in_page(&form.username),
	)
		.into_response()
}

async fn inventory(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
	if !state.may_sync(&headers).await {
		return StatusCode::FORBIDDEN.into_response();
	}

	let storage = state.storage.clone();
	let result = tokio::task::spawn_blocking(move || {
		let inventory = storage.shared_inventory()?;
		let bytes = encode_inventory(&inventory)?;
		Ok::<_, StorageError>((inventory.len(), bytes))
	})
	.await;

	match result {
		Ok(Ok((count, bytes))) => {
			debug!("Serving inventory with {} entries", count);
			archive_response(bytes)
		}
		Ok(Err(e)) => internal_error("inventory", e.to_string()),
		Err(e) => internal_error("inventory", e.to_string()),
	}
}

enum Lookup {
	Found(Vec<u8>),
	Missing,
	Internal,
}

async fn full_metadata(
	State(state): State<Arc<ServerState>>,
	Path(identifier): Path<String>,
	headers: HeaderMap,
) -> Response {
	if !state.may_sync(&headers).await {
		return StatusCode::FORBIDDEN.into_response();
	}
	if !is_checksum(&identifier) {
		return StatusCode::NOT_FOUND.into_response();
	}

	let storage = state.storage.clone();
	let id = identifier.clone();
	let result = tokio::task::spawn_blocking(move || -> Result<Lookup, StorageError> {
		let mut record = match storage.get(&id)? {
			Some(record) => record,
			None => return Ok(Lookup::Missing),
		};
		if !record.publication_status.is_shared() {
			return Ok(Lookup::Internal);
		}
		if !record.copy_status.is_reshared() {
			return Ok(Lookup::Missing);
		}
		let path = storage.folder(&id).join(DIGEST_ARCHIVE_FILE);
		if record.digest_checksum.is_none() || !path.exists() {
			debug!(identifier = %id, "Building missing digest archive");
			storage.update_storage(&mut record, true)?;
		}
		Ok(Lookup::Found(std::fs::read(&path)?))
	})
	.await;

	match result {
		Ok(Ok(Lookup::Found(bytes))) => archive_response(bytes),
		Ok(Ok(Lookup::Missing)) => StatusCode::NOT_FOUND.into_response(),
		Ok(Ok(Lookup::Internal)) => {
			warn!(identifier = %identifier, "Refusing to serve internal record");
			StatusCode::FORBIDDEN.into_response()
		}
		Ok(Err(e)) => internal_error(&identifier, e.to_string()),
		Err(e) => internal_error(&identifier, e.to_string()),
	}
}

fn archive_response(bytes: Vec<u8>) -> Response {
	(
		[
			(header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE),
			(HeaderName::from_static(VERSION_HEADER), PROTOCOL_VERSION),
		],
		Bytes::from(bytes),
	)
		.into_response()
}

fn internal_error(what: &str, message: String) -> Response {
	error!("Failed to serve {}: {}", what, message);
	(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

fn logged_in_page(user: &str) -> Html<String> {
	Html(format!(
		"<html><body>Logged in as {}. <a href=\"/logout/\">{}</a></body></html>",
		user, LOGGED_IN_MARKER
	))
}

/// Value of a cookie sent with the request
fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
	headers
		.get_all(header::COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|value| value.split(';'))
		.find_map(|pair| {
			let (key, value) = pair.trim().split_once('=')?;
			if key == name {
				Some(value.to_string())
			} else {
				None
			}
		})
}


// vim: ts=4
