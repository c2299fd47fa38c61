//! Signal handling for graceful termination

use tracing::{debug, warn};

/// Resolves on the first SIGTERM or SIGINT.
///
/// If the handlers cannot be installed the future never resolves and the
/// process keeps the default signal behaviour.
pub async fn shutdown_signal() {
	use tokio::signal;

	let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}. Process will not shut down gracefully.", e);
			return std::future::pending().await;
		}
	};

	let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGINT handler: {}. Process will not shut down gracefully.", e);
			return std::future::pending().await;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => debug!("Received SIGTERM, shutting down..."),
		_ = sigint.recv() => debug!("Received SIGINT, shutting down..."),
	}
}

// vim: ts=4
