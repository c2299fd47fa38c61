use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use metasync::logging::*;
use metasync::{admin, serve, Config, FileLock, HttpConnector, Storage, Synchronizer, STORAGE_LOCK_NAME};

fn open_storage(config: &Config) -> Result<Arc<Storage>, Box<dyn Error>> {
	let storage = Storage::from_config(config)?;
	Ok(Arc::new(storage))
}

fn storage_lock(config: &Config) -> Arc<FileLock> {
	Arc::new(FileLock::new(&config.lock_dir(), STORAGE_LOCK_NAME))
}

async fn run_sync(
	config: &Config,
	id_file: Option<&PathBuf>,
	node: Option<&str>,
) -> Result<(), Box<dyn Error>> {
	let storage = open_storage(config)?;
	let connector = Arc::new(HttpConnector::new(config.request_timeout()));
	let synchronizer = Synchronizer::new(storage, storage_lock(config), connector, config.peers());

	let report = synchronizer.run(node).await?;

	if let Some(path) = id_file {
		let mut file = std::fs::File::create(path)?;
		for id in report.changed_identifiers() {
			writeln!(file, "{}", id)?;
		}
	}

	println!(
		"Added: {}, updated: {}, removed: {}, skipped: {}, failed records: {}, failed peers: {}",
		report.added(),
		report.updated(),
		report.deleted(),
		report.skipped(),
		report.failed_records(),
		report.failed_peers.len()
	);
	for failure in &report.failed_peers {
		println!("  {}: {}", failure.peer, failure.reason);
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	init_tracing();

	let matches = Command::new("metasync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Metadata repository storage and peer synchronisation")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Configuration file (TOML)"),
		)
		.subcommand(
			Command::new("sync")
				.about("Synchronise with configured peers")
				.arg(
					Arg::new("id-file")
						.long("id-file")
						.value_name("FILE")
						.help("Write identifiers of added and updated records to FILE"),
				)
				.arg(
					Arg::new("node")
						.long("node")
						.value_name("NAME")
						.help("Only synchronise with this peer"),
				),
		)
		.subcommand(
			Command::new("serve")
				.about("Serve the peer synchronisation endpoints and run scheduled sync and digest jobs")
				.arg(
					Arg::new("listen")
						.short('l')
						.long("listen")
						.value_name("ADDR")
						.help("Address to listen on"),
				),
		)
		.subcommand(Command::new("update-digests").about("Refresh stale digests"))
		.subcommand(
			Command::new("repair").about("Rebuild all artifacts and remove superfluous files"),
		)
		.subcommand(
			Command::new("remove-node")
				.about("Remove all records pulled from the given peers")
				.arg(Arg::new("name").required(true).action(ArgAction::Append).num_args(1..)),
		)
		.subcommand(Command::new("list").about("List published records as identifier:digest"))
		.get_matches();

	let config_path = matches.get_one::<String>("config").map(PathBuf::from);
	let mut config = Config::load(config_path.as_deref())?;

	match matches.subcommand() {
		Some(("sync", sub)) => {
			let id_file = sub.get_one::<String>("id-file").map(PathBuf::from);
			let node = sub.get_one::<String>("node").map(|s| s.as_str());
			run_sync(&config, id_file.as_ref(), node).await?;
		}
		Some(("serve", sub)) => {
			if let Some(listen) = sub.get_one::<String>("listen") {
				config.listen_addr = listen.clone();
			}
			let storage = open_storage(&config)?;
			serve::run_server(config, storage).await?;
		}
		Some(("update-digests", _)) => {
			let storage = open_storage(&config)?;
			let report = admin::update_digests(&storage, storage_lock(&config).as_ref())?;
			println!("Checked: {}, refreshed: {}, failed: {}", report.checked, report.refreshed, report.failed);
		}
		Some(("repair", _)) => {
			let storage = open_storage(&config)?;
			let report = admin::repair_storage(&storage, storage_lock(&config).as_ref())?;
			println!(
				"Rebuilt: {}, removed files: {}, removed folders: {}, failed: {}",
				report.rebuilt, report.removed_files, report.removed_folders, report.failed
			);
		}
		Some(("remove-node", sub)) => {
			let nodes: Vec<String> = sub
				.get_many::<String>("name")
				.ok_or("remove-node: at least one node name required")?
				.cloned()
				.collect();
			let storage = open_storage(&config)?;
			let removed = admin::remove_node(&storage, storage_lock(&config).as_ref(), &nodes)?;
			println!("Removed {} records", removed);
		}
		Some(("list", _)) => {
			let storage = open_storage(&config)?;
			for (identifier, digest) in admin::resource_list(&storage)? {
				println!("{}:{}", identifier, digest);
			}
		}
		_ => {
			error!("Unknown command");
		}
	}

	Ok(())
}

// vim: ts=4
