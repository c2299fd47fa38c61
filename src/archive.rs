//! Gzip-compressed tar archives used for digests and wire payloads

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::{self, Read};

/// Build an archive from named entries.
///
/// Headers carry fixed mode and mtime, so equal input yields equal bytes.
pub fn pack(entries: &[(&str, &[u8])]) -> io::Result<Vec<u8>> {
	let encoder = GzEncoder::new(Vec::new(), Compression::default());
	let mut builder = tar::Builder::new(encoder);
	builder.mode(tar::HeaderMode::Deterministic);

	for (name, data) in entries {
		let mut header = tar::Header::new_gnu();
		header.set_size(data.len() as u64);
		header.set_mode(0o644);
		header.set_mtime(0);
		header.set_entry_type(tar::EntryType::Regular);
		builder.append_data(&mut header, name, *data)?;
	}

	builder.into_inner()?.finish()
}

/// Read every regular entry of an archive into memory
pub fn unpack(bytes: &[u8]) -> io::Result<BTreeMap<String, Vec<u8>>> {
	// Decompress fully first so a damaged gzip trailer is reported
	let mut raw = Vec::new();
	GzDecoder::new(bytes).read_to_end(&mut raw)?;

	let mut archive = tar::Archive::new(raw.as_slice());
	let mut entries = BTreeMap::new();
	for entry in archive.entries()? {
		let mut entry = entry?;
		if !entry.header().entry_type().is_file() {
			continue;
		}
		let name = entry.path()?.to_string_lossy().into_owned();
		let mut data = Vec::new();
		entry.read_to_end(&mut data)?;
		entries.insert(name, data);
	}
	Ok(entries)
}


// vim: ts=4
