//! Content hashing for payloads and digests
//!
//! All checksums are BLAKE3, hex-encoded.

use std::io::{self, Read};

/// Length of a hex-encoded checksum
pub const CHECKSUM_LEN: usize = 64;

/// Hash a byte slice
pub fn checksum(data: &[u8]) -> String {
	blake3::hash(data).to_hex().to_string()
}

/// Hash everything a reader yields
pub fn checksum_reader<R: Read>(mut reader: R) -> io::Result<String> {
	let mut hasher = blake3::Hasher::new();
	io::copy(&mut reader, &mut hasher)?;
	Ok(hasher.finalize().to_hex().to_string())
}

/// Hash two byte strings as one value.
///
/// Each part is length-prefixed so that moving bytes across the boundary
/// changes the result.
pub fn checksum_pair(first: &[u8], second: &[u8]) -> String {
	let mut hasher = blake3::Hasher::new();
	hasher.update(&(first.len() as u64).to_le_bytes());
	hasher.update(first);
	hasher.update(&(second.len() as u64).to_le_bytes());
	hasher.update(second);
	hasher.finalize().to_hex().to_string()
}

/// Check that a string looks like a checksum produced here
pub fn is_checksum(value: &str) -> bool {
	value.len() == CHECKSUM_LEN && hex::decode(value).is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_checksum_reader_matches_slice() {
		let data = vec![0xAB; 100_000];
		assert_eq!(checksum_reader(data.as_slice()).unwrap(), checksum(&data));
	}

	#[test]
	fn test_pair_boundary_matters() {
		assert_ne!(checksum_pair(b"ab", b"c"), checksum_pair(b"a", b"bc"));
		assert_eq!(checksum_pair(b"ab", b"c"), checksum_pair(b"ab", b"c"));
	}

	#[test]
	fn test_is_checksum() {
		assert!(is_checksum(&checksum(b"x")));
		assert!(!is_checksum("abc"));
		assert!(!is_checksum(&"z".repeat(CHECKSUM_LEN)));
	}
}

// vim: ts=4
