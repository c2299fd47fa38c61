//! Metadata document checks and canonical form

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::StorageError;

/// Check that a document is well-formed XML with exactly one root element
pub fn validate(document: &str) -> Result<(), StorageError> {
	let mut reader = Reader::from_str(document);
	let mut depth: usize = 0;
	let mut roots: usize = 0;

	loop {
		let event = reader.read_event().map_err(|e| invalid(format!(
			"{} at position {}",
			e,
			reader.buffer_position()
		)))?;
		match event {
			Event::Start(_) => {
				if depth == 0 {
					roots += 1;
				}
				depth += 1;
			}
			Event::End(_) => {
				if depth == 0 {
					return Err(invalid("closing tag without matching opening tag".to_string()));
				}
				depth -= 1;
			}
			Event::Empty(_) => {
				if depth == 0 {
					roots += 1;
				}
			}
			Event::Text(text) if depth == 0 => {
				if !text.iter().all(|b| b.is_ascii_whitespace()) {
					return Err(invalid("text outside the root element".to_string()));
				}
			}
			Event::CData(_) if depth == 0 => {
				return Err(invalid("character data outside the root element".to_string()));
			}
			Event::Eof => break,
			_ => {}
		}
	}

	if depth != 0 {
		return Err(invalid("unclosed element at end of document".to_string()));
	}
	match roots {
		1 => Ok(()),
		0 => Err(invalid("document has no root element".to_string())),
		n => Err(invalid(format!("document has {} root elements", n))),
	}
}

/// Canonical stored form of a document.
///
/// Line endings become `\n`, a leading XML declaration is dropped and
/// surrounding whitespace is trimmed. Applying it twice changes nothing.
pub fn canonicalize(document: &str) -> Result<String, StorageError> {
	let normalized = document.replace("\r\n", "\n").replace('\r', "\n");
	let mut body = normalized.trim_start();
	if body.starts_with("<?xml") {
		match body.find("?>") {
			Some(end) => body = &body[end + 2..],
			None => return Err(invalid("unterminated XML declaration".to_string())),
		}
	}
	let canonical = body.trim().to_string();
	validate(&canonical)?;
	Ok(canonical)
}

fn invalid(message: String) -> StorageError {
	StorageError::Validation { message: format!("Malformed metadata document: {}", message) }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validate_accepts_well_formed() {
		assert!(validate("<resource><name>x</name></resource>").is_ok());
		assert!(validate("<?xml version=\"1.0\"?>\n<resource/>\n").is_ok());
		assert!(validate("<!-- note --><resource a=\"1\"/>").is_ok());
	}

	#[test]
	fn test_validate_rejects_malformed() {
		assert!(validate("").is_err());
		assert!(validate("<a><b></a>").is_err());
		assert!(validate("<a>").is_err());
		assert!(validate("<a/><b/>").is_err());
		assert!(validate("junk<a/>").is_err());
		assert!(validate("</a>").is_err());
	}

	#[test]
	fn test_canonicalize() {
		let doc = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n<a>\r\n  <b/>\r\n</a>\r\n";
		let canonical = canonicalize(doc).unwrap();
		assert_eq!(canonical, "<a>\n  <b/>\n</a>");
		assert_eq!(canonicalize(&canonical).unwrap(), canonical);
	}

	#[test]
	fn test_canonicalize_validates() {
		match canonicalize("<a>") {
			Err(StorageError::Validation { .. }) => {}
			other => panic!("expected validation error, got {:?}", other),
		}
	}
}

// vim: ts=4
