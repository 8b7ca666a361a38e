//! Archive extraction and text decoding shared by all parsers.

use crate::parsing::error::ParseError;
use log::debug;
use regex::Regex;
use std::borrow::Cow;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn is_zip(payload: &[u8]) -> bool {
    payload.starts_with(ZIP_MAGIC)
}

/// Returns the payload itself, or for a zip archive the first member whose
/// name matches `member` (the first file if no pattern is given).
pub fn extract<'a>(payload: &'a [u8], member: Option<&Regex>) -> Result<Cow<'a, [u8]>, ParseError> {
    if !is_zip(payload) {
        return Ok(Cow::Borrowed(payload));
    }
    let mut archive = ZipArchive::new(Cursor::new(payload))?;
    let names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect();
    let chosen = names
        .iter()
        .find(|name| member.map_or(true, |pattern| pattern.is_match(name)))
        .ok_or_else(|| {
            ParseError::malformed(match member {
                Some(pattern) => format!("archive has no member matching '{pattern}'"),
                None => "archive is empty".to_string(),
            })
        })?;
    debug!("Reading archive member {}", chosen);

    let mut file = archive.by_name(chosen)?;
    let mut content = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
    file.read_to_end(&mut content)
        .map_err(|e| ParseError::ArchiveRead(chosen.clone(), e))?;
    Ok(Cow::Owned(content))
}

/// Decodes text as UTF-8 (without BOM), falling back to Latin-1.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("Payload is not UTF-8, decoding as Latin-1");
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}
