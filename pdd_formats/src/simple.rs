//! Comment and traffic-regulation records: `#<number> &img... <text>`.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{DecodeError, Result};
use crate::fingerprint::FingerprintProfile;
use crate::strings::{decode_blob, transcode};
use crate::tables::{SENTINEL, decode_offsets, resolve_span};
use crate::text::normalize_markup;

static RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^#(\d+)\s*((?:&\S+\s*)*)(.+)$").expect("simple record pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleRecord {
    pub number: i32,
    pub image_names: Vec<String>,
    /// `None` for a slot the table marks as deleted.
    pub text: Option<String>,
}

impl SimpleRecord {
    pub fn deleted() -> Self {
        SimpleRecord {
            number: 0,
            image_names: Vec::new(),
            text: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.text.is_none()
    }
}

pub fn parse_simple_record(text: &str) -> Result<SimpleRecord> {
    let captures = RECORD.captures(text).ok_or_else(|| {
        let preview: String = text.chars().take(40).collect();
        DecodeError::record(format!("simple record does not match `#<number>`: {preview:?}"))
    })?;

    let number = captures[1]
        .parse::<i32>()
        .map_err(|err| DecodeError::record(format!("record number {}: {err}", &captures[1])))?;
    let image_names = captures[2]
        .split_whitespace()
        .map(|name| name.trim_start_matches('&').to_string())
        .filter(|name| !name.is_empty())
        .collect();

    Ok(SimpleRecord {
        number,
        image_names,
        text: Some(normalize_markup(&captures[3])),
    })
}

/// Decodes a `.dat`/`.dbt` pair into one record per table slot.
pub fn decode_simple_table(
    table: &[u8],
    blob: &[u8],
    profile: &FingerprintProfile,
) -> Result<Vec<SimpleRecord>> {
    let offsets = decode_offsets(table, profile.data_magic)?;
    let mut decoded = blob.to_vec();
    decode_blob(&mut decoded, profile.string_decoder, profile.data_magic, 0);

    offsets
        .iter()
        .enumerate()
        .map(|(slot, &offset)| {
            if offset == SENTINEL {
                debug!("slot {slot} is deleted");
                return Ok(SimpleRecord::deleted());
            }
            let span = resolve_span(&offsets, offset, decoded.len())?;
            parse_simple_record(&transcode(&decoded[span]))
        })
        .collect()
}
