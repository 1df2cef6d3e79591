//! Fixed-width offset tables (`.dat`) that index into the text blobs.

use std::io::Cursor;
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{DecodeError, Result};

/// Marks a table slot whose record has been removed.
pub const SENTINEL: i32 = -1;

const OFFSET_WIDTH: usize = 4;
const TOPIC_ENTRY_WIDTH: usize = 5;
// Topic tables point two bytes past the record anchor.
const TOPIC_ANCHOR_CORRECTION: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicOffset {
    pub topic_number: i8,
    pub question_offset: i32,
}

/// Decodes a plain offset table; sentinel slots pass through untouched.
pub fn decode_offsets(bytes: &[u8], data_magic: u16) -> Result<Vec<i32>> {
    check_width(bytes, OFFSET_WIDTH, "offset table")?;
    let mut cursor = Cursor::new(bytes);
    let mut offsets = Vec::with_capacity(bytes.len() / OFFSET_WIDTH);
    for _ in 0..bytes.len() / OFFSET_WIDTH {
        let raw = cursor.read_i32::<LittleEndian>()?;
        offsets.push(if raw == SENTINEL {
            SENTINEL
        } else {
            (raw ^ i32::from(data_magic)).wrapping_sub(1)
        });
    }
    Ok(offsets)
}

/// Decodes packed `{i8 topic, i32 offset}` records.
pub fn decode_topic_offsets(bytes: &[u8], data_magic: u16) -> Result<Vec<TopicOffset>> {
    check_width(bytes, TOPIC_ENTRY_WIDTH, "topic offset table")?;
    let mut cursor = Cursor::new(bytes);
    let mut entries = Vec::with_capacity(bytes.len() / TOPIC_ENTRY_WIDTH);
    for _ in 0..bytes.len() / TOPIC_ENTRY_WIDTH {
        let topic_number = cursor.read_i8()?;
        let raw = cursor.read_i32::<LittleEndian>()?;
        entries.push(TopicOffset {
            topic_number,
            question_offset: (raw ^ i32::from(data_magic)).wrapping_sub(TOPIC_ANCHOR_CORRECTION),
        });
    }
    Ok(entries)
}

/// Entries for one topic, ordered by `(topic_number, question_offset)` with
/// duplicates removed.
pub fn topic_entries(entries: &[TopicOffset], topic_number: i8) -> Vec<TopicOffset> {
    let mut selected: Vec<TopicOffset> = entries
        .iter()
        .copied()
        .filter(|entry| entry.topic_number == topic_number)
        .collect();
    selected.sort();
    selected.dedup();
    selected
}

/// End of the record starting at `offset`: the smallest table offset strictly
/// greater than it, or the blob length.
pub fn span_end(offsets: &[i32], offset: i32, blob_len: usize) -> usize {
    offsets
        .iter()
        .copied()
        .filter(|&candidate| candidate > offset)
        .min()
        .and_then(|next| usize::try_from(next).ok())
        .unwrap_or(blob_len)
}

/// Validated byte range of the record starting at `offset`.
pub fn resolve_span(offsets: &[i32], offset: i32, blob_len: usize) -> Result<Range<usize>> {
    let start = usize::try_from(offset)
        .map_err(|_| DecodeError::table("offset table", format!("negative offset {offset}")))?;
    let end = span_end(offsets, offset, blob_len);
    if start > end || end > blob_len {
        return Err(DecodeError::table(
            "offset table",
            format!("span {start}..{end} outside blob of {blob_len} bytes"),
        ));
    }
    Ok(start..end)
}

fn check_width(bytes: &[u8], width: usize, table: &str) -> Result<()> {
    if bytes.len() % width != 0 {
        return Err(DecodeError::table(
            table,
            format!("{} bytes is not a multiple of {width}", bytes.len()),
        ));
    }
    Ok(())
}
