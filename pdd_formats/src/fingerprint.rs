//! Selects the bundle generation and its key material from the shipped
//! executable.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DecodeError, Result};
use crate::keyschedule::feed_byte;
use crate::random::LegacyRandom;

const GENERATION_A_WINDOW: usize = 16384;
const GENERATION_A_SAMPLES: usize = 255;
const GENERATION_A_BIAS: u16 = 0x1998;
const GENERATION_B_WINDOW: usize = 32768;
const GENERATION_B_SAMPLES: usize = 256;

/// Per-byte keystream flavour used for the text blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringDecoderVariant {
    Generic,
    V12,
    V13,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// 2006-2007 releases keyed from a 16 KiB executable window.
    A,
    /// 2008-2009 releases keyed through the CRC-16 register.
    B,
    /// Later releases identified by executable checksum.
    Catalogued,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Generation::A => "A",
            Generation::B => "B",
            Generation::Catalogued => "catalogued",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FingerprintProfile {
    pub generation: Generation,
    pub data_magic: u16,
    pub image_magic: u16,
    pub string_decoder: StringDecoderVariant,
}

/// Checksum-table entry for a generation C/D executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownBuild {
    pub sha256: String,
    pub data_magic: u16,
    pub image_magic: u16,
    pub decoder: StringDecoderVariant,
}

/// Executable offsets of the key windows for the year-dated generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowLayout {
    pub generation_a_offset: usize,
    pub generation_b_offset: usize,
}

impl Default for WindowLayout {
    fn default() -> Self {
        WindowLayout {
            generation_a_offset: 0x1000,
            generation_b_offset: 0x2000,
        }
    }
}

/// Profile selected for an executable, with the checksum computed on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identification {
    pub profile: FingerprintProfile,
    /// Lowercase hex SHA-256 of the whole executable.
    pub sha256: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter<'a> {
    layout: WindowLayout,
    known_builds: &'a [KnownBuild],
}

impl<'a> Fingerprinter<'a> {
    pub fn new(layout: WindowLayout, known_builds: &'a [KnownBuild]) -> Self {
        Fingerprinter {
            layout,
            known_builds,
        }
    }

    /// Identifies the generation of an executable last modified in `year`.
    pub fn identify(&self, executable: &[u8], year: i32) -> Result<Identification> {
        let sha256 = sha256_hex(executable);
        debug!("executable sha256 {sha256}");

        let profile = match year {
            2006..=2007 => {
                let window = read_window(
                    executable,
                    self.layout.generation_a_offset,
                    GENERATION_A_WINDOW + 1,
                )?;
                year_keyed(Generation::A, generation_a_magic(window)?)
            }
            2008..=2009 => {
                let window = read_window(
                    executable,
                    self.layout.generation_b_offset,
                    GENERATION_B_WINDOW,
                )?;
                year_keyed(Generation::B, generation_b_magic(window)?)
            }
            _ => {
                let build = self
                    .known_builds
                    .iter()
                    .find(|build| build.sha256.eq_ignore_ascii_case(&sha256))
                    .ok_or_else(|| DecodeError::UnsupportedVersion {
                        checksum: sha256.clone(),
                    })?;
                FingerprintProfile {
                    generation: Generation::Catalogued,
                    data_magic: build.data_magic,
                    image_magic: build.image_magic,
                    string_decoder: build.decoder,
                }
            }
        };

        info!(
            "bundle generation {} (data magic {:#06x}, image magic {:#06x}, {:?} strings)",
            profile.generation, profile.data_magic, profile.image_magic, profile.string_decoder
        );
        Ok(Identification { profile, sha256 })
    }
}

fn year_keyed(generation: Generation, magic: u16) -> FingerprintProfile {
    FingerprintProfile {
        generation,
        data_magic: magic,
        image_magic: magic,
        string_decoder: StringDecoderVariant::Generic,
    }
}

fn read_window(executable: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| executable.get(offset..end))
        .ok_or_else(|| {
            DecodeError::table(
                "executable",
                format!(
                    "key window {offset:#x}+{len:#x} exceeds executable size {:#x}",
                    executable.len()
                ),
            )
        })
}

fn check_window(window: &[u8], len: usize) -> Result<()> {
    if window.len() < len {
        return Err(DecodeError::table(
            "key window",
            format!("{} bytes, {len} required", window.len()),
        ));
    }
    Ok(())
}

fn window_seed(window: &[u8]) -> u32 {
    u32::from(u16::from_le_bytes([window[0], window[1]]))
}

/// Generation A: 255 generator-selected bytes folded alternately into the low
/// and high half, then scaled by the byte just past the window.
///
/// `window` must hold at least 16385 bytes.
pub fn generation_a_magic(window: &[u8]) -> Result<u16> {
    check_window(window, GENERATION_A_WINDOW + 1)?;
    let mut random = LegacyRandom::new(window_seed(window));
    let mut magic = 0u16;
    for i in 0..GENERATION_A_SAMPLES {
        let index = random.next(GENERATION_A_WINDOW as u32) as usize;
        magic ^= u16::from(window[index]) << (8 * (i & 1));
    }
    Ok(magic
        .wrapping_mul(u16::from(window[GENERATION_A_WINDOW]))
        .wrapping_add(GENERATION_A_BIAS))
}

/// Generation B: 256 generator-selected bytes clocked through the register.
///
/// `window` must hold at least 32768 bytes.
pub fn generation_b_magic(window: &[u8]) -> Result<u16> {
    check_window(window, GENERATION_B_WINDOW)?;
    let mut random = LegacyRandom::new(window_seed(window));
    Ok((0..GENERATION_B_SAMPLES).fold(0u16, |magic, _| {
        let index = random.next(GENERATION_B_WINDOW as u32) as usize;
        feed_byte(magic, window[index])
    }))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Calendar year (UTC) of a file timestamp.
pub fn utc_year(time: SystemTime) -> i32 {
    let secs = match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    };
    civil_year(secs.div_euclid(86_400))
}

// Howard Hinnant's days-to-civil, year component only.
fn civil_year(days: i64) -> i32 {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400;
    (if month <= 2 { year + 1 } else { year }) as i32
}
