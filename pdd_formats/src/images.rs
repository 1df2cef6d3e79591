//! Image containers: `A8` bitmaps, `BPFT` and `BPFTCAM`.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use serde::Serialize;

use crate::error::{DecodeError, Result};
use crate::keyschedule::derive_seed;
use crate::random::LegacyRandom;
use crate::rocks::RollingRocks;

const LEGACY_BITMAP_MAGIC: &[u8; 2] = b"A8";
const BITMAP_SIGNATURE: &[u8; 2] = b"BM";
const BPFT_MAGIC: &[u8; 4] = b"BPFT";
const BPFTCAM_MAGIC: &[u8; 7] = b"BPFTCAM";
// Bitmap file header plus the info-header fields read below.
const BITMAP_HEADER_MIN: usize = 30;
const LEGACY_BITS_PER_PIXEL: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageContainer {
    LegacyBitmap,
    Bpft,
    BpftCam,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub name: String,
    pub container: ImageContainer,
    pub data: Vec<u8>,
}

pub fn detect_container(bytes: &[u8]) -> Option<ImageContainer> {
    if bytes.starts_with(BPFTCAM_MAGIC) {
        Some(ImageContainer::BpftCam)
    } else if bytes.starts_with(BPFT_MAGIC) {
        Some(ImageContainer::Bpft)
    } else if bytes.starts_with(LEGACY_BITMAP_MAGIC) {
        Some(ImageContainer::LegacyBitmap)
    } else {
        None
    }
}

/// File stem of `file_name`, the form the key schedule consumes.
pub fn image_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
}

/// Lookup name of an image file: stem, lower-cased.
pub fn logical_name(file_name: &str) -> String {
    image_stem(file_name).to_lowercase()
}

pub fn decode_image(file_name: &str, bytes: &[u8], image_magic: u16) -> Result<DecodedImage> {
    let stem = image_stem(file_name);
    let container = detect_container(bytes).ok_or_else(|| DecodeError::UnknownImageFormat {
        name: file_name.to_string(),
        magic: bytes.iter().take(BPFTCAM_MAGIC.len()).copied().collect(),
    })?;
    debug!("decoding {file_name} as {container:?}");

    let data = match container {
        ImageContainer::LegacyBitmap => decode_legacy_bitmap(stem, bytes, image_magic)?,
        ImageContainer::Bpft => {
            let mut random = LegacyRandom::new(u32::from(derive_seed(stem, image_magic)));
            bytes[BPFT_MAGIC.len()..]
                .iter()
                .map(|&byte| byte ^ random.next_byte())
                .collect()
        }
        ImageContainer::BpftCam => {
            let mut rocks = RollingRocks::new(u32::from(derive_seed(stem, image_magic)));
            let mut data = bytes[BPFTCAM_MAGIC.len()..].to_vec();
            rocks.apply(&mut data);
            data
        }
    };

    Ok(DecodedImage {
        name: logical_name(file_name),
        container,
        data,
    })
}

/// Seed of an `A8` bitmap: decimal digits of the stem plus the image magic.
pub fn legacy_bitmap_seed(stem: &str, image_magic: u16) -> u32 {
    stem.bytes()
        .filter(u8::is_ascii_digit)
        .fold(0u32, |acc, digit| {
            acc.wrapping_mul(10).wrapping_add(u32::from(digit - b'0'))
        })
        .wrapping_add(u32::from(image_magic))
}

fn decode_legacy_bitmap(stem: &str, bytes: &[u8], image_magic: u16) -> Result<Vec<u8>> {
    let malformed = |reason: String| DecodeError::table(format!("A8 bitmap {stem}"), reason);
    if bytes.len() < BITMAP_HEADER_MIN {
        return Err(malformed(format!("{} byte header is truncated", bytes.len())));
    }

    let pixel_offset = LittleEndian::read_u32(&bytes[10..14]) as usize;
    let width = LittleEndian::read_i32(&bytes[18..22]).unsigned_abs() as usize;
    let height = LittleEndian::read_i32(&bytes[22..26]).unsigned_abs() as usize;
    let bits_per_pixel = LittleEndian::read_u16(&bytes[28..30]);
    if bits_per_pixel != LEGACY_BITS_PER_PIXEL {
        return Err(malformed(format!("unsupported {bits_per_pixel} bits per pixel")));
    }

    // Two pixels per byte, rows padded to four bytes.
    let row_bytes = width.div_ceil(2);
    let stride = row_bytes.next_multiple_of(4);
    if height > 0 {
        let last_row_end = stride
            .checked_mul(height - 1)
            .and_then(|rows| rows.checked_add(pixel_offset))
            .and_then(|start| start.checked_add(row_bytes));
        match last_row_end {
            Some(end) if end <= bytes.len() => {}
            _ => {
                return Err(malformed(format!(
                    "{width}x{height} pixels at {pixel_offset} exceed {} bytes",
                    bytes.len()
                )));
            }
        }
    }

    let mut data = bytes.to_vec();
    data[..BITMAP_SIGNATURE.len()].copy_from_slice(BITMAP_SIGNATURE);

    // Rows are stored bottom-up; the keystream follows storage order.
    let mut random = LegacyRandom::new(legacy_bitmap_seed(stem, image_magic));
    for row in 0..height {
        let start = pixel_offset + row * stride;
        for byte in &mut data[start..start + row_bytes] {
            *byte ^= random.next_byte();
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_bitmap(width: i32, height: i32) -> Vec<u8> {
        let stride = ((width as usize).div_ceil(2)).next_multiple_of(4);
        let pixel_offset = 54 + 16 * 4;
        let mut data = vec![0u8; pixel_offset + stride * height as usize];
        let total = data.len() as u32;
        data[0..2].copy_from_slice(LEGACY_BITMAP_MAGIC);
        data[2..6].copy_from_slice(&total.to_le_bytes());
        data[10..14].copy_from_slice(&(pixel_offset as u32).to_le_bytes());
        data[14..18].copy_from_slice(&40u32.to_le_bytes());
        data[18..22].copy_from_slice(&width.to_le_bytes());
        data[22..26].copy_from_slice(&height.to_le_bytes());
        data[26..28].copy_from_slice(&1u16.to_le_bytes());
        data[28..30].copy_from_slice(&4u16.to_le_bytes());
        for (i, byte) in data[pixel_offset..].iter_mut().enumerate() {
            *byte = i as u8;
        }
        data
    }

    #[test]
    fn detects_containers_by_magic() {
        assert_eq!(detect_container(b"BPFTCAM.."), Some(ImageContainer::BpftCam));
        assert_eq!(detect_container(b"BPFT...."), Some(ImageContainer::Bpft));
        assert_eq!(detect_container(b"A8......"), Some(ImageContainer::LegacyBitmap));
        assert_eq!(detect_container(b"GIF89a"), None);
    }

    #[test]
    fn unknown_magic_is_fatal() {
        let err = decode_image("x.gif", b"GIF89a", 0).unwrap_err();
        match err {
            DecodeError::UnknownImageFormat { name, magic } => {
                assert_eq!(name, "x.gif");
                assert_eq!(magic, b"GIF89a");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn names_strip_extension_and_case() {
        assert_eq!(logical_name("Sign12.BMP"), "sign12");
        assert_eq!(logical_name("plain"), "plain");
        assert_eq!(image_stem("Sign12.BMP"), "Sign12");
    }

    #[test]
    fn bpft_payload_xors_with_seeded_random() {
        let plain = b"\x00\x01\x02\x03pixels".to_vec();
        let seed = derive_seed("Road1", 0x2008);
        let mut random = LegacyRandom::new(u32::from(seed));
        let mut file = BPFT_MAGIC.to_vec();
        file.extend(plain.iter().map(|&b| b ^ random.next_byte()));

        let image = decode_image("Road1.bpf", &file, 0x2008).unwrap();
        assert_eq!(image.container, ImageContainer::Bpft);
        assert_eq!(image.name, "road1");
        assert_eq!(image.data, plain);
    }

    #[test]
    fn bpftcam_payload_xors_with_rolling_rocks() {
        let plain = b"camera frame payload".to_vec();
        let seed = derive_seed("cam7", 0x0102);
        let mut payload = plain.clone();
        RollingRocks::new(u32::from(seed)).apply(&mut payload);
        let mut file = BPFTCAM_MAGIC.to_vec();
        file.extend_from_slice(&payload);

        let image = decode_image("cam7.img", &file, 0x0102).unwrap();
        assert_eq!(image.container, ImageContainer::BpftCam);
        assert_eq!(image.data, plain);
    }

    #[test]
    fn legacy_seed_uses_embedded_digits() {
        assert_eq!(legacy_bitmap_seed("z1a2b3", 0x10), 123 + 0x10);
        assert_eq!(legacy_bitmap_seed("none", 5), 5);
    }

    #[test]
    fn legacy_bitmap_restores_signature_and_rows() {
        let plain = legacy_bitmap(3, 2);
        let pixel_offset = 54 + 64;
        // Scramble the two data bytes of each 4-byte row, leaving padding alone.
        let mut file = plain.clone();
        let mut random = LegacyRandom::new(legacy_bitmap_seed("s42", 7));
        for row in 0..2 {
            for col in 0..2 {
                file[pixel_offset + row * 4 + col] ^= random.next_byte();
            }
        }

        let image = decode_image("s42.bmp", &file, 7).unwrap();
        assert_eq!(image.container, ImageContainer::LegacyBitmap);
        assert_eq!(&image.data[0..2], b"BM");
        assert_eq!(&image.data[2..], &plain[2..]);
    }

    #[test]
    fn legacy_bitmap_rejects_other_depths_and_truncation() {
        let mut eight_bit = legacy_bitmap(4, 4);
        eight_bit[28..30].copy_from_slice(&8u16.to_le_bytes());
        assert!(decode_image("a.bmp", &eight_bit, 0).is_err());

        let mut short = legacy_bitmap(4, 4);
        short.truncate(short.len() - 8);
        assert!(decode_image("a.bmp", &short, 0).is_err());

        assert!(decode_image("a.bmp", b"A8 tiny", 0).is_err());
    }
}
