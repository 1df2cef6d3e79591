//! Text blob (`.dbt`) keystreams and code-page transcoding.

use encoding_rs::WINDOWS_1251;

use crate::fingerprint::StringDecoderVariant;

/// Decodes (or, since the keystream is an XOR, encodes) a whole blob in place.
///
/// `topic_number` is the per-topic salt; simple-data blobs use 0.
pub fn decode_blob(
    data: &mut [u8],
    variant: StringDecoderVariant,
    data_magic: u16,
    topic_number: u8,
) {
    for (index, byte) in data.iter_mut().enumerate() {
        *byte ^= keystream_byte(variant, data_magic, topic_number, index);
    }
}

pub fn keystream_byte(
    variant: StringDecoderVariant,
    data_magic: u16,
    topic_number: u8,
    index: usize,
) -> u8 {
    let odd = index % 2 == 1;
    let position = ((index + 1) % 255) as u8;
    match variant {
        StringDecoderVariant::Generic => {
            let parity = if odd { 0x30 } else { 0x16 };
            (data_magic & 0xFF) as u8 ^ topic_number ^ parity ^ position
        }
        StringDecoderVariant::V12 | StringDecoderVariant::V13 => {
            let (odd_const, even_const) = match variant {
                StringDecoderVariant::V12 => (0x80, 0xAA),
                _ => (0x13, 0x11),
            };
            let salt = if odd { topic_number } else { 0 };
            let parity = if odd { odd_const } else { even_const };
            (data_magic >> 8) as u8 ^ salt ^ parity ^ position
        }
    }
}

/// Transcodes legacy windows-1251 bytes into a Rust string.
pub fn transcode(bytes: &[u8]) -> String {
    let (text, _) = WINDOWS_1251.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIANTS: [StringDecoderVariant; 3] = [
        StringDecoderVariant::Generic,
        StringDecoderVariant::V12,
        StringDecoderVariant::V13,
    ];

    #[test]
    fn decoding_twice_restores_input() {
        let plain: Vec<u8> = (0..=255u8).cycle().take(600).collect();
        for variant in VARIANTS {
            let mut data = plain.clone();
            decode_blob(&mut data, variant, 0xA55A, 7);
            assert_ne!(data, plain, "{variant:?} keystream is not identity");
            decode_blob(&mut data, variant, 0xA55A, 7);
            assert_eq!(data, plain, "{variant:?} round trip");
        }
    }

    #[test]
    fn generic_keystream_formula() {
        // index 0: 0x34 ^ 5 ^ 0x16 ^ 1
        assert_eq!(
            keystream_byte(StringDecoderVariant::Generic, 0x1234, 5, 0),
            0x34 ^ 5 ^ 0x16 ^ 1
        );
        // index 1: 0x34 ^ 5 ^ 0x30 ^ 2
        assert_eq!(
            keystream_byte(StringDecoderVariant::Generic, 0x1234, 5, 1),
            0x34 ^ 5 ^ 0x30 ^ 2
        );
    }

    #[test]
    fn versioned_keystreams_salt_odd_positions_only() {
        assert_eq!(
            keystream_byte(StringDecoderVariant::V12, 0x1234, 5, 0),
            0x12 ^ 0xAA ^ 1
        );
        assert_eq!(
            keystream_byte(StringDecoderVariant::V12, 0x1234, 5, 1),
            0x12 ^ 5 ^ 0x80 ^ 2
        );
        assert_eq!(
            keystream_byte(StringDecoderVariant::V13, 0x1234, 5, 2),
            0x12 ^ 0x11 ^ 3
        );
        assert_eq!(
            keystream_byte(StringDecoderVariant::V13, 0x1234, 5, 3),
            0x12 ^ 5 ^ 0x13 ^ 4
        );
    }

    #[test]
    fn position_term_wraps_at_255() {
        // index 254 -> (255 % 255) == 0, index 255 -> 1
        assert_eq!(
            keystream_byte(StringDecoderVariant::Generic, 0, 0, 254),
            0x16
        );
        assert_eq!(
            keystream_byte(StringDecoderVariant::Generic, 0, 0, 255),
            0x30 ^ 1
        );
    }

    #[test]
    fn transcodes_cyrillic() {
        assert_eq!(transcode(&[0xCF, 0xC4, 0xC4, b' ', b'1']), "ПДД 1");
    }
}
