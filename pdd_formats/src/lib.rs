pub mod error;
pub mod fingerprint;
pub mod images;
pub mod keyschedule;
pub mod question;
pub mod random;
pub mod rocks;
pub mod simple;
pub mod strings;
pub mod tables;
pub mod text;

pub use error::{DecodeError, Result};
pub use fingerprint::{
    Fingerprinter, FingerprintProfile, Generation, Identification, KnownBuild, StringDecoderVariant,
    WindowLayout,
};
pub use images::{DecodedImage, ImageContainer, decode_image};
pub use question::{QuestionRecord, decode_topic, parse_question};
pub use random::LegacyRandom;
pub use rocks::RollingRocks;
pub use simple::{SimpleRecord, decode_simple_table, parse_simple_record};
pub use tables::{TopicOffset, decode_offsets, decode_topic_offsets};
