use thiserror::Error;

/// Failures raised while decoding a bundle.
///
/// Every variant is fatal for the unit of work that produced it; callers decide
/// whether that also ends the session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported bundle version (executable sha256 {checksum})")]
    UnsupportedVersion { checksum: String },

    #[error("malformed {table}: {reason}")]
    MalformedTable { table: String, reason: String },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("unknown image format for {name} (leading bytes {magic:02x?})")]
    UnknownImageFormat { name: String, magic: Vec<u8> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub(crate) fn table(table: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::MalformedTable {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn record(reason: impl Into<String>) -> Self {
        DecodeError::MalformedRecord(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
