pub mod error;
pub mod paths;
pub mod pipeline;
pub mod settings;
pub mod store;

pub use error::{ImportError, Result};
pub use pipeline::{DecodePipeline, FingerprintReport, ImportSummary, fingerprint_bundle};
pub use settings::Settings;
pub use store::{DataStore, MemoryStore, StoreError};
