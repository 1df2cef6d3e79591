use std::fs;
use std::path::Path;

use pdd_formats::{KnownBuild, WindowLayout};
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

/// Import settings, read from a JSON file. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Image directories under the bundle root, decoded in this order.
    pub image_dirs: Vec<String>,
    /// Questions drawn per ticket, one entry per topic in ascending order.
    pub questions_per_ticket: Vec<u32>,
    /// Executable file name; the single `*.exe` at the root when unset.
    pub executable: Option<String>,
    pub fingerprint: WindowLayout,
    /// Checksum table for releases newer than 2009.
    pub known_builds: Vec<KnownBuild>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            image_dirs: vec!["images".to_string()],
            questions_per_ticket: Vec::new(),
            executable: None,
            fingerprint: WindowLayout::default(),
            known_builds: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };
        let text = fs::read_to_string(path).map_err(|err| ImportError::io(path, err))?;
        Self::from_json_str(&text).map_err(|source| ImportError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn questions_per_ticket_for(&self, topic_index: usize) -> Option<u32> {
        self.questions_per_ticket.get(topic_index).copied()
    }
}

#[cfg(test)]
mod tests {
    use pdd_formats::StringDecoderVariant;

    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let settings = Settings::from_json_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.image_dirs, vec!["images"]);
    }

    #[test]
    fn parses_full_settings() {
        let settings = Settings::from_json_str(
            r#"{
                "image_dirs": ["signs", "photos"],
                "questions_per_ticket": [2, 3],
                "executable": "PDD.EXE",
                "fingerprint": { "generation_b_offset": 4096 },
                "known_builds": [
                    { "sha256": "ab", "data_magic": 4660, "image_magic": 22136, "decoder": "v12" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(settings.image_dirs, vec!["signs", "photos"]);
        assert_eq!(settings.questions_per_ticket_for(1), Some(3));
        assert_eq!(settings.questions_per_ticket_for(2), None);
        assert_eq!(settings.executable.as_deref(), Some("PDD.EXE"));
        assert_eq!(settings.fingerprint.generation_b_offset, 4096);
        assert_eq!(
            settings.fingerprint.generation_a_offset,
            WindowLayout::default().generation_a_offset
        );
        assert_eq!(settings.known_builds[0].decoder, StringDecoderVariant::V12);
    }

    #[test]
    fn unknown_decoder_is_rejected() {
        let result = Settings::from_json_str(
            r#"{ "known_builds": [ { "sha256": "ab", "data_magic": 1, "image_magic": 1, "decoder": "v99" } ] }"#,
        );
        assert!(result.is_err());
    }
}
