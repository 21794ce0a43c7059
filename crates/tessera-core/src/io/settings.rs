use serde::{Deserialize, Serialize};

/// Options controlling how a tree is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TreeSerializationSettings {
    /// Fail on properties the reading structure does not recognize instead
    /// of skipping them.
    pub strict: bool,
    /// Verify the trailing checksum of binary streams.
    pub verify_checksum: bool,
}

impl Default for TreeSerializationSettings {
    fn default() -> Self {
        Self {
            strict: false,
            verify_checksum: true,
        }
    }
}

impl TreeSerializationSettings {
    /// Default settings with strict property checking turned on.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}
