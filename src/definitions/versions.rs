use serde::{Deserialize, Serialize};

/// Protocol version 1.0.
pub const VERSION_1_0: u16 = 0x0100;
/// Protocol version 0.7.
pub const VERSION_0_7: u16 = 0x0007;

/// Protocol versions a party supports, in its order of preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Versions {
    pub supported: Vec<u16>,
}

impl Default for Versions {
    fn default() -> Self {
        Self {
            supported: vec![VERSION_1_0, VERSION_0_7],
        }
    }
}

impl Versions {
    pub fn new(supported: Vec<u16>) -> Self {
        Self { supported }
    }

    /// Concatenated 2 byte big-endian versions.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.supported.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    pub fn is_supported(&self, version: u16) -> bool {
        self.supported.contains(&version)
    }

    /// The first version of `offered` (in its own order) that we support.
    ///
    /// Trailing odd bytes of `offered` are ignored.
    pub fn highest_supported(&self, offered: &[u8]) -> Option<u16> {
        offered
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .find(|version| self.is_supported(*version))
    }
}

pub fn version_bytes(version: u16) -> [u8; 2] {
    version.to_be_bytes()
}
