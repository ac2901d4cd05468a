use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::KeyPair;
use crate::error::Result;

/// Source of long-term keypairs.
pub trait KeypairProvider {
    /// The keypair stored under `alias`, generated on first use.
    fn generate_or_retrieve_keypair(&self, alias: &str) -> Result<KeyPair>;
}

/// A [KeypairProvider] holding its keys in process memory.
#[derive(Debug, Default)]
pub struct SoftwareKeystore {
    keys: Mutex<HashMap<String, KeyPair>>,
}

impl SoftwareKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aliases(&self) -> Vec<String> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.keys().cloned().collect()
    }
}

impl KeypairProvider for SoftwareKeystore {
    fn generate_or_retrieve_keypair(&self, alias: &str) -> Result<KeyPair> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        let keypair = keys.entry(alias.to_string()).or_insert_with(|| {
            tracing::debug!("generating keypair for alias {alias}");
            KeyPair::generate()
        });
        Ok(keypair.clone())
    }
}
