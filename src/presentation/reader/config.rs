use std::sync::{Arc, PoisonError, RwLock};

use p256::PublicKey;
use serde::{Deserialize, Serialize};

use crate::crypto::{encode_public_key, KeyPair};
use crate::definitions::identifier::{Identifier, ReaderIdentifier};
use crate::definitions::secure_channel::PersistentKey;
use crate::definitions::versions::Versions;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid reader configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid hex in reader configuration: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error(transparent)]
    Protocol(#[from] crate::Error),
}

/// Identity and policy of one reader.
#[derive(Debug, Clone)]
pub struct ReaderConfiguration {
    pub identifier: ReaderIdentifier,
    /// Long-term keypair shared by the reader group.
    pub keypair: KeyPair,
    pub send_fast_transaction: bool,
    pub versions: Versions,
}

fn default_true() -> bool {
    true
}

/// On-disk form of [ReaderConfiguration], byte fields as hex.
#[derive(Debug, Serialize, Deserialize)]
struct ReaderConfigurationFile {
    group_identifier: String,
    sub_group_identifier: String,
    private_key: String,
    #[serde(default = "default_true")]
    send_fast_transaction: bool,
    #[serde(default)]
    versions: Versions,
}

impl ReaderConfiguration {
    pub fn new(identifier: ReaderIdentifier, keypair: KeyPair) -> Self {
        Self {
            identifier,
            keypair,
            send_fast_transaction: true,
            versions: Versions::default(),
        }
    }

    /// A reader with a random identifier and a fresh keypair.
    pub fn generate() -> Self {
        Self::new(
            ReaderIdentifier::new(Identifier::random(), Identifier::random()),
            KeyPair::generate(),
        )
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let file: ReaderConfigurationFile = serde_json::from_str(json)?;
        let identifier = ReaderIdentifier::new(
            Identifier::from_slice("group identifier", &hex::decode(&file.group_identifier)?)?,
            Identifier::from_slice(
                "sub-group identifier",
                &hex::decode(&file.sub_group_identifier)?,
            )?,
        );
        let keypair = KeyPair::from_bytes(&hex::decode(&file.private_key)?)?;
        Ok(Self {
            identifier,
            keypair,
            send_fast_transaction: file.send_fast_transaction,
            versions: file.versions,
        })
    }

    pub fn to_json(&self) -> Result<String, Error> {
        let file = ReaderConfigurationFile {
            group_identifier: hex::encode(self.identifier.group_identifier()),
            sub_group_identifier: hex::encode(self.identifier.sub_group_identifier()),
            private_key: hex::encode(self.keypair.secret_bytes()),
            send_fast_transaction: self.send_fast_transaction,
            versions: self.versions.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }
}

/// An endpoint this reader completed a standard transaction with.
#[derive(Clone)]
pub struct KnownUserDevice {
    pub public_key: PublicKey,
    pub persistent_key: PersistentKey,
}

impl std::fmt::Debug for KnownUserDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownUserDevice")
            .field("public_key", &hex::encode(encode_public_key(&self.public_key)))
            .field("persistent_key", &"<redacted>")
            .finish()
    }
}

/// Append-only list of known devices, shared between readers of one group.
#[derive(Debug, Clone, Default)]
pub struct KnownUserDevices(Arc<RwLock<Vec<KnownUserDevice>>>);

impl KnownUserDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, device: KnownUserDevice) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
    }

    /// A copy of the current list.
    pub fn snapshot(&self) -> Vec<KnownUserDevice> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
