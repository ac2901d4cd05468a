use std::collections::HashMap;

use p256::PublicKey;

use crate::crypto::KeyPair;
use crate::definitions::identifier::{Identifier, ReaderIdentifier};
use crate::definitions::secure_channel::PersistentKey;

/// One enrolled credential.
#[derive(Debug, Clone)]
pub struct Endpoint {
    keypair: KeyPair,
}

impl Endpoint {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for Endpoint {}

/// A reader group an endpoint has been enrolled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownReaderGroup {
    pub group_identifier: Identifier,
    pub reader_public_key: PublicKey,
}

/// Credential storage on the endpoint side.
///
/// The `dummy_*` methods must keep returning the same values for one database, so that an
/// unknown reader cannot tell a miss from a hit by timing or by comparing answers.
pub trait UserDeviceDatabase {
    /// Endpoints enrolled with the reader group, empty when there are none.
    fn find_endpoints(&self, group_identifier: &Identifier) -> Vec<Endpoint>;
    fn dummy_endpoint(&self) -> Endpoint;

    fn find_reader_group(&self, group_identifier: &Identifier) -> Option<KnownReaderGroup>;
    fn store_reader_group(&mut self, endpoint: &Endpoint, group: KnownReaderGroup);
    fn dummy_reader_group(&self) -> KnownReaderGroup;

    fn find_persistent_key(&self, reader_identifier: &ReaderIdentifier) -> Option<PersistentKey>;
    fn store_persistent_key(&mut self, reader_identifier: ReaderIdentifier, key: PersistentKey);
    fn dummy_persistent_key(&self) -> PersistentKey;

    /// A short human readable summary, never containing key material.
    fn debug(&self) -> String;
}

impl<D: UserDeviceDatabase + ?Sized> UserDeviceDatabase for &mut D {
    fn find_endpoints(&self, group_identifier: &Identifier) -> Vec<Endpoint> {
        (**self).find_endpoints(group_identifier)
    }

    fn dummy_endpoint(&self) -> Endpoint {
        (**self).dummy_endpoint()
    }

    fn find_reader_group(&self, group_identifier: &Identifier) -> Option<KnownReaderGroup> {
        (**self).find_reader_group(group_identifier)
    }

    fn store_reader_group(&mut self, endpoint: &Endpoint, group: KnownReaderGroup) {
        (**self).store_reader_group(endpoint, group)
    }

    fn dummy_reader_group(&self) -> KnownReaderGroup {
        (**self).dummy_reader_group()
    }

    fn find_persistent_key(&self, reader_identifier: &ReaderIdentifier) -> Option<PersistentKey> {
        (**self).find_persistent_key(reader_identifier)
    }

    fn store_persistent_key(&mut self, reader_identifier: ReaderIdentifier, key: PersistentKey) {
        (**self).store_persistent_key(reader_identifier, key)
    }

    fn dummy_persistent_key(&self) -> PersistentKey {
        (**self).dummy_persistent_key()
    }

    fn debug(&self) -> String {
        (**self).debug()
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    reader_groups: HashMap<Identifier, KnownReaderGroup>,
    endpoints: HashMap<Identifier, Vec<Endpoint>>,
    persistent_keys: HashMap<ReaderIdentifier, PersistentKey>,
    dummy_endpoint: Endpoint,
    dummy_reader_group: KnownReaderGroup,
    dummy_persistent_key: PersistentKey,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self {
            reader_groups: HashMap::new(),
            endpoints: HashMap::new(),
            persistent_keys: HashMap::new(),
            dummy_endpoint: Endpoint::new(KeyPair::generate()),
            dummy_reader_group: KnownReaderGroup {
                group_identifier: Identifier::random(),
                reader_public_key: *KeyPair::generate().public_key(),
            },
            dummy_persistent_key: PersistentKey::random(),
        }
    }

    /// Enroll a credential with `keypair` for the reader group.
    pub fn add_endpoint(&mut self, keypair: KeyPair, group: KnownReaderGroup) -> Endpoint {
        let endpoint = Endpoint::new(keypair);
        self.store_reader_group(&endpoint, group);
        endpoint
    }
}

impl UserDeviceDatabase for InMemoryDatabase {
    fn find_endpoints(&self, group_identifier: &Identifier) -> Vec<Endpoint> {
        self.endpoints
            .get(group_identifier)
            .cloned()
            .unwrap_or_default()
    }

    fn dummy_endpoint(&self) -> Endpoint {
        self.dummy_endpoint.clone()
    }

    fn find_reader_group(&self, group_identifier: &Identifier) -> Option<KnownReaderGroup> {
        self.reader_groups.get(group_identifier).cloned()
    }

    fn store_reader_group(&mut self, endpoint: &Endpoint, group: KnownReaderGroup) {
        let group_identifier = group.group_identifier;
        self.reader_groups.insert(group_identifier, group);
        let endpoints = self.endpoints.entry(group_identifier).or_default();
        if !endpoints.contains(endpoint) {
            endpoints.push(endpoint.clone());
        }
    }

    fn dummy_reader_group(&self) -> KnownReaderGroup {
        self.dummy_reader_group.clone()
    }

    fn find_persistent_key(&self, reader_identifier: &ReaderIdentifier) -> Option<PersistentKey> {
        self.persistent_keys.get(reader_identifier).cloned()
    }

    fn store_persistent_key(&mut self, reader_identifier: ReaderIdentifier, key: PersistentKey) {
        tracing::debug!("storing persistent key for reader {reader_identifier}");
        self.persistent_keys.insert(reader_identifier, key);
    }

    fn dummy_persistent_key(&self) -> PersistentKey {
        self.dummy_persistent_key.clone()
    }

    fn debug(&self) -> String {
        format!(
            "reader groups: {}, endpoints: {}, persistent keys: {}",
            self.reader_groups.len(),
            self.endpoints.values().map(Vec::len).sum::<usize>(),
            self.persistent_keys.len()
        )
    }
}
