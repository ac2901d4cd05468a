//! Signed authentication data and the AUTH1 key schedule, shared by reader and endpoint.

use p256::PublicKey;

use crate::crypto::{self, x_bytes};
use crate::definitions::identifier::{Identifier, ReaderIdentifier};
use crate::definitions::secure_channel::{
    PersistentKey, SecureChannelKeys, VOLATILE_KEY_BLOCK_LENGTH,
};
use crate::definitions::tlv;
use crate::definitions::versions::version_bytes;
use crate::error::Result;

pub const READER_USAGE: [u8; 4] = [0x41, 0x5D, 0x95, 0x69];
pub const ENDPOINT_USAGE: [u8; 4] = [0x4E, 0x88, 0x7B, 0x4C];

const TAG_READER_IDENTIFIER: u8 = 0x4D;
const TAG_ENDPOINT_EPK_X: u8 = 0x86;
const TAG_READER_EPK_X: u8 = 0x87;
const TAG_TRANSACTION_IDENTIFIER: u8 = 0x4C;
const TAG_USAGE: u8 = 0x93;

/// Contactless interface byte.
pub(crate) const INTERFACE_CONTACTLESS: u8 = 0x5E;
pub(crate) const TAG_VERSION_LIST: u8 = 0x5C;

/// The ephemeral keys and identifiers both sides agreed on during AUTH0.
#[derive(Debug, Clone, Copy)]
pub struct TransactionKeys<'a> {
    pub reader_identifier: &'a ReaderIdentifier,
    pub reader_epk: &'a PublicKey,
    pub endpoint_epk: &'a PublicKey,
    pub transaction_identifier: &'a Identifier,
}

/// The TLV encoded data a reader or an endpoint signs, depending on `usage`.
pub fn authentication_data(keys: TransactionKeys<'_>, usage: &[u8; 4]) -> Result<Vec<u8>> {
    Ok(tlv::encode(&[
        tlv::primitive(TAG_READER_IDENTIFIER, keys.reader_identifier.to_bytes())?,
        tlv::primitive(TAG_ENDPOINT_EPK_X, x_bytes(keys.endpoint_epk))?,
        tlv::primitive(TAG_READER_EPK_X, x_bytes(keys.reader_epk))?,
        tlv::primitive(TAG_TRANSACTION_IDENTIFIER, keys.transaction_identifier.to_vec())?,
        tlv::primitive(TAG_USAGE, usage.to_vec())?,
    ]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
pub enum KeyDerivationType {
    Volatile,
    Persistent,
}

/// HKDF info for the keys derived after AUTH1.
pub fn auth1_info(
    keys: TransactionKeys<'_>,
    flag: [u8; 2],
    protocol_version: u16,
    supported_versions: &[u8],
    derivation_type: KeyDerivationType,
) -> Vec<u8> {
    let version = version_bytes(protocol_version);
    let mut info = Vec::with_capacity(128);
    info.extend_from_slice(&x_bytes(keys.reader_epk));
    info.extend_from_slice(&x_bytes(keys.endpoint_epk));
    info.extend_from_slice(keys.transaction_identifier.as_bytes());
    info.push(INTERFACE_CONTACTLESS);
    info.extend_from_slice(&flag);
    info.extend_from_slice(derivation_type.as_ref().as_bytes());
    info.push(TAG_VERSION_LIST);
    info.push(version.len() as u8);
    info.extend_from_slice(&version);
    info.push(TAG_VERSION_LIST);
    info.push(supported_versions.len() as u8);
    info.extend_from_slice(supported_versions);
    info
}

/// Keys established by a completed standard transaction.
#[derive(Debug)]
pub struct Auth1Keys {
    pub volatile: SecureChannelKeys,
    pub persistent: PersistentKey,
}

/// Derive the volatile channel keys and the persistent key from the shared `k_dh`.
///
/// `supported_versions` is always the endpoint's list, as sent in the SELECT response.
pub fn derive_auth1_keys(
    k_dh: &[u8; 32],
    keys: TransactionKeys<'_>,
    flag: [u8; 2],
    protocol_version: u16,
    supported_versions: &[u8],
) -> Result<Auth1Keys> {
    let salt = [0u8; 32];
    let volatile = crypto::key_derivation::<VOLATILE_KEY_BLOCK_LENGTH>(
        k_dh,
        &salt,
        &auth1_info(
            keys,
            flag,
            protocol_version,
            supported_versions,
            KeyDerivationType::Volatile,
        ),
    )?;
    let persistent = crypto::key_derivation::<32>(
        k_dh,
        &salt,
        &auth1_info(
            keys,
            flag,
            protocol_version,
            supported_versions,
            KeyDerivationType::Persistent,
        ),
    )?;
    Ok(Auth1Keys {
        volatile: SecureChannelKeys::from_volatile_block(&volatile),
        persistent: PersistentKey::new(persistent),
    })
}
