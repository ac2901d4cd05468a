use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of the key block derived on the fast path, cryptogram included.
pub const FAST_KEY_BLOCK_LENGTH: usize = 144;
/// Size of the volatile key block derived after AUTH1.
pub const VOLATILE_KEY_BLOCK_LENGTH: usize = 160;

fn key(block: &[u8], offset: usize) -> [u8; 32] {
    let mut key = [0u8; 32];
    key.copy_from_slice(&block[offset..offset + 32]);
    key
}

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureChannelKeys {
    pub exchange_sk_reader: [u8; 32],
    pub exchange_sk_device: [u8; 32],
    pub ble_sk: [u8; 32],
    pub ur_sk: [u8; 32],
    pub step_up_sk: Option<[u8; 32]>,
}

impl SecureChannelKeys {
    /// Split the fast path key block, skipping the leading 16 byte cryptogram.
    pub fn from_fast_block(block: &[u8; FAST_KEY_BLOCK_LENGTH]) -> Self {
        Self {
            exchange_sk_reader: key(block, 16),
            exchange_sk_device: key(block, 48),
            ble_sk: key(block, 80),
            ur_sk: key(block, 112),
            step_up_sk: None,
        }
    }

    pub fn from_volatile_block(block: &[u8; VOLATILE_KEY_BLOCK_LENGTH]) -> Self {
        Self {
            exchange_sk_reader: key(block, 0),
            exchange_sk_device: key(block, 32),
            step_up_sk: Some(key(block, 64)),
            ble_sk: key(block, 96),
            ur_sk: key(block, 128),
        }
    }
}

impl std::fmt::Debug for SecureChannelKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannelKeys")
            .field("exchange_sk_reader", &"<redacted>")
            .field("exchange_sk_device", &"<redacted>")
            .field("ble_sk", &"<redacted>")
            .field("ur_sk", &"<redacted>")
            .field("step_up_sk", &self.step_up_sk.map(|_| "<redacted>"))
            .finish()
    }
}

/// Message counter plus the keys of an established channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureChannelState {
    counter: u32,
    keys: Option<SecureChannelKeys>,
}

impl Default for SecureChannelState {
    fn default() -> Self {
        Self {
            counter: 1,
            keys: None,
        }
    }
}

impl SecureChannelState {
    pub fn new(keys: Option<SecureChannelKeys>) -> Self {
        Self { counter: 1, keys }
    }

    /// Install `keys`, keeping the current counter.
    pub fn with_keys(&self, keys: SecureChannelKeys) -> Self {
        Self {
            counter: self.counter,
            keys: Some(keys),
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn keys(&self) -> Result<&SecureChannelKeys> {
        self.keys.as_ref().ok_or(Error::MissingChannelKeys)
    }

    pub(crate) fn advanced(&self) -> Self {
        Self {
            counter: self.counter.wrapping_add(1),
            keys: self.keys.clone(),
        }
    }
}

/// Long-term secret shared between a reader and an endpoint after a standard transaction.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PersistentKey([u8; 32]);

impl PersistentKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| Error::InvalidLength {
                field: "persistent key",
                expected: 32,
                actual: bytes.len(),
            })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for PersistentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PersistentKey(<redacted>)")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn block<const N: usize>() -> [u8; N] {
        let mut block = [0u8; N];
        for (i, byte) in block.iter_mut().enumerate() {
            *byte = (i / 16) as u8;
        }
        block
    }

    #[test]
    fn fast_block_layout() {
        let keys = SecureChannelKeys::from_fast_block(&block());
        assert_eq!(keys.exchange_sk_reader[0], 1);
        assert_eq!(keys.exchange_sk_device[0], 3);
        assert_eq!(keys.ble_sk[0], 5);
        assert_eq!(keys.ur_sk[31], 8);
        assert!(keys.step_up_sk.is_none());
    }

    #[test]
    fn volatile_block_layout() {
        let keys = SecureChannelKeys::from_volatile_block(&block());
        assert_eq!(keys.exchange_sk_reader[0], 0);
        assert_eq!(keys.exchange_sk_device[0], 2);
        assert_eq!(keys.step_up_sk.map(|k| k[0]), Some(4));
        assert_eq!(keys.ble_sk[0], 6);
        assert_eq!(keys.ur_sk[31], 9);
    }

    #[test]
    fn keys_are_not_printed() {
        let keys = SecureChannelKeys::from_volatile_block(&[0xAA; VOLATILE_KEY_BLOCK_LENGTH]);
        let printed = format!("{:?}", SecureChannelState::new(Some(keys)));
        assert!(!printed.contains("170"));
        assert!(printed.contains("<redacted>"));
        assert!(!format!("{:?}", PersistentKey::new([0xAA; 32])).contains("170"));
    }

    #[test]
    fn counter_and_keys() {
        let state = SecureChannelState::default();
        assert_eq!(state.counter(), 1);
        assert!(matches!(state.keys(), Err(Error::MissingChannelKeys)));

        let state = state.advanced().with_keys(SecureChannelKeys::from_fast_block(&block()));
        assert_eq!(state.counter(), 2);
        assert!(state.keys().is_ok());
    }
}
