use rand::{rngs::OsRng, RngCore};

use crate::definitions::util::DisplayBytesAsHex;
use crate::error::{Error, Result};

/// A byte array whose length is part of its type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedByteArray<const N: usize>([u8; N]);

impl<const N: usize> FixedByteArray<N> {
    pub const LENGTH: usize = N;

    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Fill a new array from the OS random number generator.
    pub fn random() -> Self {
        let mut bytes = [0u8; N];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(field: &'static str, bytes: &[u8]) -> Result<Self> {
        bytes.try_into().map(Self).map_err(|_| Error::InvalidLength {
            field,
            expected: N,
            actual: bytes.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl<const N: usize> AsRef<[u8]> for FixedByteArray<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> From<[u8; N]> for FixedByteArray<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> TryFrom<&[u8]> for FixedByteArray<N> {
    type Error = Error;
    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_slice("byte array", bytes)
    }
}

impl<const N: usize> std::fmt::Debug for FixedByteArray<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", DisplayBytesAsHex::from(&self.0[..]))
    }
}

impl<const N: usize> std::fmt::Display for FixedByteArray<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A 16 byte identifier, used for transactions and reader (sub-)groups.
pub type Identifier = FixedByteArray<16>;

/// The 16 byte value an endpoint proves possession of a persistent key with.
pub type Cryptogram = FixedByteArray<16>;

/// Group identifier followed by sub-group identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderIdentifier {
    group_identifier: Identifier,
    sub_group_identifier: Identifier,
}

impl ReaderIdentifier {
    pub const LENGTH: usize = 2 * Identifier::LENGTH;

    pub fn new(group_identifier: Identifier, sub_group_identifier: Identifier) -> Self {
        Self {
            group_identifier,
            sub_group_identifier,
        }
    }

    pub fn group_identifier(&self) -> &Identifier {
        &self.group_identifier
    }

    pub fn sub_group_identifier(&self) -> &Identifier {
        &self.sub_group_identifier
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(self.group_identifier.as_bytes());
        bytes[16..].copy_from_slice(self.sub_group_identifier.as_bytes());
        bytes
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LENGTH {
            return Err(Error::InvalidLength {
                field: "reader identifier",
                expected: Self::LENGTH,
                actual: bytes.len(),
            });
        }
        let (group, sub_group) = bytes.split_at(Identifier::LENGTH);
        Ok(Self {
            group_identifier: Identifier::from_slice("reader group identifier", group)?,
            sub_group_identifier: Identifier::from_slice("reader sub-group identifier", sub_group)?,
        })
    }
}

impl std::fmt::Debug for ReaderIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderIdentifier")
            .field("group", &self.group_identifier)
            .field("sub_group", &self.sub_group_identifier)
            .finish()
    }
}

impl std::fmt::Display for ReaderIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.group_identifier, self.sub_group_identifier)
    }
}
