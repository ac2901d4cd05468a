use iso7816_tlv::TlvError;

use crate::definitions::apdu::ResponseCode;
use crate::presentation::transaction::StateKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [Error].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorKind {
    /// Malformed APDU or TLV, missing tag, bad field length.
    Parse,
    /// Illegal state transition or a command issued out of order.
    Sequencing,
    /// No mutually supported protocol version.
    Version,
    /// Signature verification failed.
    Authentication,
    /// AEAD operation without keys, or a tag mismatch while decrypting.
    Channel,
    /// Failure inside a cryptographic primitive.
    Crypto,
}

/// Errors raised while encoding, decoding or processing protocol messages.
///
/// Messages never include key material.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed APDU: {0}")]
    MalformedApdu(&'static str),
    #[error("unsupported class {0:#04X}")]
    InvalidClass(u8),
    #[error("unsupported instruction {0:#04X}")]
    UnknownInstruction(u8),
    #[error("incorrect parameters P1={0:#04X} P2={1:#04X}")]
    IncorrectParameters(u8, u8),
    #[error("invalid TLV encoding: {0}")]
    Tlv(TlvError),
    #[error("TLV object has an unexpected value type")]
    UnexpectedTlvValue,
    #[error("empty {0} value")]
    EmptyTlvValue(&'static str),
    #[error("missing required tag {0:#04X}")]
    MissingTag(u8),
    #[error("expected {expected} bytes for {field}, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid public key encoding")]
    InvalidPublicKey,
    #[error("invalid private key encoding")]
    InvalidPrivateKey,
    #[error("cannot transition from {from} state to {to} state")]
    IllegalTransition { from: StateKind, to: StateKind },
    #[error("{0} must be completed first")]
    OutOfOrder(&'static str),
    #[error("unsupported protocol version {0:#06X}")]
    UnsupportedVersion(u16),
    #[error("no mutually supported protocol version")]
    NoSupportedVersion,
    #[error("invalid {0} signature")]
    InvalidSignature(&'static str),
    #[error("secure channel keys have not been established")]
    MissingChannelKeys,
    #[error("AES-GCM {0} failed")]
    Aead(&'static str),
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<TlvError> for Error {
    fn from(error: TlvError) -> Self {
        Error::Tlv(error)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedApdu(_)
            | Error::InvalidClass(_)
            | Error::UnknownInstruction(_)
            | Error::IncorrectParameters(..)
            | Error::Tlv(_)
            | Error::UnexpectedTlvValue
            | Error::EmptyTlvValue(_)
            | Error::MissingTag(_)
            | Error::InvalidLength { .. }
            | Error::InvalidPublicKey
            | Error::InvalidPrivateKey => ErrorKind::Parse,
            Error::IllegalTransition { .. } | Error::OutOfOrder(_) => ErrorKind::Sequencing,
            Error::UnsupportedVersion(_) | Error::NoSupportedVersion => ErrorKind::Version,
            Error::InvalidSignature(_) => ErrorKind::Authentication,
            Error::MissingChannelKeys | Error::Aead(_) => ErrorKind::Channel,
            Error::KeyDerivation(_) | Error::Signing(_) => ErrorKind::Crypto,
        }
    }

    /// The status word an endpoint answers with when processing fails with this error.
    pub fn status_word(&self) -> ResponseCode {
        match self {
            Error::UnknownInstruction(_) => ResponseCode::InstructionNotSupported,
            Error::InvalidClass(_) => ResponseCode::ClassNotSupported,
            Error::IncorrectParameters(..) => ResponseCode::IncorrectP1OrP2,
            Error::MalformedApdu(_) | Error::InvalidLength { .. } => ResponseCode::WrongLength,
            Error::Tlv(_)
            | Error::UnexpectedTlvValue
            | Error::EmptyTlvValue(_)
            | Error::MissingTag(_)
            | Error::InvalidPublicKey
            | Error::InvalidPrivateKey => ResponseCode::Unspecified,
            Error::IllegalTransition { .. }
            | Error::OutOfOrder(_)
            | Error::UnsupportedVersion(_)
            | Error::NoSupportedVersion
            | Error::InvalidSignature(_)
            | Error::MissingChannelKeys
            | Error::Aead(_) => ResponseCode::GenericError,
            Error::KeyDerivation(_) | Error::Signing(_) => ResponseCode::Unspecified,
        }
    }
}
