//! Aliro mutual authentication between an access control reader and a user device (the
//! endpoint), carried over ISO 7816-4 APDUs.
//!
//! - [definitions] holds the wire types: APDUs, BER-TLV, identifiers and the four
//!   protocol messages.
//! - [crypto] holds the P-256 primitives the handshake is built from.
//! - [presentation] holds the two session drivers, [presentation::endpoint::UserDeviceProcessor]
//!   and [presentation::reader::Reader], and the endpoint's transaction state machine.
//!
//! ```ignore
//! use aliro::definitions::TransactionCode;
//! use aliro::presentation::endpoint::{database::InMemoryDatabase, UserDeviceProcessor};
//! use aliro::presentation::reader::{KnownUserDevices, Reader, ReaderConfiguration};
//!
//! let mut endpoint = UserDeviceProcessor::new(InMemoryDatabase::new());
//! let mut reader = Reader::new(
//!     ReaderConfiguration::generate(),
//!     KnownUserDevices::new(),
//!     |apdu: &[u8]| Ok::<_, std::convert::Infallible>(endpoint.process_apdu(apdu)),
//! );
//! let result = reader.transact(TransactionCode::Unlock)?;
//! ```
pub mod crypto;
pub mod definitions;
pub mod error;
pub mod presentation;

pub use error::{Error, ErrorKind, Result};
