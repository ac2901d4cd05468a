use p256::PublicKey;
use rand::{rngs::OsRng, seq::SliceRandom};

use crate::crypto::{self, decode_public_key, encode_public_key, x_bytes};
use crate::definitions::apdu::{Command, Instruction, Response, CLA_PROPRIETARY, LE_MAX_SHORT};
use crate::definitions::identifier::{Cryptogram, Identifier, ReaderIdentifier};
use crate::definitions::messages::authentication::{INTERFACE_CONTACTLESS, TAG_VERSION_LIST};
use crate::definitions::messages::ProcessCommand;
use crate::definitions::secure_channel::{
    PersistentKey, SecureChannelKeys, SecureChannelState, FAST_KEY_BLOCK_LENGTH,
};
use crate::definitions::tlv::{self, TlvLookup, TlvValue};
use crate::definitions::transaction_code::TransactionCode;
use crate::definitions::versions::version_bytes;
use crate::error::{Error, Result};
use crate::presentation::endpoint::database::UserDeviceDatabase;
use crate::presentation::endpoint::EndpointContext;
use crate::presentation::transaction::{AuthSession, StateKind, TransactionState};

const TAG_COMMAND_PARAMETERS: u8 = 0x41;
const TAG_TRANSACTION_CODE: u8 = 0x42;
const TAG_PROTOCOL_VERSION: u8 = 0x5C;
const TAG_READER_EPK: u8 = 0x87;
const TAG_TRANSACTION_IDENTIFIER: u8 = 0x4C;
const TAG_READER_IDENTIFIER: u8 = 0x4D;

const TAG_ENDPOINT_EPK: u8 = 0x86;
const TAG_CRYPTOGRAM: u8 = 0x9D;

const PARAMETER_FAST: u8 = 0x01;
const FAST_SALT_LABEL: &[u8] = b"VolatileFast";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth0Command {
    pub fast: bool,
    pub transaction_code: TransactionCode,
    pub protocol_version: u16,
    pub reader_epk: PublicKey,
    pub transaction_identifier: Identifier,
    pub reader_identifier: ReaderIdentifier,
}

impl Auth0Command {
    pub fn parameter1(&self) -> u8 {
        if self.fast {
            PARAMETER_FAST
        } else {
            0x00
        }
    }

    /// AUTH0 parameter1 followed by the transaction code.
    pub fn flag(&self) -> [u8; 2] {
        [self.parameter1(), self.transaction_code.into()]
    }

    pub fn parse(command: &Command) -> Result<Self> {
        let tlvs = tlv::parse_all(&command.data)?;
        Ok(Self {
            fast: tlvs
                .require(TAG_COMMAND_PARAMETERS)?
                .first_byte("command parameters")?
                & PARAMETER_FAST
                != 0,
            transaction_code: tlvs
                .require(TAG_TRANSACTION_CODE)?
                .first_byte("transaction code")?
                .into(),
            protocol_version: u16::from_be_bytes(
                tlvs.require(TAG_PROTOCOL_VERSION)?
                    .fixed::<2>("protocol version")?,
            ),
            reader_epk: decode_public_key(tlvs.require(TAG_READER_EPK)?.bytes()?)?,
            transaction_identifier: Identifier::from_slice(
                "transaction identifier",
                tlvs.require(TAG_TRANSACTION_IDENTIFIER)?.bytes()?,
            )?,
            reader_identifier: ReaderIdentifier::parse(
                tlvs.require(TAG_READER_IDENTIFIER)?.bytes()?,
            )?,
        })
    }

    pub fn to_command(&self) -> Result<Command> {
        let data = tlv::encode(&[
            tlv::primitive(TAG_COMMAND_PARAMETERS, vec![self.parameter1()])?,
            tlv::primitive(TAG_TRANSACTION_CODE, vec![self.transaction_code.into()])?,
            tlv::primitive(TAG_PROTOCOL_VERSION, version_bytes(self.protocol_version))?,
            tlv::primitive(TAG_READER_EPK, encode_public_key(&self.reader_epk))?,
            tlv::primitive(TAG_TRANSACTION_IDENTIFIER, self.transaction_identifier.to_vec())?,
            tlv::primitive(TAG_READER_IDENTIFIER, self.reader_identifier.to_bytes())?,
        ]);
        Ok(Command::new(
            CLA_PROPRIETARY,
            Instruction::Auth0,
            0x00,
            0x00,
            data,
            LE_MAX_SHORT,
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_command()?.to_bytes())
    }
}

/// Inputs of the fast path cryptogram, identical on the reader and the endpoint.
#[derive(Debug, Clone, Copy)]
pub struct FastDerivation<'a> {
    pub transaction_identifier: &'a Identifier,
    pub endpoint_public_key: &'a PublicKey,
    pub reader_public_key: &'a PublicKey,
    pub reader_identifier: &'a ReaderIdentifier,
    pub persistent_key: &'a PersistentKey,
    pub protocol_version: u16,
    /// The endpoint's supported versions, as sent in the SELECT response.
    pub supported_versions: &'a [u8],
    pub reader_epk: &'a PublicKey,
    pub endpoint_epk: &'a PublicKey,
    pub flag: [u8; 2],
}

impl FastDerivation<'_> {
    fn salt(&self) -> Vec<u8> {
        let mut salt = Vec::with_capacity(192);
        salt.extend_from_slice(&x_bytes(self.reader_public_key));
        salt.extend_from_slice(FAST_SALT_LABEL);
        salt.extend_from_slice(&self.reader_identifier.to_bytes());
        salt.extend_from_slice(&x_bytes(self.endpoint_public_key));
        salt.push(INTERFACE_CONTACTLESS);
        salt.push(TAG_VERSION_LIST);
        salt.push(self.supported_versions.len() as u8);
        salt.extend_from_slice(self.supported_versions);
        salt.push(TAG_VERSION_LIST);
        salt.push(0x02);
        salt.extend_from_slice(&version_bytes(self.protocol_version));
        salt.extend_from_slice(&x_bytes(self.reader_epk));
        salt.extend_from_slice(self.transaction_identifier.as_bytes());
        salt.extend_from_slice(&self.flag);
        salt
    }

    /// The cryptogram and the channel keys of a fast transaction.
    pub fn compute_derived_keys(&self) -> Result<(Cryptogram, SecureChannelKeys)> {
        let block = crypto::key_derivation::<FAST_KEY_BLOCK_LENGTH>(
            self.persistent_key.as_bytes(),
            &self.salt(),
            &x_bytes(self.endpoint_epk),
        )?;
        let cryptogram = Cryptogram::from_slice("cryptogram", &block[..Cryptogram::LENGTH])?;
        Ok((cryptogram, SecureChannelKeys::from_fast_block(&block)))
    }
}

impl ProcessCommand for Auth0Command {
    fn process<D: UserDeviceDatabase>(&self, context: &mut EndpointContext<D>) -> Result<Response> {
        if context.transaction.state().kind() != StateKind::SelectDone {
            return Err(Error::OutOfOrder("SELECT"));
        }
        if !context.versions.is_supported(self.protocol_version) {
            return Err(Error::UnsupportedVersion(self.protocol_version));
        }

        let endpoint_ekeypair = crypto::generate_ephemeral_keypair();
        let group_identifier = self.reader_identifier.group_identifier();
        let endpoints = context.database.find_endpoints(group_identifier);
        let endpoint = match endpoints.as_slice() {
            [] => {
                tracing::debug!("no endpoint enrolled for reader group, using dummy endpoint");
                context.database.dummy_endpoint()
            }
            [endpoint] => endpoint.clone(),
            several => several
                .choose(&mut OsRng)
                .cloned()
                .unwrap_or_else(|| context.database.dummy_endpoint()),
        };

        let mut session = AuthSession {
            transaction_identifier: self.transaction_identifier,
            reader_identifier: self.reader_identifier,
            endpoint,
            reader_epk: self.reader_epk,
            endpoint_ekeypair,
            flag: self.flag(),
            secure_channel: SecureChannelState::default(),
            protocol_version: self.protocol_version,
        };

        if !self.fast {
            tracing::debug!("processing AUTH0 as a standard transaction");
            let response = Auth0Response {
                endpoint_epk: *session.endpoint_ekeypair.public_key(),
                cryptogram: None,
            };
            context
                .transaction
                .move_to_state(TransactionState::Auth0StandardDone(Box::new(session)))?;
            return response.to_response();
        }

        tracing::debug!("processing AUTH0 as a fast transaction");
        let reader_group = context
            .database
            .find_reader_group(group_identifier)
            .unwrap_or_else(|| {
                tracing::debug!("unknown reader group, using dummy reader group");
                context.database.dummy_reader_group()
            });
        tracing::debug!("database status: {}", context.database.debug());
        let persistent_key = context
            .database
            .find_persistent_key(&self.reader_identifier)
            .unwrap_or_else(|| {
                tracing::debug!("no persistent key for reader, using dummy persistent key");
                context.database.dummy_persistent_key()
            });

        let supported_versions = context.versions.to_bytes();
        let (cryptogram, keys) = FastDerivation {
            transaction_identifier: &self.transaction_identifier,
            endpoint_public_key: session.endpoint.public_key(),
            reader_public_key: &reader_group.reader_public_key,
            reader_identifier: &self.reader_identifier,
            persistent_key: &persistent_key,
            protocol_version: self.protocol_version,
            supported_versions: &supported_versions,
            reader_epk: &self.reader_epk,
            endpoint_epk: session.endpoint_ekeypair.public_key(),
            flag: self.flag(),
        }
        .compute_derived_keys()?;

        session.secure_channel = SecureChannelState::new(Some(keys));
        let response = Auth0Response {
            endpoint_epk: *session.endpoint_ekeypair.public_key(),
            cryptogram: Some(cryptogram),
        };
        context
            .transaction
            .move_to_state(TransactionState::Auth0FastDone(Box::new(session)))?;
        response.to_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth0Response {
    pub endpoint_epk: PublicKey,
    pub cryptogram: Option<Cryptogram>,
}

impl Auth0Response {
    pub fn to_response(&self) -> Result<Response> {
        let mut tlvs = vec![tlv::primitive(
            TAG_ENDPOINT_EPK,
            encode_public_key(&self.endpoint_epk),
        )?];
        if let Some(cryptogram) = &self.cryptogram {
            tlvs.push(tlv::primitive(TAG_CRYPTOGRAM, cryptogram.to_vec())?);
        }
        Ok(Response::ok(tlv::encode(&tlvs)))
    }

    pub fn parse(response: &Response) -> Result<Self> {
        let tlvs = tlv::parse_all(&response.payload)?;
        Ok(Self {
            endpoint_epk: decode_public_key(tlvs.require(TAG_ENDPOINT_EPK)?.bytes()?)?,
            cryptogram: tlvs
                .optional(TAG_CRYPTOGRAM)
                .map(|tlv| Cryptogram::from_slice("cryptogram", tlv.bytes()?))
                .transpose()?,
        })
    }
}
