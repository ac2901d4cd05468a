use p256::PublicKey;

use crate::crypto::{self, decode_public_key, encode_public_key, SIGNATURE_LENGTH};
use crate::definitions::apdu::{
    Command, Instruction, Response, ResponseCode, StatusWord, CLA_PROPRIETARY, LE_MAX_SHORT,
    SW1_NO_FURTHER_QUALIFICATION,
};
use crate::definitions::messages::authentication::{
    authentication_data, derive_auth1_keys, TransactionKeys, ENDPOINT_USAGE, READER_USAGE,
};
use crate::definitions::messages::ProcessCommand;
use crate::definitions::secure_channel::SecureChannelState;
use crate::definitions::tlv::{self, TlvLookup, TlvValue};
use crate::definitions::util::{DisplayBytesAsHex, IntoRaw, KnownOrRaw};
use crate::error::{Error, Result};
use crate::presentation::endpoint::database::UserDeviceDatabase;
use crate::presentation::endpoint::EndpointContext;
use crate::presentation::transaction::{AuthSession, TransactionState};

const TAG_COMMAND_PARAMETERS: u8 = 0x41;
const TAG_READER_SIGNATURE: u8 = 0x9E;
const TAG_CERTIFICATE: u8 = 0x90;

const TAG_ENDPOINT_PUBLIC_KEY: u8 = 0x5A;
const TAG_KEY_SLOT: u8 = 0x4E;
const TAG_ENDPOINT_SIGNATURE: u8 = 0x9E;
const TAG_SIGNALING_BITMAP: u8 = 0x5E;

const PARAMETER_ENDPOINT_PUBLIC_KEY: u8 = 0x01;

#[derive(Clone, PartialEq, Eq)]
pub struct Auth1Command {
    pub endpoint_public_key_requested: bool,
    pub reader_signature: [u8; SIGNATURE_LENGTH],
    /// Opaque reader certificate, carried but never validated.
    pub certificate: Option<Vec<u8>>,
}

impl std::fmt::Debug for Auth1Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth1Command")
            .field(
                "endpoint_public_key_requested",
                &self.endpoint_public_key_requested,
            )
            .field(
                "reader_signature",
                &DisplayBytesAsHex::from(&self.reader_signature[..]),
            )
            .field(
                "certificate",
                &self.certificate.as_ref().map(|c| c.len()),
            )
            .finish()
    }
}

impl Auth1Command {
    pub fn new(reader_signature: [u8; SIGNATURE_LENGTH]) -> Self {
        Self {
            endpoint_public_key_requested: true,
            reader_signature,
            certificate: None,
        }
    }

    pub fn parse(command: &Command) -> Result<Self> {
        let tlvs = tlv::parse_all(&command.data)?;
        Ok(Self {
            endpoint_public_key_requested: tlvs
                .require(TAG_COMMAND_PARAMETERS)?
                .first_byte("command parameters")?
                & PARAMETER_ENDPOINT_PUBLIC_KEY
                != 0,
            reader_signature: tlvs
                .require(TAG_READER_SIGNATURE)?
                .fixed::<SIGNATURE_LENGTH>("reader signature")?,
            certificate: tlvs
                .optional(TAG_CERTIFICATE)
                .map(|tlv| tlv.bytes().map(<[u8]>::to_vec))
                .transpose()?,
        })
    }

    pub fn to_command(&self) -> Result<Command> {
        let parameters = if self.endpoint_public_key_requested {
            PARAMETER_ENDPOINT_PUBLIC_KEY
        } else {
            0x00
        };
        let mut tlvs = vec![
            tlv::primitive(TAG_COMMAND_PARAMETERS, vec![parameters])?,
            tlv::primitive(TAG_READER_SIGNATURE, self.reader_signature.to_vec())?,
        ];
        if let Some(certificate) = &self.certificate {
            tlvs.push(tlv::primitive(TAG_CERTIFICATE, certificate.clone())?);
        }
        Ok(Command::new(
            CLA_PROPRIETARY,
            Instruction::Auth1,
            0x00,
            0x00,
            tlv::encode(&tlvs),
            LE_MAX_SHORT,
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_command()?.to_bytes())
    }
}

impl ProcessCommand for Auth1Command {
    fn process<D: UserDeviceDatabase>(&self, context: &mut EndpointContext<D>) -> Result<Response> {
        let session: AuthSession = match context.transaction.state() {
            TransactionState::Auth0FastDone(session)
            | TransactionState::Auth0StandardDone(session) => session.as_ref().clone(),
            _ => return Err(Error::OutOfOrder("AUTH0")),
        };
        let group_identifier = session.reader_identifier.group_identifier();
        let reader_group = context
            .database
            .find_reader_group(group_identifier)
            .unwrap_or_else(|| {
                tracing::debug!("unknown reader group, verifying against dummy reader group");
                context.database.dummy_reader_group()
            });

        let keys = TransactionKeys {
            reader_identifier: &session.reader_identifier,
            reader_epk: &session.reader_epk,
            endpoint_epk: session.endpoint_ekeypair.public_key(),
            transaction_identifier: &session.transaction_identifier,
        };
        let reader_data = authentication_data(keys, &READER_USAGE)?;
        if !crypto::verify_signature(
            &reader_data,
            &reader_group.reader_public_key,
            &self.reader_signature,
        ) {
            tracing::error!("invalid reader signature");
            return Err(Error::InvalidSignature("reader"));
        }
        tracing::debug!("reader signature is valid");

        let k_dh = crypto::diffie_hellman_key_derivation(
            &session.reader_epk,
            session.endpoint_ekeypair.secret_key(),
            session.transaction_identifier.as_bytes(),
        );
        let derived = derive_auth1_keys(
            &k_dh,
            keys,
            session.flag,
            session.protocol_version,
            &context.versions.to_bytes(),
        )?;
        context
            .database
            .store_persistent_key(session.reader_identifier, derived.persistent.clone());

        let endpoint_signature = crypto::generate_signature(
            &authentication_data(keys, &ENDPOINT_USAGE)?,
            session.endpoint.keypair().secret_key(),
        )?;
        let plaintext = Auth1ResponsePlaintext {
            endpoint_signature,
            endpoint_public_key: Some(*session.endpoint.public_key()),
            key_slot: None,
        };
        let channel = session.secure_channel.with_keys(derived.volatile.clone());
        let (channel, response) = Auth1Response::encrypt(&channel, &plaintext)?;

        context
            .transaction
            .move_to_state(TransactionState::Auth1Done(Box::new(AuthSession {
                secure_channel: channel,
                ..session
            })))?;
        tracing::debug!("AUTH1 complete");
        Ok(response.to_response())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth1Response {
    pub status: StatusWord,
    pub ciphertext: Vec<u8>,
}

impl Auth1Response {
    pub fn from_response(response: Response) -> Self {
        Self {
            status: response.status,
            ciphertext: response.payload,
        }
    }

    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            payload: self.ciphertext.clone(),
        }
    }

    pub fn sw1(&self) -> u8 {
        self.status.into_raw().to_be_bytes()[0]
    }

    pub fn is_complete(&self) -> bool {
        self.sw1() == SW1_NO_FURTHER_QUALIFICATION
    }

    pub fn encrypt(
        channel: &SecureChannelState,
        plaintext: &Auth1ResponsePlaintext,
    ) -> Result<(SecureChannelState, Self)> {
        let (channel, ciphertext) = crypto::response_encryption(channel, &plaintext.to_bytes()?)?;
        Ok((
            channel,
            Self {
                status: KnownOrRaw::Known(ResponseCode::Ok),
                ciphertext,
            },
        ))
    }

    pub fn decrypt(&self, channel: &SecureChannelState) -> Result<Auth1ResponsePlaintext> {
        let (_, plaintext) = crypto::response_decryption(channel, &self.ciphertext)?;
        Auth1ResponsePlaintext::parse(&plaintext)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth1ResponsePlaintext {
    pub endpoint_signature: [u8; SIGNATURE_LENGTH],
    pub endpoint_public_key: Option<PublicKey>,
    pub key_slot: Option<Vec<u8>>,
}

impl Auth1ResponsePlaintext {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut tlvs = Vec::with_capacity(4);
        if let Some(public_key) = &self.endpoint_public_key {
            tlvs.push(tlv::primitive(
                TAG_ENDPOINT_PUBLIC_KEY,
                encode_public_key(public_key),
            )?);
        }
        if let Some(key_slot) = &self.key_slot {
            tlvs.push(tlv::primitive(TAG_KEY_SLOT, key_slot.clone())?);
        }
        tlvs.push(tlv::primitive(
            TAG_ENDPOINT_SIGNATURE,
            self.endpoint_signature.to_vec(),
        )?);
        tlvs.push(tlv::primitive(TAG_SIGNALING_BITMAP, vec![0x00])?);
        Ok(tlv::encode(&tlvs))
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let tlvs = tlv::parse_all(bytes)?;
        Ok(Self {
            endpoint_signature: tlvs
                .require(TAG_ENDPOINT_SIGNATURE)?
                .fixed::<SIGNATURE_LENGTH>("endpoint signature")?,
            endpoint_public_key: tlvs
                .optional(TAG_ENDPOINT_PUBLIC_KEY)
                .map(|tlv| decode_public_key(tlv.bytes()?))
                .transpose()?,
            key_slot: tlvs
                .optional(TAG_KEY_SLOT)
                .map(|tlv| tlv.bytes().map(<[u8]>::to_vec))
                .transpose()?,
        })
    }
}
