//! Reader side of a transaction.
//!
//! The [Reader] drives SELECT, AUTH0 and then either CONTROL_FLOW (fast path hit) or AUTH1
//! against whatever carries APDUs to the endpoint, abstracted as a [Transceiver].
//!
//! ```ignore
//! let mut reader = Reader::new(configuration, KnownUserDevices::new(), |apdu: &[u8]| {
//!     nfc.transceive(apdu)
//! });
//! match reader.transact(TransactionCode::Unlock)? {
//!     TransactionResult::Authorized { .. } => open_door(),
//!     TransactionResult::Unauthorized => {}
//! }
//! ```

pub mod config;

use p256::PublicKey;
use subtle::ConstantTimeEq;

pub use config::{KnownUserDevice, KnownUserDevices, ReaderConfiguration};

use crate::crypto::{self, encode_public_key, KeyPair};
use crate::definitions::apdu::{Response, ResponseCode};
use crate::definitions::identifier::{Cryptogram, Identifier};
use crate::definitions::messages::authentication::{
    authentication_data, derive_auth1_keys, TransactionKeys, ENDPOINT_USAGE, READER_USAGE,
};
use crate::definitions::messages::auth0::FastDerivation;
use crate::definitions::messages::{
    Auth0Command, Auth0Response, Auth1Command, Auth1Response, ControlFlowCommand,
    ControlFlowResponse, SelectCommand, SelectResponse,
};
use crate::definitions::secure_channel::SecureChannelState;
use crate::definitions::transaction_code::TransactionCode;
use crate::definitions::util::IntoRaw;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] crate::Error),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("{command} rejected with status {status:#06X}")]
    Rejected { command: &'static str, status: u16 },
}

/// Carries one command APDU to the endpoint and returns its response APDU.
pub trait Transceiver {
    type Error: std::fmt::Display;

    fn transceive(&mut self, command: &[u8]) -> std::result::Result<Vec<u8>, Self::Error>;
}

impl<F, E> Transceiver for F
where
    F: FnMut(&[u8]) -> std::result::Result<Vec<u8>, E>,
    E: std::fmt::Display,
{
    type Error = E;

    fn transceive(&mut self, command: &[u8]) -> std::result::Result<Vec<u8>, E> {
        self(command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResult {
    Authorized {
        transaction_identifier: Identifier,
        endpoint_public_key: PublicKey,
    },
    Unauthorized,
}

impl TransactionResult {
    pub fn is_authorized(&self) -> bool {
        matches!(self, TransactionResult::Authorized { .. })
    }
}

/// What AUTH0 established; the input to both the fast check and AUTH1.
#[derive(Debug)]
struct Auth0Exchange {
    command: Auth0Command,
    reader_ekeypair: KeyPair,
    response: Auth0Response,
    supported_versions: Vec<u8>,
}

pub struct Reader<T> {
    configuration: ReaderConfiguration,
    known_devices: KnownUserDevices,
    transceiver: T,
}

impl<T> std::fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("identifier", &self.configuration.identifier)
            .field("known_devices", &self.known_devices.len())
            .finish()
    }
}

impl<T: Transceiver> Reader<T> {
    pub fn new(
        configuration: ReaderConfiguration,
        known_devices: KnownUserDevices,
        transceiver: T,
    ) -> Self {
        Self {
            configuration,
            known_devices,
            transceiver,
        }
    }

    pub fn configuration(&self) -> &ReaderConfiguration {
        &self.configuration
    }

    pub fn known_devices(&self) -> &KnownUserDevices {
        &self.known_devices
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut T {
        &mut self.transceiver
    }

    /// Run one complete transaction against the endpoint behind the transceiver.
    pub fn transact(&mut self, code: TransactionCode) -> Result<TransactionResult, Error> {
        let Some(select) = self.send_select()? else {
            return Ok(TransactionResult::Unauthorized);
        };
        let protocol_version = self
            .configuration
            .versions
            .highest_supported(&select.supported_versions)
            .ok_or(crate::Error::NoSupportedVersion)?;
        tracing::debug!("negotiated protocol version {protocol_version:#06X}");

        let exchange = self.send_auth0(code, protocol_version, select.supported_versions)?;

        if let Some(cryptogram) = &exchange.response.cryptogram {
            if let Some(device) = self.check_cryptograms(&exchange, cryptogram) {
                tracing::debug!("fast transaction matched a known device");
                let response = self.send_control_flow(ControlFlowCommand::success(true))?;
                if !response.status.is(ResponseCode::Ok) {
                    tracing::warn!(
                        "CONTROL_FLOW answered {:#06X}",
                        response.status.into_raw()
                    );
                }
                return Ok(TransactionResult::Authorized {
                    transaction_identifier: exchange.command.transaction_identifier,
                    endpoint_public_key: device.public_key,
                });
            }
            tracing::debug!("no known device matches the cryptogram, falling back to AUTH1");
        }

        self.send_auth1(&exchange)
    }

    fn transceive(&mut self, command: Vec<u8>) -> Result<Response, Error> {
        tracing::debug!("sending APDU: {}", hex::encode(&command));
        let response = self
            .transceiver
            .transceive(&command)
            .map_err(|err| Error::Transport(err.to_string()))?;
        tracing::debug!("received APDU: {}", hex::encode(&response));
        Ok(Response::try_from(response.as_slice())?)
    }

    /// SELECT the Aliro applet. `None` when the endpoint refused.
    pub fn send_select(&mut self) -> Result<Option<SelectResponse>, Error> {
        let response = self.transceive(SelectCommand::aliro().to_bytes())?;
        if !response.is_success() {
            tracing::warn!("SELECT answered {:#06X}", response.status.into_raw());
            return Ok(None);
        }
        Ok(Some(SelectResponse::parse(&response)?))
    }

    fn send_auth0(
        &mut self,
        code: TransactionCode,
        protocol_version: u16,
        supported_versions: Vec<u8>,
    ) -> Result<Auth0Exchange, Error> {
        let reader_ekeypair = crypto::generate_ephemeral_keypair();
        let command = Auth0Command {
            fast: self.configuration.send_fast_transaction,
            transaction_code: code,
            protocol_version,
            reader_epk: *reader_ekeypair.public_key(),
            transaction_identifier: Identifier::random(),
            reader_identifier: self.configuration.identifier,
        };
        let response = self.transceive(command.to_bytes()?)?;
        if !response.is_success() {
            return Err(Error::Rejected {
                command: "AUTH0",
                status: response.status.into_raw(),
            });
        }
        Ok(Auth0Exchange {
            response: Auth0Response::parse(&response)?,
            command,
            reader_ekeypair,
            supported_versions,
        })
    }

    /// The first known device whose fast path cryptogram equals `cryptogram`.
    fn check_cryptograms(
        &self,
        exchange: &Auth0Exchange,
        cryptogram: &Cryptogram,
    ) -> Option<KnownUserDevice> {
        self.known_devices.snapshot().into_iter().find(|device| {
            let derivation = FastDerivation {
                transaction_identifier: &exchange.command.transaction_identifier,
                endpoint_public_key: &device.public_key,
                reader_public_key: self.configuration.keypair.public_key(),
                reader_identifier: &self.configuration.identifier,
                persistent_key: &device.persistent_key,
                protocol_version: exchange.command.protocol_version,
                supported_versions: &exchange.supported_versions,
                reader_epk: &exchange.command.reader_epk,
                endpoint_epk: &exchange.response.endpoint_epk,
                flag: exchange.command.flag(),
            };
            match derivation.compute_derived_keys() {
                Ok((expected, _)) => {
                    expected.as_bytes()[..].ct_eq(&cryptogram.as_bytes()[..]).into()
                }
                Err(err) => {
                    tracing::error!("fast derivation failed: {err}");
                    false
                }
            }
        })
    }

    fn send_auth1(&mut self, exchange: &Auth0Exchange) -> Result<TransactionResult, Error> {
        let reader_identifier = self.configuration.identifier;
        let keys = TransactionKeys {
            reader_identifier: &reader_identifier,
            reader_epk: &exchange.command.reader_epk,
            endpoint_epk: &exchange.response.endpoint_epk,
            transaction_identifier: &exchange.command.transaction_identifier,
        };
        let signature = crypto::generate_signature(
            &authentication_data(keys, &READER_USAGE)?,
            self.configuration.keypair.secret_key(),
        )?;
        let response = Auth1Response::from_response(
            self.transceive(Auth1Command::new(signature).to_bytes()?)?,
        );

        let k_dh = crypto::diffie_hellman_key_derivation(
            &exchange.response.endpoint_epk,
            exchange.reader_ekeypair.secret_key(),
            exchange.command.transaction_identifier.as_bytes(),
        );
        let derived = derive_auth1_keys(
            &k_dh,
            keys,
            exchange.command.flag(),
            exchange.command.protocol_version,
            &exchange.supported_versions,
        )?;

        if !response.is_complete() {
            tracing::warn!("AUTH1 answered {:#06X}", response.status.into_raw());
            return Ok(TransactionResult::Unauthorized);
        }

        let plaintext = match response.decrypt(&SecureChannelState::new(Some(derived.volatile))) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                tracing::error!("could not decrypt AUTH1 response: {err}");
                return Ok(TransactionResult::Unauthorized);
            }
        };
        let Some(endpoint_public_key) = plaintext.endpoint_public_key else {
            tracing::error!("AUTH1 response carries no endpoint public key");
            return Ok(TransactionResult::Unauthorized);
        };
        if !crypto::verify_signature(
            &authentication_data(keys, &ENDPOINT_USAGE)?,
            &endpoint_public_key,
            &plaintext.endpoint_signature,
        ) {
            tracing::error!("invalid endpoint signature");
            return Ok(TransactionResult::Unauthorized);
        }

        tracing::debug!(
            "endpoint {} authenticated",
            hex::encode(encode_public_key(&endpoint_public_key))
        );
        self.known_devices.add(KnownUserDevice {
            public_key: endpoint_public_key,
            persistent_key: derived.persistent,
        });
        Ok(TransactionResult::Authorized {
            transaction_identifier: exchange.command.transaction_identifier,
            endpoint_public_key,
        })
    }

    pub fn send_control_flow(
        &mut self,
        command: ControlFlowCommand,
    ) -> Result<ControlFlowResponse, Error> {
        let response = self.transceive(command.to_bytes()?)?;
        Ok(ControlFlowResponse::parse(&response))
    }
}

#[cfg(test)]
mod test {
    use std::convert::Infallible;

    use super::*;
    use crate::definitions::apdu::{Command, Instruction};
    use crate::definitions::messages::Auth1ResponsePlaintext;
    use crate::definitions::versions::Versions;
    use crate::presentation::endpoint::database::{InMemoryDatabase, KnownReaderGroup};
    use crate::presentation::endpoint::UserDeviceProcessor;
    use hex_literal::hex;

    fn select_response() -> Vec<u8> {
        SelectResponse::new(&Versions::default())
            .to_response()
            .unwrap()
            .into()
    }

    fn instruction(apdu: &[u8]) -> u8 {
        apdu[1]
    }

    fn endpoint_for(configuration: &ReaderConfiguration) -> UserDeviceProcessor<InMemoryDatabase> {
        let mut database = InMemoryDatabase::new();
        database.add_endpoint(
            KeyPair::generate(),
            KnownReaderGroup {
                group_identifier: *configuration.identifier.group_identifier(),
                reader_public_key: *configuration.keypair.public_key(),
            },
        );
        UserDeviceProcessor::new(database)
    }

    fn reader<T: Transceiver>(transceiver: T) -> Reader<T> {
        Reader::new(
            ReaderConfiguration::generate(),
            KnownUserDevices::new(),
            transceiver,
        )
    }

    #[test]
    fn refused_select_is_unauthorized() {
        let mut reader = reader(|_: &[u8]| Ok::<_, Infallible>(hex!("6a82").to_vec()));
        assert_eq!(
            reader.transact(TransactionCode::Unlock).unwrap(),
            TransactionResult::Unauthorized
        );
    }

    #[test]
    fn transport_failures_propagate() {
        let mut reader = reader(|_: &[u8]| Err::<Vec<u8>, _>("link lost"));
        assert!(matches!(
            reader.transact(TransactionCode::Unlock),
            Err(Error::Transport(message)) if message == "link lost"
        ));
    }

    #[test]
    fn no_common_version() {
        let select = SelectResponse::new(&Versions::new(vec![0x0200]))
            .to_response()
            .unwrap();
        let mut reader = reader(move |_: &[u8]| {
            Ok::<_, Infallible>(Vec::<u8>::from(select.clone()))
        });
        assert!(matches!(
            reader.transact(TransactionCode::Lock),
            Err(Error::Protocol(crate::Error::NoSupportedVersion))
        ));
    }

    #[test]
    fn malformed_select_response_propagates() {
        let mut reader = reader(|_: &[u8]| Ok::<_, Infallible>(hex!("9000").to_vec()));
        assert!(matches!(
            reader.transact(TransactionCode::Unlock),
            Err(Error::Protocol(crate::Error::MissingTag(0x6F)))
        ));
    }

    #[test]
    fn malformed_auth0_response_propagates() {
        let mut reader = reader(|apdu: &[u8]| {
            Ok::<_, Infallible>(match instruction(apdu) {
                0xA4 => select_response(),
                _ => hex!("9000").to_vec(),
            })
        });
        assert!(matches!(
            reader.transact(TransactionCode::Unlock),
            Err(Error::Protocol(crate::Error::MissingTag(0x86)))
        ));
    }

    #[test]
    fn refused_auth0_is_rejected() {
        let mut reader = reader(|apdu: &[u8]| {
            Ok::<_, Infallible>(match instruction(apdu) {
                0xA4 => select_response(),
                _ => hex!("6985").to_vec(),
            })
        });
        assert!(matches!(
            reader.transact(TransactionCode::Unlock),
            Err(Error::Rejected {
                command: "AUTH0",
                status: 0x6985
            })
        ));
    }

    #[test]
    fn tampered_auth1_ciphertext_is_unauthorized() {
        let configuration = ReaderConfiguration::generate();
        let mut endpoint = endpoint_for(&configuration);
        let mut reader = Reader::new(
            configuration,
            KnownUserDevices::new(),
            move |apdu: &[u8]| {
                let mut response = endpoint.process_apdu(apdu);
                if instruction(apdu) == Instruction::Auth1 as u8 {
                    assert_eq!(&response[response.len() - 2..], &hex!("9000"));
                    response[0] ^= 0x01;
                }
                Ok::<_, Infallible>(response)
            },
        );
        assert_eq!(
            reader.transact(TransactionCode::Unlock).unwrap(),
            TransactionResult::Unauthorized
        );
        assert!(reader.known_devices().is_empty());
    }

    #[test]
    fn endpoint_signature_over_wrong_data_is_unauthorized() {
        let endpoint = KeyPair::generate();
        let mut auth0: Option<(Auth0Command, KeyPair)> = None;
        let mut reader = reader(move |apdu: &[u8]| {
            let response = match instruction(apdu) {
                0xA4 => return Ok::<_, Infallible>(select_response()),
                0x80 => {
                    let command = Auth0Command::parse(&Command::parse(apdu).unwrap()).unwrap();
                    let ekeypair = KeyPair::generate();
                    let response = Auth0Response {
                        endpoint_epk: *ekeypair.public_key(),
                        cryptogram: None,
                    };
                    auth0 = Some((command, ekeypair));
                    response.to_response().unwrap()
                }
                _ => {
                    let (command, ekeypair) = auth0.as_ref().unwrap();
                    let keys = TransactionKeys {
                        reader_identifier: &command.reader_identifier,
                        reader_epk: &command.reader_epk,
                        endpoint_epk: ekeypair.public_key(),
                        transaction_identifier: &command.transaction_identifier,
                    };
                    let k_dh = crypto::diffie_hellman_key_derivation(
                        &command.reader_epk,
                        ekeypair.secret_key(),
                        command.transaction_identifier.as_bytes(),
                    );
                    let derived = derive_auth1_keys(
                        &k_dh,
                        keys,
                        command.flag(),
                        command.protocol_version,
                        &Versions::default().to_bytes(),
                    )
                    .unwrap();
                    // signed with the reader's usage instead of the endpoint's
                    let plaintext = Auth1ResponsePlaintext {
                        endpoint_signature: crypto::generate_signature(
                            &authentication_data(keys, &READER_USAGE).unwrap(),
                            endpoint.secret_key(),
                        )
                        .unwrap(),
                        endpoint_public_key: Some(*endpoint.public_key()),
                        key_slot: None,
                    };
                    let channel = SecureChannelState::new(Some(derived.volatile));
                    let (_, response) = Auth1Response::encrypt(&channel, &plaintext).unwrap();
                    response.to_response()
                }
            };
            Ok(response.into())
        });
        assert_eq!(
            reader.transact(TransactionCode::Unlock).unwrap(),
            TransactionResult::Unauthorized
        );
        assert!(reader.known_devices().is_empty());
    }
}
