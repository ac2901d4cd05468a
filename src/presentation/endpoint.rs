//! Endpoint side of a transaction: the credential holder answering a reader's APDUs.
//!
//! ```ignore
//! let mut processor = UserDeviceProcessor::new(InMemoryDatabase::new());
//! let response = processor.process_apdu(&command_apdu);
//! ```

pub mod database;

use database::UserDeviceDatabase;

use crate::definitions::apdu::Response;
use crate::definitions::messages::{AliroCommand, ErrorResponse, ProcessCommand};
use crate::definitions::util::IntoRaw;
use crate::definitions::versions::Versions;
use crate::error::Result;
use crate::presentation::transaction::Transaction;

/// What a command needs while being processed.
#[derive(Debug)]
pub struct EndpointContext<D> {
    pub database: D,
    pub transaction: Transaction,
    pub versions: Versions,
}

impl<D: UserDeviceDatabase> EndpointContext<D> {
    pub fn new(database: D, versions: Versions) -> Self {
        Self {
            database,
            transaction: Transaction::new(),
            versions,
        }
    }
}

/// Parses incoming command APDUs and answers them, one session at a time.
#[derive(Debug)]
pub struct UserDeviceProcessor<D> {
    context: EndpointContext<D>,
}

impl<D: UserDeviceDatabase> UserDeviceProcessor<D> {
    pub fn new(database: D) -> Self {
        Self::with_versions(database, Versions::default())
    }

    pub fn with_versions(database: D, versions: Versions) -> Self {
        Self {
            context: EndpointContext::new(database, versions),
        }
    }

    pub fn parse_command(&self, command: &[u8]) -> Result<AliroCommand> {
        AliroCommand::parse(command)
    }

    /// Run `command`, turning any failure into a bare status word.
    pub fn process_command(&mut self, command: &AliroCommand) -> Response {
        match command.process(&mut self.context) {
            Ok(response) => response,
            Err(err) => {
                let response = ErrorResponse::from(&err);
                tracing::error!(
                    "{:?} failed: {err}, responding {:#06X}",
                    command.instruction(),
                    response.0.into_raw()
                );
                response.into()
            }
        }
    }

    pub fn process_apdu(&mut self, command: &[u8]) -> Vec<u8> {
        let response = match self.parse_command(command) {
            Ok(command) => self.process_command(&command),
            Err(err) => {
                let response = ErrorResponse::from(&err);
                tracing::error!(
                    "could not parse command APDU: {err}, responding {:#06X}",
                    response.0.into_raw()
                );
                response.into()
            }
        };
        tracing::debug!("response: {}", hex::encode(&response.payload));
        response.into()
    }

    /// The reader went away; discard any handshake in progress.
    pub fn on_deselected(&mut self) {
        self.context.transaction.stop();
    }

    pub fn transaction(&self) -> &Transaction {
        &self.context.transaction
    }

    pub fn database(&self) -> &D {
        &self.context.database
    }

    pub fn database_mut(&mut self) -> &mut D {
        &mut self.context.database
    }
}

#[cfg(test)]
mod test {
    use super::database::InMemoryDatabase;
    use super::*;
    use crate::definitions::apdu::ResponseCode;
    use crate::definitions::messages::{Auth1Command, SelectCommand};
    use crate::presentation::transaction::StateKind;
    use hex_literal::hex;

    #[test]
    fn errors_become_status_words() {
        let mut processor = UserDeviceProcessor::new(InMemoryDatabase::new());
        assert_eq!(processor.process_apdu(&hex!("80120000")), hex!("6d00"));
        assert_eq!(processor.process_apdu(&hex!("00800000")), hex!("6e00"));
        assert_eq!(processor.process_apdu(&hex!("8080")), hex!("6700"));
        // AUTH1 before AUTH0
        let auth1 = Auth1Command::new([0x01; 64]).to_bytes().unwrap();
        assert_eq!(
            processor.process_apdu(&auth1),
            ResponseCode::GenericError.to_bytes()
        );
        assert_eq!(processor.transaction().state().kind(), StateKind::Initial);

        // empty command parameters are a TLV error, not a frame length error
        let mut empty_parameters = Auth1Command::new([0x01; 64]).to_command().unwrap();
        empty_parameters.data.remove(2);
        empty_parameters.data[1] = 0x00;
        assert_eq!(
            processor.process_apdu(&empty_parameters.to_bytes()),
            ResponseCode::Unspecified.to_bytes()
        );

        // still usable afterwards
        let response = processor.process_apdu(&SelectCommand::aliro().to_bytes());
        assert_eq!(&response[response.len() - 2..], &hex!("9000"));
        assert_eq!(processor.transaction().state().kind(), StateKind::SelectDone);
    }

    #[test]
    fn deselect_resets() {
        let mut processor = UserDeviceProcessor::new(InMemoryDatabase::new());
        processor.process_apdu(&SelectCommand::aliro().to_bytes());
        processor.on_deselected();
        assert_eq!(processor.transaction().state().kind(), StateKind::Initial);
    }
}
