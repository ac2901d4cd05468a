use std::convert::Infallible;

use aliro::crypto::KeyPair;
use aliro::definitions::{Instruction, Versions};
use aliro::presentation::endpoint::database::{InMemoryDatabase, KnownReaderGroup};
use aliro::presentation::endpoint::UserDeviceProcessor;
use aliro::presentation::reader::{KnownUserDevices, Reader, ReaderConfiguration, Transceiver};
use p256::PublicKey;

#[allow(dead_code)]
fn main() {}

/// An in-process endpoint that records every command APDU it is sent.
pub struct SimulatedEndpoint {
    pub processor: UserDeviceProcessor<InMemoryDatabase>,
    pub sent: Vec<Vec<u8>>,
}

impl Transceiver for SimulatedEndpoint {
    type Error = Infallible;

    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, Infallible> {
        self.sent.push(command.to_vec());
        Ok(self.processor.process_apdu(command))
    }
}

impl SimulatedEndpoint {
    pub fn new(database: InMemoryDatabase, versions: Versions) -> Self {
        Self {
            processor: UserDeviceProcessor::with_versions(database, versions),
            sent: Vec::new(),
        }
    }

    /// How many commands with `instruction` were sent since the last deselect.
    #[allow(dead_code)]
    pub fn count(&self, instruction: Instruction) -> usize {
        self.sent
            .iter()
            .filter(|apdu| apdu.get(1) == Some(&(instruction as u8)))
            .count()
    }

    #[allow(dead_code)]
    pub fn last(&self, instruction: Instruction) -> Option<&[u8]> {
        self.sent
            .iter()
            .rev()
            .find(|apdu| apdu.get(1) == Some(&(instruction as u8)))
            .map(Vec::as_slice)
    }

    /// The field goes quiet between two transactions.
    #[allow(dead_code)]
    pub fn deselect(&mut self) {
        self.processor.on_deselected();
        self.sent.clear();
    }
}

/// A reader and an endpoint that has enrolled the reader's group. Returns the endpoint's
/// long-term public key alongside.
#[allow(dead_code)]
pub fn enrolled_pair(
    configuration: ReaderConfiguration,
    endpoint_versions: Versions,
) -> (Reader<SimulatedEndpoint>, PublicKey) {
    let mut database = InMemoryDatabase::new();
    let endpoint = database.add_endpoint(
        KeyPair::generate(),
        KnownReaderGroup {
            group_identifier: *configuration.identifier.group_identifier(),
            reader_public_key: *configuration.keypair.public_key(),
        },
    );
    let reader = Reader::new(
        configuration,
        KnownUserDevices::new(),
        SimulatedEndpoint::new(database, endpoint_versions),
    );
    (reader, *endpoint.public_key())
}

/// A reader and an endpoint that has never heard of it.
#[allow(dead_code)]
pub fn unknown_reader_pair() -> Reader<SimulatedEndpoint> {
    let mut database = InMemoryDatabase::new();
    database.add_endpoint(
        KeyPair::generate(),
        KnownReaderGroup {
            group_identifier: aliro::definitions::Identifier::random(),
            reader_public_key: *KeyPair::generate().public_key(),
        },
    );
    Reader::new(
        ReaderConfiguration::generate(),
        KnownUserDevices::new(),
        SimulatedEndpoint::new(database, Versions::default()),
    )
}
