mod common;

use anyhow::{Context, Result};
use hex_literal::hex;

use aliro::crypto::KeyPair;
use aliro::definitions::messages::{Auth0Command, Auth0Response, Auth1Command, SelectCommand};
use aliro::definitions::{Identifier, ReaderIdentifier, Response, TransactionCode, Versions};
use aliro::presentation::endpoint::database::{InMemoryDatabase, KnownReaderGroup};
use aliro::presentation::endpoint::UserDeviceProcessor;
use aliro::presentation::transaction::StateKind;

fn main() {}

fn auth0(fast: bool, reader_identifier: ReaderIdentifier) -> Auth0Command {
    Auth0Command {
        fast,
        transaction_code: TransactionCode::Unlock,
        protocol_version: 0x0100,
        reader_epk: *KeyPair::generate().public_key(),
        transaction_identifier: Identifier::random(),
        reader_identifier,
    }
}

fn response(bytes: &[u8]) -> Result<Response> {
    Ok(Response::try_from(bytes)?)
}

#[test]
pub fn unknown_group_still_gets_a_cryptogram() -> Result<()> {
    let mut processor = UserDeviceProcessor::new(InMemoryDatabase::new());
    let reader_identifier = ReaderIdentifier::new(Identifier::random(), Identifier::random());

    processor.process_apdu(&SelectCommand::aliro().to_bytes());
    let answer = response(&processor.process_apdu(&auth0(true, reader_identifier).to_bytes()?))?;
    assert!(answer.is_success());
    let parsed = Auth0Response::parse(&answer)?;
    assert!(parsed.cryptogram.is_some());
    assert_eq!(processor.transaction().state().kind(), StateKind::Auth0FastDone);
    Ok(())
}

#[test]
pub fn one_of_several_endpoints_answers() -> Result<()> {
    let reader = KeyPair::generate();
    let reader_identifier = ReaderIdentifier::new(Identifier::random(), Identifier::random());
    let group = KnownReaderGroup {
        group_identifier: *reader_identifier.group_identifier(),
        reader_public_key: *reader.public_key(),
    };
    let mut database = InMemoryDatabase::new();
    let enrolled = [
        database.add_endpoint(KeyPair::generate(), group.clone()),
        database.add_endpoint(KeyPair::generate(), group),
    ];
    let mut processor = UserDeviceProcessor::new(database);

    processor.process_apdu(&SelectCommand::aliro().to_bytes());
    processor.process_apdu(&auth0(false, reader_identifier).to_bytes()?);
    let session = processor
        .transaction()
        .state()
        .session()
        .context("AUTH0 did not open a session")?;
    assert!(enrolled.contains(&session.endpoint));
    Ok(())
}

#[test]
pub fn deselect_abandons_the_handshake() -> Result<()> {
    let mut processor = UserDeviceProcessor::new(InMemoryDatabase::new());
    let reader_identifier = ReaderIdentifier::new(Identifier::random(), Identifier::random());

    processor.process_apdu(&SelectCommand::aliro().to_bytes());
    processor.process_apdu(&auth0(false, reader_identifier).to_bytes()?);
    assert_eq!(
        processor.transaction().state().kind(),
        StateKind::Auth0StandardDone
    );

    processor.on_deselected();
    assert_eq!(processor.transaction().state().kind(), StateKind::Initial);
    let answer = processor.process_apdu(&Auth1Command::new([0x5A; 64]).to_bytes()?);
    assert_eq!(answer, hex!("6400"));
    Ok(())
}

#[test]
pub fn unsupported_version_in_auth0() -> Result<()> {
    let mut processor =
        UserDeviceProcessor::with_versions(InMemoryDatabase::new(), Versions::new(vec![0x0007]));
    let reader_identifier = ReaderIdentifier::new(Identifier::random(), Identifier::random());

    processor.process_apdu(&SelectCommand::aliro().to_bytes());
    let answer = processor.process_apdu(&auth0(true, reader_identifier).to_bytes()?);
    assert_eq!(answer, hex!("6400"));
    assert_eq!(processor.transaction().state().kind(), StateKind::SelectDone);
    Ok(())
}
