use std::convert::Infallible;
use std::path::PathBuf;

use aliro::crypto::encode_public_key;
use aliro::crypto::keystore::{KeypairProvider, SoftwareKeystore};
use aliro::definitions::messages::AliroCommand;
use aliro::definitions::{Instruction, TransactionCode};
use aliro::presentation::endpoint::database::{InMemoryDatabase, KnownReaderGroup};
use aliro::presentation::endpoint::UserDeviceProcessor;
use aliro::presentation::reader::{
    KnownUserDevices, Reader, ReaderConfiguration, TransactionResult,
};
use anyhow::{Context, Error};
use clap::Parser;
use clap_stdin::MaybeStdin;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Run a standard and then a fast transaction between an in-process reader and endpoint.
    Simulate {
        /// Transaction code: unlock, lock, disarm, force-user-authentication or a hex byte.
        #[arg(long, default_value = "unlock")]
        code: TransactionCode,
        /// JSON reader configuration; a random reader is generated when absent.
        #[arg(long)]
        reader_config: Option<PathBuf>,
    },
    /// Decode a hex encoded command APDU and print its fields.
    ParseApdu { apdu: MaybeStdin<String> },
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let output = match Args::parse().action {
        Action::Simulate {
            code,
            reader_config,
        } => {
            let configuration = match reader_config {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .with_context(|| format!("could not read {}", path.display()))?;
                    ReaderConfiguration::from_json(&json)
                        .context("could not parse reader configuration")?
                }
                None => ReaderConfiguration::generate(),
            };
            simulate(configuration, code)?
        }
        Action::ParseApdu { apdu } => parse_apdu(&apdu)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn simulate(configuration: ReaderConfiguration, code: TransactionCode) -> Result<Value, Error> {
    let keystore = SoftwareKeystore::new();
    let mut database = InMemoryDatabase::new();
    database.add_endpoint(
        keystore
            .generate_or_retrieve_keypair("endpoint")
            .context("could not create endpoint keypair")?,
        KnownReaderGroup {
            group_identifier: *configuration.identifier.group_identifier(),
            reader_public_key: *configuration.keypair.public_key(),
        },
    );
    let mut endpoint = UserDeviceProcessor::new(database);
    let known_devices = KnownUserDevices::new();

    let mut results = Vec::with_capacity(2);
    for transaction in ["standard", "fast"] {
        let mut instructions = Vec::new();
        let result = {
            let mut link = |apdu: &[u8]| {
                instructions.push(apdu.get(1).copied().unwrap_or_default());
                Ok::<_, Infallible>(endpoint.process_apdu(apdu))
            };
            Reader::new(configuration.clone(), known_devices.clone(), &mut link)
                .transact(code)
                .with_context(|| format!("{transaction} transaction failed"))?
        };
        endpoint.on_deselected();

        let mut output = match result {
            TransactionResult::Authorized {
                transaction_identifier,
                endpoint_public_key,
            } => json!({
                "result": "authorized",
                "transaction_identifier": transaction_identifier.to_string(),
                "endpoint_public_key": hex::encode(encode_public_key(&endpoint_public_key)),
            }),
            TransactionResult::Unauthorized => json!({ "result": "unauthorized" }),
        };
        output["transaction"] = json!(transaction);
        output["auth1_sent"] = json!(instructions.contains(&(Instruction::Auth1 as u8)));
        results.push(output);
    }
    Ok(json!({
        "reader_identifier": configuration.identifier.to_string(),
        "known_devices": known_devices.len(),
        "transactions": results,
    }))
}

fn parse_apdu(apdu: &str) -> Result<Value, Error> {
    let trimmed = apdu.trim();
    let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .context("APDU is not valid hex")?;
    let command = AliroCommand::parse(&bytes).context("could not parse command APDU")?;
    Ok(match command {
        AliroCommand::Select(select) => json!({
            "command": "SELECT",
            "aid": hex::encode(select.aid),
        }),
        AliroCommand::Auth0(auth0) => json!({
            "command": "AUTH0",
            "fast": auth0.fast,
            "transaction_code": auth0.transaction_code,
            "protocol_version": format!("{:04X}", auth0.protocol_version),
            "reader_epk": hex::encode(encode_public_key(&auth0.reader_epk)),
            "transaction_identifier": auth0.transaction_identifier.to_string(),
            "reader_identifier": auth0.reader_identifier.to_string(),
        }),
        AliroCommand::Auth1(auth1) => json!({
            "command": "AUTH1",
            "endpoint_public_key_requested": auth1.endpoint_public_key_requested,
            "reader_signature": hex::encode(auth1.reader_signature),
            "certificate": auth1.certificate.map(hex::encode),
        }),
        AliroCommand::ControlFlow(control_flow) => json!({
            "command": "CONTROL_FLOW",
            "s1": control_flow.s1,
            "s2": control_flow.s2,
            "domain_specific_data": control_flow.domain_specific_data.map(hex::encode),
        }),
    })
}
