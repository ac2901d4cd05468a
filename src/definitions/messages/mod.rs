//! The SELECT, AUTH0, AUTH1 and CONTROL_FLOW exchanges.
//!
//! Every command can be built and serialized by a reader, parsed back by an endpoint, and
//! processed against the endpoint's [EndpointContext]. Responses are built by the endpoint and
//! parsed by the reader.

pub mod auth0;
pub mod auth1;
pub mod authentication;
pub mod control_flow;
pub mod select;

pub use auth0::{Auth0Command, Auth0Response};
pub use auth1::{Auth1Command, Auth1Response, Auth1ResponsePlaintext};
pub use control_flow::{ControlFlowCommand, ControlFlowResponse};
pub use select::{SelectCommand, SelectResponse};

use crate::definitions::apdu::{Command, Instruction, Response, ResponseCode, CLA_INTER_INDUSTRY, CLA_PROPRIETARY};
use crate::definitions::util::KnownOrRaw;
use crate::error::{Error, Result};
use crate::presentation::endpoint::database::UserDeviceDatabase;
use crate::presentation::endpoint::EndpointContext;

/// Endpoint side handling of a parsed command.
pub trait ProcessCommand {
    fn process<D: UserDeviceDatabase>(&self, context: &mut EndpointContext<D>) -> Result<Response>;
}

#[derive(Debug, Clone)]
pub enum AliroCommand {
    Select(SelectCommand),
    Auth0(Auth0Command),
    Auth1(Auth1Command),
    ControlFlow(ControlFlowCommand),
}

impl AliroCommand {
    /// Decode a command APDU, dispatching on its instruction byte.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let command = Command::parse(bytes)?;
        let instruction = match command.instruction {
            KnownOrRaw::Known(instruction) => instruction,
            KnownOrRaw::Unknown(raw) => return Err(Error::UnknownInstruction(raw)),
        };
        let expected_class = match instruction {
            Instruction::Select => CLA_INTER_INDUSTRY,
            _ => CLA_PROPRIETARY,
        };
        if command.class != expected_class {
            return Err(Error::InvalidClass(command.class));
        }
        match instruction {
            Instruction::Select => Ok(AliroCommand::Select(SelectCommand::parse(&command)?)),
            Instruction::Auth0 => Ok(AliroCommand::Auth0(Auth0Command::parse(&command)?)),
            Instruction::Auth1 => Ok(AliroCommand::Auth1(Auth1Command::parse(&command)?)),
            Instruction::ControlFlow => Ok(AliroCommand::ControlFlow(ControlFlowCommand::parse(
                &command,
            )?)),
            other => Err(Error::UnknownInstruction(other as u8)),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            AliroCommand::Select(command) => Ok(command.to_bytes()),
            AliroCommand::Auth0(command) => command.to_bytes(),
            AliroCommand::Auth1(command) => command.to_bytes(),
            AliroCommand::ControlFlow(command) => command.to_bytes(),
        }
    }

    pub fn instruction(&self) -> Instruction {
        match self {
            AliroCommand::Select(_) => Instruction::Select,
            AliroCommand::Auth0(_) => Instruction::Auth0,
            AliroCommand::Auth1(_) => Instruction::Auth1,
            AliroCommand::ControlFlow(_) => Instruction::ControlFlow,
        }
    }
}

impl ProcessCommand for AliroCommand {
    fn process<D: UserDeviceDatabase>(&self, context: &mut EndpointContext<D>) -> Result<Response> {
        match self {
            AliroCommand::Select(command) => command.process(context),
            AliroCommand::Auth0(command) => command.process(context),
            AliroCommand::Auth1(command) => command.process(context),
            AliroCommand::ControlFlow(command) => command.process(context),
        }
    }
}

/// A bare status word sent when a command cannot be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse(pub ResponseCode);

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        ErrorResponse(error.status_word())
    }
}

impl From<ErrorResponse> for Response {
    fn from(error: ErrorResponse) -> Self {
        Response::from(error.0)
    }
}
