use crate::definitions::apdu::{Command, Instruction, Response, StatusWord, CLA_PROPRIETARY};
use crate::definitions::messages::ProcessCommand;
use crate::definitions::tlv::{self, TlvLookup, TlvValue};
use crate::error::Result;
use crate::presentation::endpoint::database::UserDeviceDatabase;
use crate::presentation::endpoint::EndpointContext;
use crate::presentation::transaction::TransactionState;

const TAG_S1_PARAMETER: u8 = 0x41;
const TAG_S2_PARAMETER: u8 = 0x42;
const TAG_DOMAIN_SPECIFIC_DATA: u8 = 0x43;

const S1_FAILURE: u8 = 0x00;
const S1_SUCCESS: u8 = 0x01;
const S1_DOMAIN_SPECIFIC: u8 = 0x40;
const S2_NONE: u8 = 0x00;
const S2_STEP_UP: u8 = 0xA0;

/// Tells the endpoint how the reader acted on the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowCommand {
    pub s1: u8,
    pub s2: u8,
    pub domain_specific_data: Option<Vec<u8>>,
}

impl ControlFlowCommand {
    pub fn success(success: bool) -> Self {
        Self {
            s1: if success { S1_SUCCESS } else { S1_FAILURE },
            s2: S2_NONE,
            domain_specific_data: None,
        }
    }

    pub fn step_up() -> Self {
        Self {
            s1: S1_DOMAIN_SPECIFIC,
            s2: S2_STEP_UP,
            domain_specific_data: None,
        }
    }

    pub fn parse(command: &Command) -> Result<Self> {
        let tlvs = tlv::parse_all(&command.data)?;
        Ok(Self {
            s1: tlvs.require(TAG_S1_PARAMETER)?.first_byte("S1")?,
            s2: tlvs.require(TAG_S2_PARAMETER)?.first_byte("S2")?,
            domain_specific_data: tlvs
                .optional(TAG_DOMAIN_SPECIFIC_DATA)
                .map(|tlv| tlv.bytes().map(<[u8]>::to_vec))
                .transpose()?,
        })
    }

    pub fn to_command(&self) -> Result<Command> {
        let mut tlvs = vec![
            tlv::primitive(TAG_S1_PARAMETER, vec![self.s1])?,
            tlv::primitive(TAG_S2_PARAMETER, vec![self.s2])?,
        ];
        if let Some(data) = &self.domain_specific_data {
            tlvs.push(tlv::primitive(TAG_DOMAIN_SPECIFIC_DATA, data.clone())?);
        }
        Ok(Command::new(
            CLA_PROPRIETARY,
            Instruction::ControlFlow,
            0x00,
            0x00,
            tlv::encode(&tlvs),
            0,
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_command()?.to_bytes())
    }
}

impl ProcessCommand for ControlFlowCommand {
    fn process<D: UserDeviceDatabase>(&self, context: &mut EndpointContext<D>) -> Result<Response> {
        tracing::debug!("CONTROL_FLOW S1={:#04X} S2={:#04X}", self.s1, self.s2);
        context
            .transaction
            .move_to_state(TransactionState::SelectDone)?;
        Ok(ControlFlowResponse::default().into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFlowResponse {
    pub status: StatusWord,
}

impl Default for ControlFlowResponse {
    fn default() -> Self {
        Self {
            status: Response::ok(Vec::new()).status,
        }
    }
}

impl ControlFlowResponse {
    pub fn parse(response: &Response) -> Self {
        Self {
            status: response.status,
        }
    }
}

impl From<ControlFlowResponse> for Response {
    fn from(response: ControlFlowResponse) -> Self {
        Response {
            status: response.status,
            payload: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn encoding() {
        assert_eq!(
            ControlFlowCommand::success(true).to_bytes().unwrap(),
            hex!("803c000006410101420100")
        );
        assert_eq!(
            ControlFlowCommand::success(false).to_bytes().unwrap(),
            hex!("803c000006410100420100")
        );
        assert_eq!(
            ControlFlowCommand::step_up().to_bytes().unwrap(),
            hex!("803c0000064101404201a0")
        );
    }

    #[test]
    fn domain_specific_data() {
        let command = ControlFlowCommand {
            domain_specific_data: Some(vec![0xCA, 0xFE]),
            ..ControlFlowCommand::step_up()
        };
        let parsed =
            ControlFlowCommand::parse(&Command::parse(&command.to_bytes().unwrap()).unwrap()).unwrap();
        assert_eq!(parsed, command);
    }

    #[test]
    fn response() {
        assert_eq!(
            Vec::<u8>::from(Response::from(ControlFlowResponse::default())),
            hex!("9000")
        );
    }
}
