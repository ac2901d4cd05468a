use crate::definitions::apdu::{Command, Instruction, Response, CLA_INTER_INDUSTRY, LE_MAX_SHORT};
use crate::definitions::messages::ProcessCommand;
use crate::definitions::tlv::{self, TlvLookup, TlvValue};
use crate::definitions::versions::Versions;
use crate::error::{Error, Result};
use crate::presentation::endpoint::database::UserDeviceDatabase;
use crate::presentation::endpoint::EndpointContext;
use crate::presentation::transaction::TransactionState;

/// Application identifier of the Aliro applet.
pub const ALIRO_AID: [u8; 8] = [0xF0, 0x00, 0x6B, 0x73, 0x69, 0x00, 0x00, 0x02];

const P1_SELECT_BY_NAME: u8 = 0x04;
const P2_FIRST_OR_ONLY: u8 = 0x00;

const TAG_FCI: u8 = 0x6F;
const TAG_SELECTED_AID: u8 = 0x84;
const TAG_VERSIONS_AND_CAPABILITIES: u8 = 0xA5;
const TAG_TYPE: u8 = 0x80;
const TAG_SUPPORTED_VERSIONS: u8 = 0x81;
const TAG_CAPABILITIES: u8 = 0x82;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectCommand {
    pub aid: Vec<u8>,
}

impl SelectCommand {
    pub fn aliro() -> Self {
        Self {
            aid: ALIRO_AID.to_vec(),
        }
    }

    pub fn parse(command: &Command) -> Result<Self> {
        if command.p1 != P1_SELECT_BY_NAME || command.p2 != P2_FIRST_OR_ONLY {
            return Err(Error::IncorrectParameters(command.p1, command.p2));
        }
        Ok(Self {
            aid: command.data.clone(),
        })
    }

    pub fn to_command(&self) -> Command {
        Command::new(
            CLA_INTER_INDUSTRY,
            Instruction::Select,
            P1_SELECT_BY_NAME,
            P2_FIRST_OR_ONLY,
            self.aid.clone(),
            LE_MAX_SHORT,
        )
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_command().to_bytes()
    }
}

impl ProcessCommand for SelectCommand {
    fn process<D: UserDeviceDatabase>(&self, context: &mut EndpointContext<D>) -> Result<Response> {
        if self.aid != ALIRO_AID {
            tracing::warn!("SELECT for foreign AID {}", hex::encode(&self.aid));
        }
        context.transaction.move_to_state(TransactionState::SelectDone)?;
        SelectResponse::new(&context.versions).to_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectResponse {
    pub selected_aid: Vec<u8>,
    /// Concatenated 2 byte versions in the endpoint's order of preference.
    pub supported_versions: Vec<u8>,
    pub capability_type: Vec<u8>,
    pub capabilities: Option<Vec<u8>>,
}

impl SelectResponse {
    pub fn new(versions: &Versions) -> Self {
        Self {
            selected_aid: ALIRO_AID.to_vec(),
            supported_versions: versions.to_bytes(),
            capability_type: vec![0x00, 0x00],
            capabilities: None,
        }
    }

    pub fn to_response(&self) -> Result<Response> {
        let mut versions_and_capabilities = vec![
            tlv::primitive(TAG_TYPE, self.capability_type.clone())?,
            tlv::primitive(TAG_SUPPORTED_VERSIONS, self.supported_versions.clone())?,
        ];
        if let Some(capabilities) = &self.capabilities {
            versions_and_capabilities.push(tlv::primitive(TAG_CAPABILITIES, capabilities.clone())?);
        }
        let fci = tlv::constructed(
            TAG_FCI,
            vec![
                tlv::primitive(TAG_SELECTED_AID, self.selected_aid.clone())?,
                tlv::constructed(TAG_VERSIONS_AND_CAPABILITIES, versions_and_capabilities)?,
            ],
        )?;
        Ok(Response::ok(tlv::encode(&[fci])))
    }

    pub fn parse(response: &Response) -> Result<Self> {
        let tlvs = tlv::parse_all(&response.payload)?;
        let fci = tlvs.require(TAG_FCI)?;
        let versions_and_capabilities = fci.require(TAG_VERSIONS_AND_CAPABILITIES)?;
        Ok(Self {
            selected_aid: fci.require(TAG_SELECTED_AID)?.bytes()?.to_vec(),
            supported_versions: versions_and_capabilities
                .require(TAG_SUPPORTED_VERSIONS)?
                .bytes()?
                .to_vec(),
            capability_type: versions_and_capabilities.require(TAG_TYPE)?.bytes()?.to_vec(),
            capabilities: versions_and_capabilities
                .optional(TAG_CAPABILITIES)
                .map(|tlv| tlv.bytes().map(<[u8]>::to_vec))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn command_encoding() {
        let bytes = SelectCommand::aliro().to_bytes();
        assert_eq!(bytes, hex!("00a4040008f0006b736900000200"));
        let parsed = SelectCommand::parse(&Command::parse(&bytes).unwrap()).unwrap();
        assert_eq!(parsed, SelectCommand::aliro());

        let wrong_p1 = Command::parse(&hex!("00a4000008f0006b736900000200")).unwrap();
        assert!(matches!(
            SelectCommand::parse(&wrong_p1),
            Err(Error::IncorrectParameters(0x00, 0x00))
        ));
    }

    #[test]
    fn response_layout() {
        let response = SelectResponse::new(&Versions::default()).to_response().unwrap();
        assert_eq!(
            Vec::<u8>::from(response.clone()),
            hex!("6f168408f0006b7369000002a50a800200008104010000079000")
        );
        let parsed = SelectResponse::parse(&response).unwrap();
        assert_eq!(parsed.supported_versions, hex!("01000007"));
        assert_eq!(parsed.capability_type, hex!("0000"));
        assert_eq!(parsed.capabilities, None);
    }

    #[test]
    fn capabilities_are_optional() {
        let mut select = SelectResponse::new(&Versions::new(vec![0x0007]));
        select.capabilities = Some(vec![0x01]);
        let parsed = SelectResponse::parse(&select.to_response().unwrap()).unwrap();
        assert_eq!(parsed, select);

        let missing_versions = Response::ok(hex!("6f0a8408f0006b7369000002").to_vec());
        assert!(matches!(
            SelectResponse::parse(&missing_versions),
            Err(Error::MissingTag(0xA5))
        ));
    }
}
