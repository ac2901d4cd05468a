use strum_macros::EnumIter;

// Command and response framing according to ISO 7816-4, covering the short and extended
// length encodings.

use crate::definitions::util::{impl_partial_enum, DisplayBytesAsHex, IntoRaw, KnownOrRaw};
use crate::error::{Error, Result};

/// Class byte of SELECT.
pub const CLA_INTER_INDUSTRY: u8 = 0x00;
/// Class byte of every other Aliro command.
pub const CLA_PROPRIETARY: u8 = 0x80;

/// Le value meaning "as many bytes as a short response can carry".
pub const LE_MAX_SHORT: usize = 256;

/// SW1 of a complete response.
pub const SW1_NO_FURTHER_QUALIFICATION: u8 = 0x90;

#[repr(u16)]
#[derive(Debug, EnumIter, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok = 0x9000,
    GenericError = 0x6400,
    MemoryFailure = 0x6581,
    WrongLength = 0x6700,
    LogicalChannelNotSupported = 0x6881,
    SecurityStatusNotSatisfied = 0x6982,
    ConditionsNotSatisfied = 0x6985,
    FileOrApplicationNotFound = 0x6A82,
    IncorrectP1OrP2 = 0x6B00,
    InstructionNotSupported = 0x6D00,
    ClassNotSupported = 0x6E00,
    Unspecified = 0x6F00,
}
impl_partial_enum!(ResponseCode, u16);

impl ResponseCode {
    pub fn to_bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

/// A status word that may fall outside of [ResponseCode].
pub type StatusWord = KnownOrRaw<u16, ResponseCode>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusWord,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            status: KnownOrRaw::Known(ResponseCode::Ok),
            payload,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is(ResponseCode::Ok)
    }

    pub fn sw1(&self) -> u8 {
        self.status.into_raw().to_be_bytes()[0]
    }

    pub fn sw2(&self) -> u8 {
        self.status.into_raw().to_be_bytes()[1]
    }
}

impl From<Response> for Vec<u8> {
    fn from(response: Response) -> Self {
        let mut response_bytes = Vec::with_capacity(2 + response.payload.len());
        response_bytes.extend_from_slice(&response.payload);
        response_bytes.extend_from_slice(&response.status.into_raw().to_be_bytes());
        response_bytes
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = Error;
    fn try_from(response: &[u8]) -> Result<Self> {
        let Some((payload, code)) = response.split_last_chunk::<2>() else {
            return Err(Error::MalformedApdu("response is shorter than a status word"));
        };
        Ok(Self {
            status: u16::from_be_bytes(*code).into(),
            payload: payload.to_vec(),
        })
    }
}

impl From<ResponseCode> for Response {
    fn from(code: ResponseCode) -> Self {
        Response {
            status: KnownOrRaw::Known(code),
            payload: Vec::new(),
        }
    }
}

#[repr(u8)]
#[derive(Debug, EnumIter, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Select = 0xA4,
    Auth0 = 0x80,
    Auth1 = 0x81,
    ControlFlow = 0x3C,
    Envelope = 0xC3,
    Exchange = 0xC9,
    GetResponse = 0xC0,
    LoadCert = 0xD1,
}
impl_partial_enum!(Instruction, u8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub class: u8,
    pub instruction: KnownOrRaw<u8, Instruction>,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Maximum expected response length, 0 when no response data is expected.
    pub le: usize,
}

fn serialize_l_c_len(len: usize, extended: bool) -> Vec<u8> {
    if extended {
        [&[0x00], (len as u16).to_be_bytes().as_slice()].concat()
    } else {
        (len as u8).to_be_bytes().to_vec()
    }
}

fn short_le(byte: u8) -> usize {
    match byte {
        0x00 => 256,
        b => b as usize,
    }
}

fn extended_le(bytes: [u8; 2]) -> usize {
    match u16::from_be_bytes(bytes) {
        0x0000 => 65536,
        n => n as usize,
    }
}

impl Command {
    pub fn new(class: u8, instruction: Instruction, p1: u8, p2: u8, data: Vec<u8>, le: usize) -> Self {
        Self {
            class,
            instruction: KnownOrRaw::Known(instruction),
            p1,
            p2,
            data,
            le,
        }
    }

    pub fn parse(command_bytes: &[u8]) -> Result<Self> {
        tracing::debug!("APDU: {}", DisplayBytesAsHex::from(command_bytes));
        let Some((header, body)) = command_bytes.split_first_chunk::<4>() else {
            return Err(Error::MalformedApdu("command is shorter than its header"));
        };
        let [class, ins, p1, p2] = *header;

        let (data, le): (&[u8], usize) = match body {
            [] => (&[], 0),
            [l_e] => (&[], short_le(*l_e)),
            [0x00, b1, b2, rest @ ..] => {
                // 3 byte L_c (first byte is 0x00)
                let len = u16::from_be_bytes([*b1, *b2]) as usize;
                if rest.is_empty() {
                    (&[], extended_le([*b1, *b2]))
                } else if rest.len() == len {
                    (rest, 0)
                } else if rest.len() == len + 2 {
                    (&rest[..len], extended_le([rest[len], rest[len + 1]]))
                } else {
                    tracing::error!(
                        "Extended L_c ({len}) does not match the remaining {} bytes",
                        rest.len()
                    );
                    return Err(Error::MalformedApdu("extended L_c does not match the payload"));
                }
            }
            [0x00, _] => return Err(Error::MalformedApdu("truncated extended L_c")),
            [l_c, rest @ ..] => {
                let len = *l_c as usize;
                if rest.len() == len {
                    (rest, 0)
                } else if rest.len() == len + 1 {
                    (&rest[..len], short_le(rest[len]))
                } else {
                    tracing::error!(
                        "Expected the remainder({}) after L_c to be the payload len({len}) plus at most one L_e byte",
                        rest.len(),
                    );
                    return Err(Error::MalformedApdu("L_c does not match the payload"));
                }
            }
        };

        tracing::debug!(
            "Processing APDU command: CLA: {class:#04X}, INS: {ins:#04X}, P1: {p1:#04X}, P2: {p2:#04X}, Payload Length: {}, Resp len: {le}",
            data.len()
        );

        Ok(Self {
            class,
            instruction: ins.into(),
            p1,
            p2,
            data: data.to_vec(),
            le,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let extended = self.data.len() > 255 || self.le > LE_MAX_SHORT;
        let mut bytes = vec![self.class, self.instruction.into_raw(), self.p1, self.p2];
        if !self.data.is_empty() {
            bytes.extend(serialize_l_c_len(self.data.len(), extended));
            bytes.extend_from_slice(&self.data);
        }
        if self.le > 0 {
            if extended {
                if self.data.is_empty() {
                    bytes.push(0x00);
                }
                bytes.extend_from_slice(&((self.le % 65536) as u16).to_be_bytes());
            } else {
                bytes.push((self.le % 256) as u8);
            }
        }
        bytes
    }
}
