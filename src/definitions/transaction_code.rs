use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the reader intends to do once the endpoint is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum TransactionCode {
    Unlock,
    Lock,
    Disarm,
    ForceUserAuthentication,
    Other(u8),
}

impl From<u8> for TransactionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => TransactionCode::Unlock,
            0x02 => TransactionCode::Lock,
            0x03 => TransactionCode::Disarm,
            0xEF => TransactionCode::ForceUserAuthentication,
            other => TransactionCode::Other(other),
        }
    }
}

impl From<TransactionCode> for u8 {
    fn from(code: TransactionCode) -> Self {
        match code {
            TransactionCode::Unlock => 0x01,
            TransactionCode::Lock => 0x02,
            TransactionCode::Disarm => 0x03,
            TransactionCode::ForceUserAuthentication => 0xEF,
            TransactionCode::Other(other) => other,
        }
    }
}

impl FromStr for TransactionCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unlock" => Ok(TransactionCode::Unlock),
            "lock" => Ok(TransactionCode::Lock),
            "disarm" => Ok(TransactionCode::Disarm),
            "force-user-authentication" => Ok(TransactionCode::ForceUserAuthentication),
            other => {
                let raw = other.trim_start_matches("0x");
                u8::from_str_radix(raw, 16)
                    .map(TransactionCode::from)
                    .map_err(|_| format!("unknown transaction code: {s}"))
            }
        }
    }
}
