pub mod apdu;
pub mod identifier;
pub mod messages;
pub mod secure_channel;
pub mod tlv;
pub mod transaction_code;
pub mod util;
pub mod versions;

pub use apdu::{Command, Instruction, Response, ResponseCode, StatusWord};
pub use identifier::{Cryptogram, Identifier, ReaderIdentifier};
pub use transaction_code::TransactionCode;
pub use versions::Versions;
