//! Session drivers for both sides of a transaction.
pub mod endpoint;
pub mod reader;
pub mod transaction;
