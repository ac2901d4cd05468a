use p256::PublicKey;
use strum_macros::EnumDiscriminants;

use crate::crypto::KeyPair;
use crate::definitions::identifier::{Identifier, ReaderIdentifier};
use crate::definitions::secure_channel::SecureChannelState;
use crate::error::{Error, Result};
use crate::presentation::endpoint::database::Endpoint;

/// Everything the endpoint remembers between AUTH0 and AUTH1.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub transaction_identifier: Identifier,
    pub reader_identifier: ReaderIdentifier,
    pub endpoint: Endpoint,
    pub reader_epk: PublicKey,
    pub endpoint_ekeypair: KeyPair,
    /// AUTH0 parameter1 followed by the transaction code.
    pub flag: [u8; 2],
    pub secure_channel: SecureChannelState,
    pub protocol_version: u16,
}

#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(
    name(StateKind),
    derive(strum_macros::Display, strum_macros::EnumIter, Hash)
)]
pub enum TransactionState {
    Initial,
    SelectDone,
    Auth0FastDone(Box<AuthSession>),
    Auth0StandardDone(Box<AuthSession>),
    Auth1Done(Box<AuthSession>),
}

impl Default for TransactionState {
    fn default() -> Self {
        TransactionState::Initial
    }
}

impl TransactionState {
    pub fn kind(&self) -> StateKind {
        StateKind::from(self)
    }

    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            TransactionState::Initial | TransactionState::SelectDone => None,
            TransactionState::Auth0FastDone(session)
            | TransactionState::Auth0StandardDone(session)
            | TransactionState::Auth1Done(session) => Some(session),
        }
    }
}

const LEGAL_TRANSITIONS: &[(StateKind, StateKind)] = &[
    (StateKind::Initial, StateKind::SelectDone),
    (StateKind::SelectDone, StateKind::Initial),
    (StateKind::SelectDone, StateKind::Auth0FastDone),
    (StateKind::SelectDone, StateKind::Auth0StandardDone),
    (StateKind::Auth0FastDone, StateKind::Initial),
    (StateKind::Auth0FastDone, StateKind::SelectDone),
    (StateKind::Auth0FastDone, StateKind::Auth1Done),
    (StateKind::Auth0StandardDone, StateKind::Initial),
    (StateKind::Auth0StandardDone, StateKind::Auth1Done),
    (StateKind::Auth1Done, StateKind::Initial),
    (StateKind::Auth1Done, StateKind::SelectDone),
];

pub fn is_legal_transition(from: StateKind, to: StateKind) -> bool {
    from == to || LEGAL_TRANSITIONS.contains(&(from, to))
}

/// The endpoint side state of one handshake.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    state: TransactionState,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    /// Replace the current state, failing without side effects when the move is not allowed.
    pub fn move_to_state(&mut self, state: TransactionState) -> Result<()> {
        let from = self.state.kind();
        let to = state.kind();
        if !is_legal_transition(from, to) {
            tracing::warn!("rejected transition from {from} to {to}");
            return Err(Error::IllegalTransition { from, to });
        }
        tracing::debug!("transaction state {from} -> {to}");
        self.state = state;
        Ok(())
    }

    pub fn stop(&mut self) {
        tracing::debug!("transaction stopped in state {}", self.state.kind());
        self.state = TransactionState::Initial;
    }
}
