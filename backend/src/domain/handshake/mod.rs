//! OAuth staged-authorization handshakes with PKCE.

mod exchange;
mod model;
mod store;
mod tokens;

pub use exchange::CallbackExchange;
pub use model::{HandshakeSession, HandshakeTicket};
pub use store::{AuthHandshakeStore, HandshakeConfig};
pub use tokens::{
    HandshakeTokenSource, OsRngTokenSource, STATE_BYTES, VERIFIER_BYTES, pkce_challenge,
};

#[cfg(test)]
mod tests;
