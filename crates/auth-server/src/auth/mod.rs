mod bridge;
mod clock;
mod handoff;
mod jwt;
mod middleware;
mod session;
mod store;
mod token_store;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{IdentityBridge, SessionBootstrap};
pub use clock::{Clock, SystemClock};
pub use handoff::{
    ExchangeOutcome, HandoffCoordinator, HandoffError, HandoffSettings, HandshakeInit,
    RequestContext,
};
pub use jwt::{JwtError, JwtService, SessionClaims, SigningAlgorithm};
pub use middleware::{SessionContext, require_session};
pub use session::{
    DEFAULT_SESSION_TTL, IssuedSession, SessionError, SessionManager, SessionMetadata,
    ValidatedSession,
};
pub use store::{DEFAULT_STORE_TIMEOUT, NewSession, SessionStore, StoreError, UserDirectory};
pub use token_store::{
    ConsumedHandshake, DEFAULT_HANDSHAKE_TTL, ExternalIdentity, HandshakePayload,
    HandshakeTicket, TokenError, TokenStore,
};
