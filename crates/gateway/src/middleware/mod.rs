//! HTTP middleware stack for the gateway.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions with `PostgreSQL` store)
//!
//! Webhook handlers never touch the session even though the layer wraps
//! them: their only identity is the request signature.

pub mod auth;
pub mod session;
pub mod session_token;

pub use auth::{RequireMerchant, clear_current_merchant, set_current_merchant};
pub use session::create_session_layer;
pub use session_token::BearerSession;
