// gateway/src/lib.rs
//! Session-aware reverse proxy in front of the dashboard application.
//!
//! Request pipeline: base-path collapse → session lookup → SSO gate →
//! upstream transport (identity assertion out, header rewrite back).
pub mod cookie;
pub mod error;
pub mod health;
pub mod identity;
pub mod middleware;
pub mod paths;
pub mod proxy;
pub mod rewrite;
pub mod routes;
pub mod sso;
pub mod state;
pub mod store;
pub mod ws;

pub use error::GatewayError;
pub use state::GatewayState;
