//! Warden DNS Admin API
//!
//! The session-authenticated control surface over the core, plus the DoH
//! endpoint, served by the admin HTTP listener.
pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
