//! # Nudge Gateway
//!
//! HTTP surface of the reminder service: account registration and login,
//! bearer-token identity, and per-user event CRUD.
//!
//! `/auth/*` and `/health` are public. Everything else passes through the
//! auth gate, which attaches an [`gate::Identity`] when the bearer token
//! verifies; handlers that need a caller answer 401 without one.

pub mod accounts;
pub mod auth;
pub mod events;
pub mod gate;
pub mod routes;
pub mod server;

pub use accounts::AccountService;
pub use auth::{Claims, TokenProvider};
pub use events::EventService;
pub use gate::Identity;
pub use server::{AppState, build_router, serve};
