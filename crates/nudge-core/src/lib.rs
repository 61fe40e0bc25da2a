//! # Nudge Core
//!
//! Shared vocabulary for the reminder service: configuration, the error
//! taxonomy, the event/user data model, and the collaborator traits the
//! scheduler and gateway are written against.

pub mod config;
pub mod error;
pub mod model;
pub mod traits;

pub use config::NudgeConfig;
pub use error::{NudgeError, Result};
pub use model::{Event, EventFields, EventId, EventKind, User, UserId};
