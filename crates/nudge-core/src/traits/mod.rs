//! Narrow collaborator interfaces consumed by the scheduler and gateway.

pub mod directory;
pub mod notifier;
pub mod store;

pub use directory::UserDirectory;
pub use notifier::Notifier;
pub use store::EventStore;
