//! Provider bookkeeping shared across requests
//!
//! - [`priority`]: the durable, reloadable provider ordering
//! - [`availability`]: local credential checks deciding whether a provider is attempted

pub mod availability;
pub mod priority;

pub use availability::{
    AvailabilityGate, AvailabilityResult, CredentialSource, EnvCredentials, StaticCredentials,
};
pub use priority::{EntryPatch, PriorityEntry, PriorityStore};
