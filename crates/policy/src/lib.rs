//! Stash Policy Store
//!
//! Tunable compliance configuration consulted by the admission gates:
//!
//! - [`rules::GeoPolicy`] - country allowlist
//! - [`network::IpDenylist`] - CIDR denylist
//! - [`rules::DeviceRule`] - required client signals
//! - [`rules::LimitTier`] - caps and velocity ceilings per KYC tier
//! - [`users::UserDirectory`] - limitation state and its history
//!
//! Pure data, read-mostly. Each record carries its own version.

pub mod error;
pub mod network;
pub mod rules;
pub mod store;
pub mod users;

pub use error::{PolicyError, PolicyResult};
pub use network::{CidrRange, IpDenylist};
pub use rules::{DeviceRule, DeviceSignal, DeviceSignals, GeoMode, GeoPolicy, LimitTier, Versioned};
pub use store::{InMemoryPolicyStore, PolicySnapshot, PolicyStore};
pub use users::{InMemoryUserDirectory, UserDirectory};
