//! Relay core for teleop.
//!
//! Implements the per-connection phase machine, role-specific
//! authentication, the Robot liveness monitor, and the session authority
//! that pairs one UI with one Robot and routes probes, commands, and acks
//! between them. [`Relay`] runs all of it as a single-owner event loop.

pub mod auth;
pub mod config;
pub mod error;
pub mod liveness;
pub mod relay;
pub mod session;
pub mod setup;
pub mod state;

pub use config::Config;
pub use error::RelayError;
pub use relay::{Relay, RelayEvent, RelayStatus};
pub use session::{ConnectionId, Outbound, SessionAuthority};
pub use state::Phase;
