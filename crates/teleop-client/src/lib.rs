//! Operator side of teleop.
//!
//! [`Supervisor`] owns the single socket to the relay: it authorizes with
//! credentials from an [`AccountService`], runs the probe handshake, and
//! forwards operator commands with stop-and-wait flow control. UI code talks
//! to it through a cloneable [`ClientHandle`].

pub mod account;
pub mod command;
pub mod config;
pub mod error;
pub mod handshake;
pub mod state;
pub mod supervisor;

pub use account::{AccountService, Credentials, StaticAccount};
pub use config::ClientConfig;
pub use error::ClientError;
pub use state::{ClientEvent, ClientPhase, CommandLink};
pub use supervisor::{ClientHandle, Supervisor};
