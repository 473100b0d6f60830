//! Control daemon for a robotic tape library.
//!
//! `acsd` accepts mount and dismount requests from remote clients over the
//! `acs-proto` wire protocol and drives them through the vendor library's
//! polling-based control interface:
//!
//! - **library**: the vendor API seam, the polling channel, the blocking
//!   operation executors, and the in-tree simulator
//! - **daemon**: the TCP front end, the request dispatcher, and the
//!   pending-request registry that multiplexes concurrent dismounts over a
//!   single library channel
//! - **config**: tunables for the polling and timeout behavior
//!
//! Mounts block a dedicated executor for their whole library round trip;
//! dismounts are admitted into the registry and advanced by the control
//! loop's periodic ticks. Either way a client gets exactly one reply.

pub mod config;
pub mod daemon;
pub mod error;
pub mod library;

pub use config::DaemonConfig;
pub use error::AcsError;
