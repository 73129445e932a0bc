//! Lifecycle manager for the MyLocalTon sandbox artifact.
//!
//! [`supervisor::Supervisor`] is the entry point: it downloads the jar, starts it
//! detached, stops it, and wipes state. [`poller::StatePoller`] keeps a
//! [`mylocalton_process::NodeStatus`] snapshot fresh for the host.

pub mod artifact;
pub mod config;
pub mod download;
pub mod error;
pub mod error_payload;
pub mod housekeeping;
pub mod launch;
pub mod layout;
pub mod lite_client;
pub mod platform;
pub mod poller;
pub mod settings;
pub mod supervisor;
pub mod version;

pub use mylocalton_process::{
    Arch, LaunchConfiguration, MAX_VALIDATORS, Network, NodeStatus, ProcessState,
};
