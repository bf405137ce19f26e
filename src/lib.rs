//! SMB/CIFS network share mount lifecycle management.
//!
//! The crate keeps a registry of known shares in sync with the OS mount
//! table, drives privileged mount/unmount helpers asynchronously, resolves
//! per-share option overrides, and remounts flagged shares across network
//! interruptions.

pub mod config;
pub mod credentials;
pub mod error;
pub mod mount;
pub mod options;
pub mod platform;
pub mod share;
pub mod utils;

pub use error::{Result, SharekeeperError};
