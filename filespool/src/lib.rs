//! # filespool: spool-directory relay daemon
//!
//! Two modes share one binary:
//!
//! - **Receiver**: listens for mutually authenticated senders and writes
//!   every file they deliver into a target directory.
//! - **Sender**: watches a source directory and pushes each file to a
//!   receiver, deleting it once the receiver confirmed it.
//!
//! Settings come from a TOML file and command-line flags, flags winning.

pub mod config;
pub mod daemon;
