//! `espcam-receiver` - UDP frame reassembly for RGB565 camera streams
//!
//! A small camera board sends each raw RGB565 frame as a burst of UDP
//! datagrams, each prefixed with a 10-byte header (`frame_id`,
//! `total_length`, `offset`). This crate reassembles those bursts under a
//! bounded memory budget, drops frames that can no longer complete, and
//! converts finished frames into 8-bit three-channel images.
//!
//! The stages are usable on their own:
//!
//! - [`fragment`]: header parsing and encoding
//! - [`frame_assembler`]: bounded table of in-flight frames
//! - [`frame_emitter`]: stitches a complete frame into one buffer
//! - [`rgb565`]: pixel conversion
//! - [`pipeline`]: all of the above for one datagram at a time
//! - [`receiver`]: socket, threads and shutdown

pub mod config;
pub mod fragment;
pub mod frame_assembler;
pub mod frame_emitter;
pub mod pipeline;
pub mod receiver;
pub mod rgb565;
pub mod sink;
pub mod stats;
pub mod test_utils;

use serde::{Deserialize, Serialize};

/// Build information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Crate version from Cargo.toml
    pub version: String,
    /// Git commit hash (short)
    pub git_hash: String,
    /// Build timestamp
    pub build_time: String,
}

/// Get build information (version, git hash, build time)
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("BUILD_GIT_HASH").to_string(),
        build_time: env!("BUILD_TIMESTAMP").to_string(),
    }
}

/// Initialize `env_logger` with an `info` default, honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
