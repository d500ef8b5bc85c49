//! Receiver configuration
//!
//! Everything is fixed at startup. Values come from built-in defaults, an
//! optional JSON file, and finally command-line overrides in `main.rs`.
//!
//! `eviction` defaults to `oldest-arrival`. Set `"eviction": "lowest-id"`
//! (or `--eviction lowest-id`) to evict the numerically smallest frame ID,
//! which misbehaves once the sender's 16-bit counter wraps.
//!
//! ```json
//! {
//!     "listen_addr": "192.168.1.3",
//!     "listen_port": 5000,
//!     "width": 160,
//!     "height": 120,
//!     "eviction": "oldest-arrival"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::fragment::{HEADER_SIZE, MAX_DATAGRAM_SIZE};
use crate::frame_assembler::{CompletionCheck, EvictionPolicy, DEFAULT_MAX_IN_FLIGHT};
use crate::rgb565::{expected_frame_size, ChannelOrder};

/// UDP port the camera firmware sends to
pub const DEFAULT_PORT: u16 = 5000;

/// QQVGA frame width
pub const DEFAULT_WIDTH: u32 = 160;

/// QQVGA frame height
pub const DEFAULT_HEIGHT: u32 = 120;

/// Errors loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`ReceiverConfig`].
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is outside its allowed range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Startup configuration for the stream receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// IP address to bind.
    pub listen_addr: IpAddr,
    /// UDP port to bind (0 picks an ephemeral port).
    pub listen_port: u16,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Maximum number of incomplete frames held at once.
    pub max_in_flight: usize,
    /// Receive buffer size per datagram, header included.
    pub max_datagram_size: usize,
    /// Largest `total_length` a fragment header may declare. Defaults to
    /// the expected frame size; frames of any other size cannot convert.
    pub max_frame_bytes: Option<u32>,
    /// Requested kernel receive buffer (`SO_RCVBUF`).
    pub recv_buffer_bytes: usize,
    /// Socket read timeout; bounds how long shutdown can take.
    pub read_timeout_ms: u64,
    /// Datagrams buffered between the socket reader and the assembler.
    pub queue_depth: usize,
    /// Victim selection when the assembly table is full.
    pub eviction: EvictionPolicy,
    /// Completion predicate.
    pub completion: CompletionCheck,
    /// Channel order of converted images.
    pub channel_order: ChannelOrder,
    /// Delivered frames between FPS log lines (0 disables).
    pub fps_interval: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: DEFAULT_PORT,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            max_frame_bytes: None,
            recv_buffer_bytes: 8 * 1024 * 1024,
            read_timeout_ms: 100,
            queue_depth: 256,
            eviction: EvictionPolicy::default(),
            completion: CompletionCheck::default(),
            channel_order: ChannelOrder::default(),
            fps_interval: 10,
        }
    }
}

impl ReceiverConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Json` if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Socket address to bind.
    pub fn listen_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.listen_port)
    }

    /// Expected reassembled frame size in bytes (`width * height * 2`).
    pub fn expected_frame_size(&self) -> usize {
        expected_frame_size(self.width, self.height)
    }

    /// Largest `total_length` accepted at the parse boundary.
    pub fn frame_byte_limit(&self) -> u32 {
        self.max_frame_bytes.unwrap_or_else(|| {
            u32::try_from(self.expected_frame_size()).unwrap_or(u32::MAX)
        })
    }

    /// Socket read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Check that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.width == 0 || self.height == 0 {
            return Err(invalid(
                "dimensions",
                format!("{}x{} has no pixels", self.width, self.height),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(invalid("max_in_flight", "must be at least 1"));
        }
        if self.max_datagram_size <= HEADER_SIZE {
            return Err(invalid(
                "max_datagram_size",
                format!(
                    "{} leaves no room for payload after the {}-byte header",
                    self.max_datagram_size, HEADER_SIZE
                ),
            ));
        }
        if self.queue_depth == 0 {
            return Err(invalid("queue_depth", "must be at least 1"));
        }
        if self.read_timeout_ms == 0 {
            return Err(invalid("read_timeout_ms", "zero would block reads forever"));
        }
        if self.expected_frame_size() > self.frame_byte_limit() as usize {
            return Err(invalid(
                "max_frame_bytes",
                format!(
                    "{} is below the expected frame size {}",
                    self.frame_byte_limit(),
                    self.expected_frame_size()
                ),
            ));
        }
        Ok(())
    }
}
