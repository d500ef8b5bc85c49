//! UDP socket and receive loop
//!
//! Two threads per running receiver:
//!
//! - **reader**: blocking `recv_from` with a read timeout, copies each
//!   datagram into a bounded queue. When the queue is full the newest
//!   datagram is dropped, the same trade the assembly table makes.
//! - **processor**: owns the [`FramePipeline`] and drains the queue.
//!
//! Both threads watch one stop flag, so shutdown completes within roughly
//! one read timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use espcam_receiver_lib::config::ReceiverConfig;
//! use espcam_receiver_lib::receiver::StreamReceiver;
//! use espcam_receiver_lib::sink::LoggingSink;
//!
//! let receiver = StreamReceiver::bind(ReceiverConfig::default())?;
//! let handle = receiver.start(LoggingSink::new(10))?;
//! // ...
//! let sink = handle.stop()?;
//! ```

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{ConfigError, ReceiverConfig};
use crate::fragment::{hex_preview, FragmentHeader, HEADER_SIZE};
use crate::pipeline::FramePipeline;
use crate::sink::FrameSink;
use crate::stats::StreamStats;

/// Bytes of each datagram shown by [`StreamReceiver::sniff`]
const SNIFF_PREVIEW_BYTES: usize = 32;

/// Errors that can occur while setting up or stopping a receiver.
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying socket error.
        source: io::Error,
    },

    /// Socket option or thread spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A worker thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    /// The receiver was already stopped.
    #[error("receiver is not running")]
    NotRunning,
}

/// Result type alias for receiver operations.
pub type Result<T> = std::result::Result<T, ReceiverError>;

/// A bound UDP socket plus its configuration, not yet receiving
pub struct StreamReceiver {
    socket: UdpSocket,
    config: ReceiverConfig,
    stats: Arc<StreamStats>,
}

impl StreamReceiver {
    /// Validate the configuration and bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::Config` for an invalid configuration and
    /// `ReceiverError::Bind` if the address cannot be bound. Failure to
    /// enlarge the kernel receive buffer is logged, not returned.
    pub fn bind(config: ReceiverConfig) -> Result<Self> {
        config.validate()?;

        let addr = config.listen_socket_addr();
        let socket = UdpSocket::bind(addr).map_err(|source| ReceiverError::Bind { addr, source })?;
        socket.set_read_timeout(Some(config.read_timeout()))?;

        match set_recv_buffer_size(&socket, config.recv_buffer_bytes) {
            Ok(()) => match recv_buffer_size(&socket) {
                Ok(actual) => log::info!(
                    "Receive buffer: requested {} bytes, kernel granted {}",
                    config.recv_buffer_bytes,
                    actual
                ),
                Err(e) => log::debug!("Could not read back receive buffer size: {}", e),
            },
            Err(e) => log::warn!(
                "Could not set receive buffer to {} bytes: {}",
                config.recv_buffer_bytes,
                e
            ),
        }

        log::info!(
            "Listening for {}x{} RGB565 stream on {} (expected frame size {} bytes)",
            config.width,
            config.height,
            socket.local_addr().unwrap_or(addr),
            config.expected_frame_size()
        );

        Ok(Self {
            socket,
            config,
            stats: Arc::new(StreamStats::new()),
        })
    }

    /// Address the socket is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Counters shared with the worker threads.
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// Start the reader and processor threads, delivering frames to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::Io` if the socket cannot be shared or a
    /// thread cannot be spawned.
    pub fn start<S: FrameSink + 'static>(self, sink: S) -> Result<ReceiverHandle<S>> {
        let local_addr = self.socket.local_addr()?;
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (datagram_tx, datagram_rx) = mpsc::sync_channel(self.config.queue_depth);
        let (done_tx, done_rx) = watch::channel(false);

        let pipeline = FramePipeline::new(&self.config, sink, Arc::clone(&self.stats));
        let poll_interval = self.config.read_timeout();

        let processor = {
            let stop_flag = Arc::clone(&stop_flag);
            thread::Builder::new()
                .name("espcam-processor".to_string())
                .spawn(move || {
                    let pipeline = process_loop(pipeline, datagram_rx, &stop_flag, poll_interval);
                    let _ = done_tx.send(true);
                    pipeline
                })?
        };

        let reader = {
            let stop_flag = Arc::clone(&stop_flag);
            let stats = Arc::clone(&self.stats);
            let socket = self.socket;
            let max_datagram = self.config.max_datagram_size;
            thread::Builder::new()
                .name("espcam-reader".to_string())
                .spawn(move || read_loop(&socket, &datagram_tx, &stop_flag, &stats, max_datagram))
        };

        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                // Processor would otherwise wait on a queue nobody feeds
                stop_flag.store(true, Ordering::Relaxed);
                let _ = processor.join();
                return Err(e.into());
            }
        };

        log::info!("Stream receiver started on {}", local_addr);

        Ok(ReceiverHandle {
            local_addr,
            stop_flag,
            stats: self.stats,
            done: done_rx,
            reader: Some(reader),
            processor: Some(processor),
        })
    }

    /// Log every datagram's source, length, leading bytes and parsed header.
    ///
    /// Blocks until `stop` is set. Returns the number of datagrams seen.
    pub fn sniff(self, stop: &AtomicBool) -> u64 {
        let mut buf = vec![0u8; self.config.max_datagram_size.max(4096)];
        let mut count = 0u64;

        log::info!(
            "Sniffing datagrams on {}",
            self.socket
                .local_addr()
                .unwrap_or_else(|_| self.config.listen_socket_addr())
        );

        while !stop.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    count += 1;
                    let data = &buf[..len];
                    log::info!("Packet from {}, length={} bytes", from, len);
                    log::info!(
                        "  first {} bytes: {}",
                        SNIFF_PREVIEW_BYTES,
                        hex_preview(data, SNIFF_PREVIEW_BYTES)
                    );
                    match FragmentHeader::decode(data) {
                        Some(header) => log::info!(
                            "  frame_id={} total_length={} offset={} payload={} bytes",
                            header.frame_id,
                            header.total_length,
                            header.offset,
                            len.saturating_sub(HEADER_SIZE)
                        ),
                        None => log::info!("  too short for a fragment header"),
                    }
                }
                Err(e) if is_timeout(&e) => continue,
                Err(e) => log::warn!("Receive error: {}", e),
            }
        }

        log::info!("Sniffer stopped after {} datagrams", count);
        count
    }
}

/// A running receiver
///
/// Dropping the handle stops both threads.
pub struct ReceiverHandle<S: FrameSink + 'static> {
    local_addr: SocketAddr,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<StreamStats>,
    done: watch::Receiver<bool>,
    reader: Option<JoinHandle<()>>,
    processor: Option<JoinHandle<FramePipeline<S>>>,
}

impl<S: FrameSink + 'static> ReceiverHandle<S> {
    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Counters shared with the worker threads.
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// Whether both threads are still expected to run.
    pub fn is_running(&self) -> bool {
        self.processor.is_some() && !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Watch channel that flips to `true` once the processor thread exits,
    /// whether from [`stop`](Self::stop) or a sink asking to stop.
    pub fn finished(&self) -> watch::Receiver<bool> {
        self.done.clone()
    }

    /// Signal both threads, wait for them, and return the sink.
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::ThreadPanicked` if a worker panicked and
    /// `ReceiverError::NotRunning` if the handle was already stopped.
    pub fn stop(mut self) -> Result<S> {
        self.shutdown()?
            .map(FramePipeline::into_sink)
            .ok_or(ReceiverError::NotRunning)
    }

    fn shutdown(&mut self) -> Result<Option<FramePipeline<S>>> {
        self.stop_flag.store(true, Ordering::Relaxed);

        let reader = self.reader.take();
        let processor = self.processor.take();

        if let Some(reader) = reader {
            reader
                .join()
                .map_err(|_| ReceiverError::ThreadPanicked("reader"))?;
        }

        let pipeline = match processor {
            Some(processor) => Some(
                processor
                    .join()
                    .map_err(|_| ReceiverError::ThreadPanicked("processor"))?,
            ),
            None => None,
        };

        if pipeline.is_some() {
            let summary = self.stats.snapshot();
            log::info!(
                "Stream receiver stopped: {} datagrams, {} frames delivered, {} evicted, {} malformed",
                summary.datagrams_received,
                summary.frames_delivered,
                summary.frames_evicted,
                summary.datagrams_malformed
            );
        }

        Ok(pipeline)
    }
}

impl<S: FrameSink + 'static> Drop for ReceiverHandle<S> {
    fn drop(&mut self) {
        if self.processor.is_some() || self.reader.is_some() {
            let _ = self.shutdown();
        }
    }
}

/// Socket side: copy datagrams into the bounded queue.
fn read_loop(
    socket: &UdpSocket,
    queue: &SyncSender<Vec<u8>>,
    stop: &AtomicBool,
    stats: &StreamStats,
    max_datagram: usize,
) {
    let mut buf = vec![0u8; max_datagram];
    let mut dropped_in_burst = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _from)) => len,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                stats.record_recv_error();
                log::warn!("Receive error: {}", e);
                continue;
            }
        };
        stats.record_datagram();

        match queue.try_send(buf[..len].to_vec()) {
            Ok(()) => {
                if dropped_in_burst > 0 {
                    log::warn!(
                        "Processing queue was full: dropped {} datagrams",
                        dropped_in_burst
                    );
                    dropped_in_burst = 0;
                }
            }
            Err(TrySendError::Full(_)) => {
                stats.record_queue_drop();
                dropped_in_burst += 1;
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Processor gone, reader exiting");
                break;
            }
        }
    }

    log::debug!("Reader thread exiting");
}

/// Processing side: drain the queue through the pipeline.
fn process_loop<S: FrameSink>(
    mut pipeline: FramePipeline<S>,
    queue: Receiver<Vec<u8>>,
    stop: &AtomicBool,
    poll_interval: Duration,
) -> FramePipeline<S> {
    while !stop.load(Ordering::Relaxed) {
        match queue.recv_timeout(poll_interval) {
            Ok(datagram) => {
                if pipeline.process_datagram(&datagram).wants_stop() {
                    log::info!("Sink requested stop");
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("Datagram queue closed");
                break;
            }
        }
    }

    log::debug!("Processor thread exiting");
    pipeline
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Request a kernel receive buffer of `bytes` (`SO_RCVBUF`).
#[cfg(unix)]
fn set_recv_buffer_size(socket: &UdpSocket, bytes: usize) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let value = libc::c_int::try_from(bytes).unwrap_or(libc::c_int::MAX);
    // SAFETY: the fd belongs to `socket`, which outlives the call, and
    // `value` is a live c_int whose size is passed alongside it.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&value as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Kernel receive buffer size actually in effect.
#[cfg(unix)]
fn recv_buffer_size(socket: &UdpSocket) -> io::Result<usize> {
    use std::os::unix::io::AsRawFd;

    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: `value` and `len` are live locals sized for SO_RCVBUF.
    let ret = unsafe {
        libc::getsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&mut value as *mut libc::c_int).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(usize::try_from(value).unwrap_or(0))
}

#[cfg(not(unix))]
fn set_recv_buffer_size(_socket: &UdpSocket, _bytes: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_RCVBUF tuning is only implemented on unix",
    ))
}

#[cfg(not(unix))]
fn recv_buffer_size(_socket: &UdpSocket) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_RCVBUF query is only implemented on unix",
    ))
}
