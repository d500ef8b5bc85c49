//! Delivery of converted frames
//!
//! The receiver pushes every decoded frame into a [`FrameSink`]. Rendering
//! lives outside this crate; the sinks here cover logging, frame-rate
//! measurement and handing frames to another thread.

use std::sync::mpsc::Sender;
use std::time::Instant;

use crate::rgb565::RgbImage;

/// A reassembled and converted frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Frame ID the fragments carried
    pub frame_id: u16,
    /// Converted image
    pub image: RgbImage,
}

/// What the receive loop should do after a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    /// Keep receiving
    Continue,
    /// Shut the receiver down (e.g. display window closed)
    Stop,
}

/// Consumer of decoded frames
pub trait FrameSink: Send {
    /// Take ownership of one decoded frame.
    fn deliver(&mut self, frame: DecodedFrame) -> SinkControl;
}

impl<F> FrameSink for F
where
    F: FnMut(DecodedFrame) -> SinkControl + Send,
{
    fn deliver(&mut self, frame: DecodedFrame) -> SinkControl {
        self(frame)
    }
}

/// Frame-rate measurement over fixed windows of frames
#[derive(Debug)]
pub struct FpsMeter {
    interval: u32,
    frames_in_window: u32,
    window_start: Instant,
    total_frames: u64,
}

impl FpsMeter {
    /// Report a rate every `interval` frames. An interval of 0 never reports.
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            frames_in_window: 0,
            window_start: Instant::now(),
            total_frames: 0,
        }
    }

    /// Frames counted since creation
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Count one frame, returning the window's rate when the window closes.
    pub fn tick(&mut self) -> Option<f64> {
        self.total_frames += 1;
        if self.interval == 0 {
            return None;
        }

        self.frames_in_window += 1;
        if self.frames_in_window < self.interval {
            return None;
        }

        let elapsed = self.window_start.elapsed().as_secs_f64();
        let frames = f64::from(self.frames_in_window);
        self.frames_in_window = 0;
        self.window_start = Instant::now();

        Some(if elapsed > 0.0 { frames / elapsed } else { 0.0 })
    }
}

/// Logs frame arrivals and the frame rate; discards the pixels
#[derive(Debug)]
pub struct LoggingSink {
    fps: FpsMeter,
}

impl LoggingSink {
    /// Log the rate every `fps_interval` frames.
    pub fn new(fps_interval: u32) -> Self {
        Self {
            fps: FpsMeter::new(fps_interval),
        }
    }

    /// Frames delivered so far
    pub fn frames_delivered(&self) -> u64 {
        self.fps.total_frames()
    }
}

impl FrameSink for LoggingSink {
    fn deliver(&mut self, frame: DecodedFrame) -> SinkControl {
        log::debug!(
            "Frame {}: {}x{} {}",
            frame.frame_id,
            frame.image.width,
            frame.image.height,
            frame.image.order
        );
        if let Some(fps) = self.fps.tick() {
            log::info!("FPS: {:.1}", fps);
        }
        SinkControl::Continue
    }
}

/// Forwards frames over a channel to a consumer thread
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<DecodedFrame>,
}

impl ChannelSink {
    /// Wrap the sending half of a channel.
    pub fn new(sender: Sender<DecodedFrame>) -> Self {
        Self { sender }
    }
}

impl FrameSink for ChannelSink {
    fn deliver(&mut self, frame: DecodedFrame) -> SinkControl {
        if self.sender.send(frame).is_err() {
            log::debug!("Frame receiver dropped, stopping");
            return SinkControl::Stop;
        }
        SinkControl::Continue
    }
}
