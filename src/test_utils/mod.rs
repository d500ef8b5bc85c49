//! Test utilities for the stream receiver
//!
//! Provides synthetic RGB565 frames and fragment generation for exercising
//! the reassembly pipeline without a camera on the network.

pub mod fragment_generator;

pub use fragment_generator::*;
