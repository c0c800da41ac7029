//! Frame synchronization, decoding and session driving.
//!
//! Provides the [`sync`] scanner for locating frame boundaries, the
//! [`decode`] path converting frames to PCM, and the [`drive`] state
//! machine connecting both to the caller's callbacks.

pub mod decode;
pub mod drive;
pub mod layer3;
pub mod sync;

/// Maximum channels in any frame.
pub const MAX_CHANNELS: usize = 2;

/// Maximum PCM samples per frame and channel (Layer II/III, MPEG-1).
pub const MAX_FRAME_SAMPLES: usize = 1152;

/// Samples per Layer III granule and channel.
pub const GRANULE_SAMPLES: usize = 576;

/// Subband count of the polyphase filterbank.
pub const SUBBANDS: usize = 32;
