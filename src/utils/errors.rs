#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Rejection reasons for a 32-bit candidate header found at a sync pattern.
///
/// Each of these makes the header unusable; the synchronizer must restart
/// the scan one byte past the failed position.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Reserved MPEG version ID")]
    ReservedVersion,

    #[error("Reserved layer code")]
    ReservedLayer,

    #[error("Reserved bitrate index 15")]
    ReservedBitrate,

    #[error("Free-format bitrate index 0 is not supported")]
    FreeFormatBitrate,

    #[error("Reserved sampling frequency index 3")]
    ReservedSamplingFrequency,

    #[error("Layer II forbids bitrate {bitrate_kbps} kbps in {mode} mode")]
    ForbiddenLayer2Mode { bitrate_kbps: u32, mode: &'static str },
}

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("No sync pattern found before end of buffer")]
    Lost,

    #[error("Insufficient buffered data to complete the frame")]
    OutOfData,

    #[error("Sync pattern with invalid header fields: {0}")]
    Malformed(#[from] HeaderError),
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error(
        "Bit reservoir exhausted: main_data_begin = {needed} but only {available} bytes retained"
    )]
    ReservoirExhausted { needed: usize, available: usize },

    #[error("Frame payload ended inside {section}")]
    PayloadTruncated { section: &'static str },

    #[error("Invalid bit allocation {allocation} for subband {subband}")]
    InvalidAllocation { subband: usize, allocation: u8 },

    #[error("Invalid scale factor index {0}")]
    InvalidScaleFactor(u8),

    #[error("Reserved block_type 0 with window switching")]
    ReservedBlockType,

    #[error("Huffman table {0} has no codebook")]
    MissingCodebook(u8),

    #[error("Undecodable Huffman prefix in table {table} at bit {position}")]
    HuffmanPrefix { table: u8, position: u64 },

    #[error("part2_3_length = {limit} bits overrun by scale factor data ({used} bits)")]
    ScaleFactorOverrun { limit: u32, used: u32 },

    #[error("CRC mismatch: calculated {calculated:#06X}, read {read:#06X}")]
    CrcMismatch { calculated: u16, read: u16 },
}

impl From<std::io::Error> for DecodeError {
    fn from(_: std::io::Error) -> Self {
        DecodeError::PayloadTruncated {
            section: "frame payload",
        }
    }
}

/// Driver-level error classification delivered to the error callback.
///
/// Every variant except `InvariantViolation` is recoverable at frame
/// granularity; the session retries after the callback returns.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("Out of data: more input required")]
    OutOfData,

    #[error("Synchronization lost")]
    SyncLost,

    #[error("Malformed header: {0}")]
    MalformedHeader(#[from] HeaderError),

    #[error("Frame decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl StreamError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StreamError::InvariantViolation(_))
    }
}

impl From<SyncError> for StreamError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Lost => StreamError::SyncLost,
            SyncError::OutOfData => StreamError::OutOfData,
            SyncError::Malformed(h) => StreamError::MalformedHeader(h),
        }
    }
}
