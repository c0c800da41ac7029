#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Decoder engine for MPEG audio (ISO/IEC 11172-3 Layers I/II/III and the
//! ISO/IEC 13818-3 low-sampling-frequency extension) elementary streams.
//!
//! ### Bitstream Organization
//!
//! **External structure**: a sequence of self-contained frames, each opened
//! by an 11-bit sync pattern and a 32-bit header.
//! **Internal structure**: side information, scale factors and subband or
//! spectral sample data; Layer III frames may additionally borrow main data
//! from the unused tail of earlier frames (bit reservoir).
//!
//! ### Processing Model
//!
//! One [`process::drive::Session`] owns one stream. The session pulls bytes
//! from the caller through [`process::drive::Handler::supply_input`], locates
//! and decodes frames strictly in order (the reservoir forbids reordering),
//! and pushes results back through the remaining [`process::drive::Handler`]
//! capabilities. Errors are classified as recoverable (frame-granular) or
//! terminal; recoverable errors always reach the caller before the session
//! retries.
//!
//! ## Quick Start
//!
//! 1. Implement [`process::drive::Handler`] for your state type
//! 2. Build a [`process::drive::Session`] around it
//! 3. Call [`process::drive::Session::run`]

/// Processing functionality for audio bitstreams.
///
/// 1. **Synchronization** ([`process::sync`]): Locates frame boundaries via
///    sync pattern detection and parses frame headers.
///
/// 2. **Decoding** ([`process::decode`]): Frame payload decoding to PCM for
///    all three layers.
///
/// 3. **Driving** ([`process::drive`]): The per-session state machine that
///    connects input supply, synchronization, decoding and dispatch.
pub mod process;

/// Data structures representing MPEG audio format components.
///
/// - **Frame Headers** ([`structs::header`]): Sync metadata and derived sizes
/// - **Side Information** ([`structs::side_info`]): Layer III granule layout
/// - **Subband Allocation** ([`structs::allocation`]): Layer I/II bit allocation
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **CRC Validation** ([`utils::crc`]): Frame error detection
/// - **Huffman Decoding** ([`utils::huffman`]): Spectral entropy decoding
/// - **Synthesis** ([`utils::synthesis`]): Polyphase filterbank
/// - **Tables** ([`utils::tables`]): Scale factor band and allocation tables
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
