//! # MPEG Transport Stream (TS) support
//!
//! Container-level TS handling for segment classification and merging:
//!
//! - Fixed 188-byte packet scanning with sync-byte alignment detection
//! - PAT/PMT (PSI) table parsing
//! - Stream signature extraction for compatibility comparison
//!
//! No PES payload is ever decoded; the only codec-level peek is the
//! optional H.264 SPS read used for resolution hints.

/// Low-level TS packet parsing utilities
pub mod parser;

/// Packet alignment detection and lazy packet iteration
pub mod scanner;

/// Stream signatures and their extraction
pub mod signature;

/// Core TS types and constants
pub mod types;

// Re-export commonly used types and constants
pub use parser::TSPacketParser;
pub use scanner::{is_ts_file_valid, TSPacket, TSPacketScanner};
pub use signature::{SignatureExtractor, StreamSignature};
pub use types::{CodecId, TSHeader, PID_PAT, TS_PACKET_SIZE, TS_SYNC_BYTE};
