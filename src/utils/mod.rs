//! # Utility Functions and Types
//!
//! Common low-level helpers used throughout the tsmerge library:
//!
//! - Bit-level reading for codec header parsing
//! - MPEG-2 CRC32 for PSI section validation
//!
//! ```rust
//! use tsmerge::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//! assert_eq!(reader.read_bits(3)?, 0b101);
//! # Ok(())
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

// Re-export commonly used types
pub use bits::BitReader;
pub use crc::Crc32Mpeg2;
