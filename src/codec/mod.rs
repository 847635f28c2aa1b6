//! Codec-level header parsing.
//!
//! The merge core never decodes media samples. The only codec parsing it
//! does is locating an H.264 sequence parameter set to derive a resolution
//! hint for stream signatures.

/// H.264 SPS parsing for resolution hints
pub mod h264;
