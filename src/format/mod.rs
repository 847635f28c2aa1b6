//! Media container implementations.
//!
//! Only container-level framing is handled here; media payloads are never
//! decoded.

/// MPEG Transport Stream support
pub mod ts;
