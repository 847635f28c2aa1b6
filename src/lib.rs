#![doc(html_root_url = "https://docs.rs/tsmerge/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # tsmerge - MPEG-TS segment classification and merging
//!
//! `tsmerge` takes the ordered MPEG transport-stream segments produced by
//! a segmented media download (HLS/M3U8 playlists) and turns them into
//! playable output files. Segments in one playlist can originate from
//! stream-profile changes — resolution switches, codec switches, ad
//! insertion — that are not bit-compatible for naive concatenation, so
//! the crate first classifies segments by their container-level stream
//! signature and then concatenates each compatible run, with pause,
//! resume, cancellation, progress reporting, and cache-based resumption
//! of interrupted work.
//!
//! The crate never decodes media samples; it only parses container-level
//! framing (packet sync, PAT/PMT structure) plus an optional H.264 SPS
//! peek for resolution hints.
//!
//! ## Classifying segments
//!
//! ```rust,no_run
//! use tsmerge::filter::TsFilter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let filter = TsFilter::with_segments(["seg0.ts", "seg1.ts", "seg2.ts"]);
//!     for group in filter.filter().await? {
//!         println!("{} segments: {}", group.len(), group.stream_description());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Merging a compatible run
//!
//! ```rust,no_run
//! use tsmerge::merge::TsMerger;
//!
//! #[tokio::main]
//! async fn main() {
//!     let merger = TsMerger::merge_ts_files(
//!         ["seg0.ts", "seg1.ts"],
//!         |p| println!("progress {:.1}%", p * 100.0),
//!         |outcome| match outcome {
//!             Ok(path) => println!("merged into {}", path.display()),
//!             Err(e) => eprintln!("merge failed: {}", e),
//!         },
//!     );
//!     merger.set_dir("/tmp/downloads");
//!     merger.start();
//!     // pause() / resume() / stop() / clear_cache() from any thread
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `format`: MPEG-TS container parsing — packet scanner, PSI tables,
//!   stream signatures
//! - `filter`: compatibility classification of ordered segment lists
//! - `merge`: the merge state machine, background worker, and cache
//! - `codec`: the minimal H.264 SPS parse behind resolution hints
//! - `error`: error taxonomy and crate-wide `Result`
//! - `utils`: bit reading and MPEG-2 CRC32

/// H.264 SPS parsing for resolution hints
pub mod codec;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// Compatibility classification of segment lists
pub mod filter;

/// Media container implementations (MPEG-TS)
pub mod format;

/// Merge engine and cache
pub mod merge;

/// Common utilities and helper functions
pub mod utils;

pub use error::{Result, TsMergeError};
pub use filter::{CompatibilityGroup, Segment, TsFilter};
pub use format::ts::{is_ts_file_valid, SignatureExtractor, StreamSignature};
pub use merge::{CacheManager, MergeOutcome, MergeState, TsMerger};
