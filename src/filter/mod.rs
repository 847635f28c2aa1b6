//! Compatibility classification of ordered TS segment lists.
//!
//! Segments produced by one playlist can still originate from different
//! stream profiles (resolution switch, codec switch, ad insertion) that
//! are not bit-compatible for naive concatenation. [`TsFilter`] partitions
//! an ordered segment list into maximal runs of mutually compatible
//! segments; each run merges cleanly into one continuous stream.

use crate::error::Result;
use crate::format::ts::signature::{SignatureExtractor, StreamSignature};
use std::path::{Path, PathBuf};

/// One input TS segment. The file is owned by the caller; the core only
/// holds the path and never mutates or deletes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    path: PathBuf,
}

impl Segment {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte length, discovered lazily from the filesystem.
    pub async fn byte_len(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}

/// An ordered, non-empty run of segments sharing one stream signature
/// (the signature of the run's first segment).
#[derive(Debug, Clone)]
pub struct CompatibilityGroup {
    segments: Vec<Segment>,
    signature: StreamSignature,
}

impl CompatibilityGroup {
    fn new(first: Segment, signature: StreamSignature) -> Self {
        Self {
            segments: vec![first],
            signature,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn signature(&self) -> &StreamSignature {
        &self.signature
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Human-readable form of the group's signature, for logging.
    /// Not used for equality.
    pub fn stream_description(&self) -> String {
        self.signature.to_string()
    }

    /// Pairwise check of an arbitrary file against this group's
    /// reference signature, without re-partitioning.
    pub async fn is_stream_compatible<P: AsRef<Path>>(&self, path: P) -> bool {
        match SignatureExtractor::new().extract(path).await {
            Ok(sig) => self.signature.is_compatible(&sig),
            Err(_) => false,
        }
    }
}

/// Partitions an ordered segment list into maximal compatible runs.
pub struct TsFilter {
    segments: Vec<Segment>,
    extractor: SignatureExtractor,
}

impl TsFilter {
    /// Builds a filter over the given ordered segment paths.
    pub fn with_segments<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            segments: paths.into_iter().map(Segment::new).collect(),
            extractor: SignatureExtractor::new(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Splits the segment list into ordered compatibility groups.
    ///
    /// One extractor call per segment. Groups cover the entire input in
    /// order; a segment joins the current group iff its signature is
    /// compatible with the group's reference signature, otherwise it
    /// starts a new group. A degraded (partial) signature still
    /// classifies; only a failed packet scan aborts, carrying the
    /// offending segment's path so callers can exclude it and re-run.
    pub async fn filter(&self) -> Result<Vec<CompatibilityGroup>> {
        let mut groups: Vec<CompatibilityGroup> = Vec::new();
        let mut current: Option<CompatibilityGroup> = None;

        for segment in &self.segments {
            let signature = self.extractor.extract(segment.path()).await?;

            match current.as_mut() {
                None => current = Some(CompatibilityGroup::new(segment.clone(), signature)),
                Some(group) => {
                    if group.signature.is_compatible(&signature) {
                        group.segments.push(segment.clone());
                    } else {
                        log::debug!(
                            "stream change at {}: {} -> {}",
                            segment.path().display(),
                            group.signature,
                            signature
                        );
                        groups.push(current.take().unwrap());
                        current = Some(CompatibilityGroup::new(segment.clone(), signature));
                    }
                }
            }
        }

        if let Some(group) = current {
            groups.push(group);
        }

        log::debug!(
            "partitioned {} segments into {} groups",
            self.segments.len(),
            groups.len()
        );
        Ok(groups)
    }

    /// Pairwise check of a file against the filter's reference signature
    /// (the signature of its first segment).
    pub async fn is_stream_compatible<P: AsRef<Path>>(&self, path: P) -> bool {
        let Some(first) = self.segments.first() else {
            return false;
        };
        let Ok(reference) = self.extractor.extract(first.path()).await else {
            return false;
        };
        match self.extractor.extract(path).await {
            Ok(sig) => reference.is_compatible(&sig),
            Err(_) => false,
        }
    }

    /// Human-readable form of the filter's reference signature.
    pub async fn stream_description(&self) -> String {
        let Some(first) = self.segments.first() else {
            return "empty".into();
        };
        match self.extractor.extract(first.path()).await {
            Ok(sig) => sig.to_string(),
            Err(e) => format!("unreadable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::signature::StreamSignature;
    use crate::format::ts::types::CodecId;
    use quickcheck_macros::quickcheck;

    type SigTuple = (Option<u8>, Option<bool>, Option<u16>, Option<u16>);

    fn sig_from(t: SigTuple) -> StreamSignature {
        StreamSignature {
            program_count: t.0.map(|n| n as u32),
            video_codec: t.1.map(|v| if v { CodecId::H264 } else { CodecId::H265 }),
            video_pid: t.2,
            audio_codec: None,
            audio_pid: t.3,
            resolution: None,
        }
    }

    #[quickcheck]
    fn prop_compatibility_reflexive(a: SigTuple) -> bool {
        let sig = sig_from(a);
        sig.is_compatible(&sig)
    }

    #[quickcheck]
    fn prop_compatibility_symmetric(a: SigTuple, b: SigTuple) -> bool {
        let (a, b) = (sig_from(a), sig_from(b));
        a.is_compatible(&b) == b.is_compatible(&a)
    }

    #[quickcheck]
    fn prop_empty_signature_matches_anything(a: SigTuple) -> bool {
        StreamSignature::default().is_compatible(&sig_from(a))
    }

    #[test]
    fn test_empty_filter() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let filter = TsFilter::with_segments(Vec::<&str>::new());
            assert!(filter.filter().await.unwrap().is_empty());
            assert!(!filter.is_stream_compatible("/nonexistent").await);
            assert_eq!(filter.stream_description().await, "empty");
        });
    }
}
