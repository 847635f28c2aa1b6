use super::parser::TSPacketParser;
use super::scanner::{TSPacket, TSPacketScanner};
use super::types::*;
use crate::codec::h264;
use crate::config;
use crate::error::Result;
use crate::utils::Crc32Mpeg2;
use std::fmt;
use std::path::Path;

/// Container-level identity of a segment's streams, used to decide
/// whether two segments can be concatenated byte-for-byte.
///
/// Absent fields act as wildcards: a field missing on either side never
/// blocks compatibility, but two populated fields that differ always do.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSignature {
    pub program_count: Option<u32>,
    pub video_codec: Option<CodecId>,
    pub video_pid: Option<u16>,
    pub audio_codec: Option<CodecId>,
    pub audio_pid: Option<u16>,
    pub resolution: Option<(u32, u32)>,
}

fn wildcard_eq<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

impl StreamSignature {
    /// True when every field populated on both sides is equal.
    pub fn is_compatible(&self, other: &StreamSignature) -> bool {
        wildcard_eq(&self.program_count, &other.program_count)
            && wildcard_eq(&self.video_codec, &other.video_codec)
            && wildcard_eq(&self.video_pid, &other.video_pid)
            && wildcard_eq(&self.audio_codec, &other.audio_codec)
            && wildcard_eq(&self.audio_pid, &other.audio_pid)
            && wildcard_eq(&self.resolution, &other.resolution)
    }

    /// True when no field could be determined at all.
    pub fn is_empty(&self) -> bool {
        *self == StreamSignature::default()
    }
}

impl fmt::Display for StreamSignature {
    /// Stable human-readable rendering for logs and diagnostics.
    /// Not used for equality.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "?".into(), |x| x.to_string())
        }

        write!(
            f,
            "programs={} video={}@pid:{} audio={}@pid:{} res={}",
            opt(&self.program_count),
            opt(&self.video_codec),
            opt(&self.video_pid),
            opt(&self.audio_codec),
            opt(&self.audio_pid),
            self.resolution
                .map_or_else(|| "?".into(), |(w, h)| format!("{}x{}", w, h)),
        )
    }
}

/// Derives a [`StreamSignature`] from a segment file by walking its
/// PAT and first PMT, within a bounded packet budget.
pub struct SignatureExtractor {
    parser: TSPacketParser,
    crc: Crc32Mpeg2,
}

impl Default for SignatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureExtractor {
    pub fn new() -> Self {
        Self {
            parser: TSPacketParser::new(),
            crc: Crc32Mpeg2::new(),
        }
    }

    /// Extracts the signature of the segment at `path`.
    ///
    /// Scanning stops once a complete PAT+PMT pair (and, for H.264 video,
    /// an SPS resolution hint) is resolved, or when the configured packet
    /// budget runs out. Budget exhaustion degrades to a partial signature;
    /// only a failed packet scan is an error.
    pub async fn extract<P: AsRef<Path>>(&self, path: P) -> Result<StreamSignature> {
        let path = path.as_ref();
        let mut scanner = TSPacketScanner::open(path).await?;
        let budget = config::get().scan_packet_budget;

        let mut signature = StreamSignature::default();
        let mut pmt_pid: Option<u16> = None;
        let mut have_pmt = false;

        for _ in 0..budget {
            let packet = match scanner.next_packet().await? {
                Some(p) => p,
                None => break,
            };

            if packet.header.transport_error || !packet.header.contains_payload {
                continue;
            }

            if packet.header.pid == PID_PAT && packet.header.payload_unit_start {
                if let Some((TABLE_ID_PAT, body)) = self.read_section(&packet) {
                    if let Ok(pat) = self.parser.parse_pat(body, 0, body.len()) {
                        signature.program_count = Some(pat.program_count() as u32);
                        if pmt_pid.is_none() {
                            pmt_pid = pat
                                .entries
                                .iter()
                                .find(|e| e.program_number != 0)
                                .map(|e| e.program_map_pid);
                        }
                    }
                }
                continue;
            }

            if !have_pmt && Some(packet.header.pid) == pmt_pid && packet.header.payload_unit_start
            {
                if let Some((TABLE_ID_PMT, body)) = self.read_section(&packet) {
                    if let Ok(pmt) = self.parser.parse_pmt(body, 0, body.len()) {
                        self.apply_pmt(&mut signature, &pmt);
                        have_pmt = true;
                    }
                }
                continue;
            }

            if have_pmt {
                // Table pair resolved; keep scanning only while a
                // resolution hint is still worth looking for.
                if signature.video_codec != Some(CodecId::H264)
                    || signature.resolution.is_some()
                {
                    break;
                }
                if Some(packet.header.pid) == signature.video_pid
                    && packet.header.payload_unit_start
                {
                    signature.resolution = self.sps_resolution(&packet);
                    if signature.resolution.is_some() {
                        break;
                    }
                }
            }
        }

        if !have_pmt {
            log::debug!(
                "no complete PAT+PMT in {} within {} packets, partial signature: {}",
                path.display(),
                budget,
                signature
            );
        }

        Ok(signature)
    }

    fn apply_pmt(&self, signature: &mut StreamSignature, pmt: &PMT) {
        for info in &pmt.elementary_stream_infos {
            let codec = CodecId::from_stream_type(info.stream_type);
            if codec.is_video() && signature.video_pid.is_none() {
                signature.video_codec = Some(codec);
                signature.video_pid = Some(info.elementary_pid);
            } else if codec.is_audio() && signature.audio_pid.is_none() {
                signature.audio_codec = Some(codec);
                signature.audio_pid = Some(info.elementary_pid);
            }
        }
    }

    /// Extracts a CRC-validated PSI section body from a single packet.
    ///
    /// Returns the table id and the section body after the 5 fixed bytes
    /// that follow the section length (and before the trailing CRC).
    /// Sections spanning multiple packets are not reassembled; a section
    /// that does not fit one packet is treated as not seen.
    fn read_section<'a>(&self, packet: &'a TSPacket) -> Option<(u8, &'a [u8])> {
        let payload_offset = self
            .parser
            .payload_offset(&packet.data, &packet.header)
            .ok()?;
        let payload = packet.data.get(payload_offset..)?;

        let pointer = *payload.first()? as usize;
        let section = payload.get(1 + pointer..)?;
        if section.len() < 3 {
            return None;
        }

        let table_id = section[0];
        let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
        let total = 3 + section_length;
        if section_length < 9 || total > section.len() {
            return None;
        }

        let crc_stored = u32::from_be_bytes(section[total - 4..total].try_into().ok()?);
        if self.crc.calculate(&section[..total - 4]) != crc_stored {
            log::debug!("PSI section CRC mismatch, table_id 0x{:02x}", table_id);
            return None;
        }

        // 3-byte header + 5 bytes (ids/version/section numbers), CRC at tail
        Some((table_id, &section[8..total - 4]))
    }

    fn sps_resolution(&self, packet: &TSPacket) -> Option<(u32, u32)> {
        let payload_offset = self
            .parser
            .payload_offset(&packet.data, &packet.header)
            .ok()?;
        h264::find_sps_dimensions(packet.data.get(payload_offset..)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h264::test_utils::build_sps_nal;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tokio::runtime::Runtime;

    pub(crate) fn create_pat_packet(pmt_pid: u16) -> Vec<u8> {
        let mut pat_packet = vec![0u8; TS_PACKET_SIZE];
        pat_packet[0] = 0x47; // Sync byte
        pat_packet[1] = 0x40; // Payload start indicator + no transport error
        pat_packet[2] = 0x00; // PID 0 (PAT)
        pat_packet[3] = 0x10; // No adaptation field
        pat_packet[4] = 0x00; // Pointer field
        pat_packet[5] = 0x00; // Table ID (PAT)

        // Section length: 5 header bytes + one 4-byte entry + CRC
        pat_packet[6] = 0xB0;
        pat_packet[7] = 13;

        pat_packet[8] = 0x00; // Transport stream ID high
        pat_packet[9] = 0x01; // Transport stream ID low
        pat_packet[10] = 0xC1; // Version (0) + current/next (1)
        pat_packet[11] = 0x00; // Section number
        pat_packet[12] = 0x00; // Last section number

        // Program entry
        pat_packet[13] = 0x00;
        pat_packet[14] = 0x01; // Program number 1
        pat_packet[15] = 0xE0 | ((pmt_pid >> 8) & 0x1F) as u8;
        pat_packet[16] = (pmt_pid & 0xFF) as u8;

        let crc = Crc32Mpeg2::new();
        let crc_val = crc.calculate(&pat_packet[5..17]);
        pat_packet[17..21].copy_from_slice(&crc_val.to_be_bytes());

        pat_packet[21..].fill(0xFF);
        pat_packet
    }

    pub(crate) fn create_pmt_packet(
        pmt_pid: u16,
        video: Option<(u8, u16)>,
        audio: Option<(u8, u16)>,
    ) -> Vec<u8> {
        let mut pmt_packet = vec![0u8; TS_PACKET_SIZE];
        pmt_packet[0] = 0x47;
        pmt_packet[1] = 0x40 | ((pmt_pid >> 8) & 0x1F) as u8;
        pmt_packet[2] = (pmt_pid & 0xFF) as u8;
        pmt_packet[3] = 0x10;
        pmt_packet[4] = 0x00; // Pointer field
        pmt_packet[5] = 0x02; // Table ID (PMT)

        let entries = video.iter().count() + audio.iter().count();
        let section_length = 13 + 5 * entries as u8;
        pmt_packet[6] = 0xB0;
        pmt_packet[7] = section_length;

        pmt_packet[8] = 0x00; // Program number high
        pmt_packet[9] = 0x01; // Program number low
        pmt_packet[10] = 0xC1; // Version (0) + current
        pmt_packet[11] = 0x00; // Section number
        pmt_packet[12] = 0x00; // Last section number

        pmt_packet[13] = 0xE1; // PCR PID high
        pmt_packet[14] = 0x00; // PCR PID low
        pmt_packet[15] = 0xF0; // Program info length
        pmt_packet[16] = 0x00;

        let mut pos = 17;
        for (stream_type, pid) in video.into_iter().chain(audio) {
            pmt_packet[pos] = stream_type;
            pmt_packet[pos + 1] = 0xE0 | ((pid >> 8) & 0x1F) as u8;
            pmt_packet[pos + 2] = (pid & 0xFF) as u8;
            pmt_packet[pos + 3] = 0xF0;
            pmt_packet[pos + 4] = 0x00;
            pos += 5;
        }

        let crc = Crc32Mpeg2::new();
        let crc_val = crc.calculate(&pmt_packet[5..pos]);
        pmt_packet[pos..pos + 4].copy_from_slice(&crc_val.to_be_bytes());

        pmt_packet[pos + 4..].fill(0xFF);
        pmt_packet
    }

    fn create_video_packet(pid: u16, sps_mbs: Option<(u32, u32)>) -> Vec<u8> {
        let mut p = vec![0xFFu8; TS_PACKET_SIZE];
        p[0] = 0x47;
        p[1] = 0x40 | ((pid >> 8) & 0x1F) as u8;
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10;
        if let Some((w, h)) = sps_mbs {
            let nal = build_sps_nal(w, h);
            p[4..4 + nal.len()].copy_from_slice(&nal);
        }
        p
    }

    fn write_segment(packets: &[Vec<u8>]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for p in packets {
            f.write_all(p).unwrap();
        }
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_extract_full_signature() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let segment = write_segment(&[
                create_pat_packet(0x1000),
                create_pmt_packet(
                    0x1000,
                    Some((STREAM_TYPE_H264, 0x100)),
                    Some((STREAM_TYPE_AAC, 0x101)),
                ),
                create_video_packet(0x100, Some((80, 45))),
                create_video_packet(0x100, None),
            ]);

            let sig = SignatureExtractor::new()
                .extract(segment.path())
                .await
                .unwrap();

            assert_eq!(sig.program_count, Some(1));
            assert_eq!(sig.video_codec, Some(CodecId::H264));
            assert_eq!(sig.video_pid, Some(0x100));
            assert_eq!(sig.audio_codec, Some(CodecId::Aac));
            assert_eq!(sig.audio_pid, Some(0x101));
            assert_eq!(sig.resolution, Some((1280, 720)));
        });
    }

    #[test]
    fn test_extract_degrades_without_tables() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            // Media packets only, PAT/PMT never repeated into this segment
            let segment = write_segment(&[
                create_video_packet(0x100, None),
                create_video_packet(0x100, None),
                create_video_packet(0x100, None),
                create_video_packet(0x100, None),
            ]);

            let sig = SignatureExtractor::new()
                .extract(segment.path())
                .await
                .unwrap();
            assert!(sig.is_empty());
        });
    }

    #[test]
    fn test_extract_ignores_bad_crc() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut pat = create_pat_packet(0x1000);
            pat[18] ^= 0xFF; // corrupt the section CRC
            let segment = write_segment(&[
                pat,
                create_video_packet(0x100, None),
                create_video_packet(0x100, None),
                create_video_packet(0x100, None),
            ]);

            let sig = SignatureExtractor::new()
                .extract(segment.path())
                .await
                .unwrap();
            assert_eq!(sig.program_count, None);
        });
    }

    #[test]
    fn test_extract_fails_on_unalignable_file() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut f = tempfile::NamedTempFile::new().unwrap();
            f.write_all(&vec![0u8; TS_PACKET_SIZE * 6]).unwrap();
            f.flush().unwrap();

            assert!(SignatureExtractor::new().extract(f.path()).await.is_err());
        });
    }

    #[test]
    fn test_wildcard_compatibility() {
        let full = StreamSignature {
            program_count: Some(1),
            video_codec: Some(CodecId::H264),
            video_pid: Some(0x100),
            audio_codec: Some(CodecId::Aac),
            audio_pid: Some(0x101),
            resolution: Some((1280, 720)),
        };

        // Reflexive
        assert!(full.is_compatible(&full));

        // Absent fields never block
        let partial = StreamSignature {
            video_codec: Some(CodecId::H264),
            ..Default::default()
        };
        assert!(full.is_compatible(&partial));
        assert!(partial.is_compatible(&full));
        assert!(StreamSignature::default().is_compatible(&full));

        // Explicit mismatch always blocks
        let mut other = full.clone();
        other.resolution = Some((1920, 1088));
        assert!(!full.is_compatible(&other));

        let mut other = full.clone();
        other.video_codec = Some(CodecId::H265);
        assert!(!full.is_compatible(&other));
    }

    #[test]
    fn test_description_is_stable() {
        let sig = StreamSignature {
            program_count: Some(1),
            video_codec: Some(CodecId::H264),
            video_pid: Some(0x100),
            audio_codec: Some(CodecId::Aac),
            audio_pid: Some(0x101),
            resolution: Some((1280, 720)),
        };
        assert_eq!(
            sig.to_string(),
            "programs=1 video=h264@pid:256 audio=aac@pid:257 res=1280x720"
        );
        assert_eq!(
            StreamSignature::default().to_string(),
            "programs=? video=?@pid:? audio=?@pid:? res=?"
        );
    }
}
