use std::fmt;

// Constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_SYNC_BYTE: u8 = 0x47;

// PIDs
pub const PID_PAT: u16 = 0x0000;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_AAC: u8 = 0x0f;
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_AC3: u8 = 0x81;

#[derive(Debug, Clone)]
pub struct PATEntry {
    pub program_number: u16,
    pub network_pid: u16,
    pub program_map_pid: u16,
}

#[derive(Debug, Clone, Default)]
pub struct PAT {
    pub entries: Vec<PATEntry>,
}

impl PAT {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Program entries only, network PIDs excluded.
    pub fn program_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.program_number != 0)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct PMT {
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

impl PMT {
    pub fn new() -> Self {
        Self {
            pcr_pid: 0,
            program_descriptors: Vec::new(),
            elementary_stream_infos: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct TSHeader {
    pub sync_byte: u8, // Always 0x47
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

/// Codec identity derived from a PMT stream_type byte.
///
/// Only the identities relevant to signature comparison are named;
/// everything else is carried through as `Other` so that two segments
/// with the same unknown stream_type still compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    H264,
    H265,
    Aac,
    Mpeg1Audio,
    Mpeg2Audio,
    Ac3,
    Other(u8),
}

impl CodecId {
    pub fn from_stream_type(stream_type: u8) -> Self {
        match stream_type {
            STREAM_TYPE_H264 => CodecId::H264,
            STREAM_TYPE_H265 => CodecId::H265,
            STREAM_TYPE_AAC => CodecId::Aac,
            STREAM_TYPE_MPEG1_AUDIO => CodecId::Mpeg1Audio,
            STREAM_TYPE_MPEG2_AUDIO => CodecId::Mpeg2Audio,
            STREAM_TYPE_AC3 => CodecId::Ac3,
            other => CodecId::Other(other),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, CodecId::H264 | CodecId::H265)
    }

    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            CodecId::Aac | CodecId::Mpeg1Audio | CodecId::Mpeg2Audio | CodecId::Ac3
        )
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecId::H264 => write!(f, "h264"),
            CodecId::H265 => write!(f, "h265"),
            CodecId::Aac => write!(f, "aac"),
            CodecId::Mpeg1Audio => write!(f, "mp1a"),
            CodecId::Mpeg2Audio => write!(f, "mp2a"),
            CodecId::Ac3 => write!(f, "ac3"),
            CodecId::Other(t) => write!(f, "type_0x{:02x}", t),
        }
    }
}
