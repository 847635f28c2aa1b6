use super::types::*;
use crate::error::{Result, TsMergeError};

/// Stateless decoder for the fixed container-level structures of a TS
/// packet: header, adaptation field, and the PAT/PMT table bodies.
///
/// Payload (PES) data is never decoded here; the signature extractor only
/// needs the table structure to identify programs and elementary streams.
#[derive(Default)]
pub struct TSPacketParser;

impl TSPacketParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(TsMergeError::InvalidData("TS packet too short".into()));
        }

        if data[0] != TS_SYNC_BYTE {
            return Err(TsMergeError::InvalidData("invalid sync byte".into()));
        }

        Ok(TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Returns the byte offset of the packet payload, skipping the
    /// adaptation field when one is present.
    pub fn payload_offset(&self, data: &[u8], header: &TSHeader) -> Result<usize> {
        let mut offset = TS_HEADER_SIZE;
        if header.adaptation_field_exists {
            if data.len() < offset + 1 {
                return Err(TsMergeError::InvalidData(
                    "adaptation field length missing".into(),
                ));
            }
            let adaptation_field_length = data[offset] as usize;
            offset += 1 + adaptation_field_length;
            if offset > data.len() {
                return Err(TsMergeError::InvalidData(
                    "adaptation field too long".into(),
                ));
            }
        }
        Ok(offset)
    }

    pub fn parse_pat(&self, data: &[u8], offset: usize, length: usize) -> Result<PAT> {
        let mut pat = PAT::new();
        let mut pos = offset;
        let end = offset + length;

        if end > data.len() {
            return Err(TsMergeError::InvalidData("PAT body too short".into()));
        }

        while pos + 4 <= end {
            let program_number = ((data[pos] as u16) << 8) | data[pos + 1] as u16;
            let pid = (((data[pos + 2] & 0x1F) as u16) << 8) | data[pos + 3] as u16;
            pat.entries.push(PATEntry {
                program_number,
                network_pid: if program_number == 0 { pid } else { 0 },
                program_map_pid: if program_number != 0 { pid } else { 0 },
            });
            pos += 4;
        }

        Ok(pat)
    }

    pub fn parse_pmt(&self, data: &[u8], offset: usize, length: usize) -> Result<PMT> {
        let mut pmt = PMT::new();
        let mut pos = offset;
        let end = offset + length;

        if end > data.len() {
            return Err(TsMergeError::InvalidData("PMT body too short".into()));
        }

        if pos + 2 > end {
            return Err(TsMergeError::InvalidData("PMT too short for PCR PID".into()));
        }

        pmt.pcr_pid = ((data[pos] as u16 & 0x1F) << 8) | data[pos + 1] as u16;
        pos += 2;

        if pos + 2 > end {
            return Err(TsMergeError::InvalidData(
                "PMT too short for program info length".into(),
            ));
        }

        let program_info_length = ((data[pos] as usize & 0x0F) << 8) | data[pos + 1] as usize;
        pos += 2;

        if program_info_length > 0 {
            if pos + program_info_length > end {
                return Err(TsMergeError::InvalidData(
                    "program info data too short".into(),
                ));
            }
            pmt.program_descriptors =
                self.parse_descriptors(&data[pos..pos + program_info_length])?;
            pos += program_info_length;
        }

        while pos + 5 <= end {
            let stream_type = data[pos];
            let elementary_pid = ((data[pos + 1] as u16 & 0x1F) << 8) | data[pos + 2] as u16;
            let es_info_length = ((data[pos + 3] as usize & 0x0F) << 8) | data[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > end {
                return Err(TsMergeError::InvalidData("ES info data too short".into()));
            }

            let descriptors = self.parse_descriptors(&data[pos..pos + es_info_length])?;
            pos += es_info_length;

            pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(pmt)
    }

    fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(TsMergeError::InvalidData("descriptor data too short".into()));
            }

            descriptors.push(Descriptor {
                tag,
                data: data[pos..pos + length].to_vec(),
            });
            pos += length;
        }

        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ts_header() {
        let parser = TSPacketParser::new();
        let data = [
            0x47, // Sync byte
            0x40, // Payload unit start indicator set
            0x00, // PID (high bits)
            0x10, // Payload only, continuity counter 0
        ];

        let header = parser.parse_header(&data).unwrap();
        assert_eq!(header.sync_byte, 0x47);
        assert!(header.payload_unit_start);
        assert_eq!(header.pid, 0);
        assert!(header.contains_payload);
        assert!(!header.adaptation_field_exists);
    }

    #[test]
    fn test_parse_header_rejects_bad_sync() {
        let parser = TSPacketParser::new();
        let data = [0x48, 0x40, 0x00, 0x10];
        assert!(parser.parse_header(&data).is_err());
    }

    #[test]
    fn test_payload_offset_skips_adaptation_field() {
        let parser = TSPacketParser::new();
        let mut data = vec![0u8; TS_PACKET_SIZE];
        data[0] = 0x47;
        data[3] = 0x30; // adaptation field + payload
        data[4] = 7; // adaptation field length

        let header = parser.parse_header(&data).unwrap();
        let offset = parser.payload_offset(&data, &header).unwrap();
        assert_eq!(offset, TS_HEADER_SIZE + 1 + 7);
    }

    #[test]
    fn test_parse_pat() {
        let parser = TSPacketParser::new();
        let data = [
            0x00, 0x01, // Program number
            0x10, 0x00, // PID
            0x00, 0x02, // Program number
            0x20, 0x00, // PID
        ];

        let pat = parser.parse_pat(&data, 0, data.len()).unwrap();
        assert_eq!(pat.entries.len(), 2);
        assert_eq!(pat.entries[0].program_number, 1);
        assert_eq!(pat.entries[0].program_map_pid, 0x1000);
        assert_eq!(pat.entries[1].program_number, 2);
        assert_eq!(pat.entries[1].program_map_pid, 0x2000);
    }

    #[test]
    fn test_parse_pmt() {
        let parser = TSPacketParser::new();
        let data = [
            0xE1, 0x00, // PCR PID 0x100
            0xF0, 0x00, // program info length 0
            STREAM_TYPE_H264,
            0xE1,
            0x01, // elementary PID 0x101
            0xF0,
            0x00, // ES info length 0
            STREAM_TYPE_AAC,
            0xE1,
            0x02, // elementary PID 0x102
            0xF0,
            0x00,
        ];

        let pmt = parser.parse_pmt(&data, 0, data.len()).unwrap();
        assert_eq!(pmt.pcr_pid, 0x100);
        assert_eq!(pmt.elementary_stream_infos.len(), 2);
        assert_eq!(pmt.elementary_stream_infos[0].stream_type, STREAM_TYPE_H264);
        assert_eq!(pmt.elementary_stream_infos[0].elementary_pid, 0x101);
        assert_eq!(pmt.elementary_stream_infos[1].stream_type, STREAM_TYPE_AAC);
    }
}
