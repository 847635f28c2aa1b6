use super::parser::TSPacketParser;
use super::types::*;
use crate::config;
use crate::error::{Result, TsMergeError};
use bytes::{Buf, BytesMut};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

const READ_CHUNK: usize = 64 * 1024;

/// One validated 188-byte packet pulled from a segment file.
#[derive(Debug)]
pub struct TSPacket {
    pub header: TSHeader,
    pub data: Vec<u8>,
}

/// Lazy, restartable iterator over the fixed 188-byte packets of a TS file.
///
/// Opening the scanner probes candidate alignment offsets 0..188 against
/// the head of the file and requires a minimum run of consecutive in-sync
/// packets; this both rejects non-TS files and skips leading garbage.
/// Iteration validates the sync byte of every packet at the chosen stride.
pub struct TSPacketScanner {
    path: PathBuf,
    file: File,
    parser: TSPacketParser,
    alignment: u64,
    buf: BytesMut,
    eof: bool,
    packets_read: u64,
}

impl TSPacketScanner {
    /// Opens the file and locks in a packet alignment.
    ///
    /// Fails with `MalformedStream` when no candidate offset yields the
    /// configured minimum run of consecutive sync bytes.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let mut file = File::open(&path).await?;

        let min_sync_run = config::get().min_sync_run.max(1);
        let mut probe = vec![0u8; TS_PACKET_SIZE * (min_sync_run + 1)];
        let mut filled = 0;
        while filled < probe.len() {
            let n = file.read(&mut probe[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        probe.truncate(filled);

        let alignment = find_alignment(&probe, min_sync_run)
            .ok_or_else(|| TsMergeError::malformed(&path, "no packet sync alignment found"))?
            as u64;

        file.seek(SeekFrom::Start(alignment)).await?;

        Ok(Self {
            path,
            file,
            parser: TSPacketParser::new(),
            alignment,
            buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
            packets_read: 0,
        })
    }

    /// Byte offset of the first packet, i.e. the length of leading garbage.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Packets returned since open or the last restart.
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Rewinds to the first packet without re-probing the alignment.
    pub async fn restart(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.alignment)).await?;
        self.buf.clear();
        self.eof = false;
        self.packets_read = 0;
        Ok(())
    }

    /// Returns the next packet, or `None` at a clean end of file.
    ///
    /// A file that ends mid-packet or loses sync mid-stream fails with
    /// `MalformedStream`.
    pub async fn next_packet(&mut self) -> Result<Option<TSPacket>> {
        while self.buf.len() < TS_PACKET_SIZE && !self.eof {
            let mut chunk = vec![0u8; READ_CHUNK];
            let n = self.file.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }

        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.len() < TS_PACKET_SIZE {
            return Err(TsMergeError::malformed(
                &self.path,
                format!("file ends mid-packet ({} trailing bytes)", self.buf.len()),
            ));
        }

        let data = self.buf[..TS_PACKET_SIZE].to_vec();
        self.buf.advance(TS_PACKET_SIZE);

        let header = self.parser.parse_header(&data).map_err(|_| {
            TsMergeError::malformed(
                &self.path,
                format!("sync lost at packet {}", self.packets_read),
            )
        })?;
        self.packets_read += 1;

        Ok(Some(TSPacket { header, data }))
    }
}

/// Finds the smallest offset in 0..188 at which every stride position
/// within `data` carries the sync byte, requiring at least `min_run`
/// consecutive packets (or as many as the probe window holds).
fn find_alignment(data: &[u8], min_run: usize) -> Option<usize> {
    if data.is_empty() {
        return None;
    }

    'candidate: for offset in 0..TS_PACKET_SIZE.min(data.len()) {
        let available = (data.len() - offset).div_ceil(TS_PACKET_SIZE);
        if available == 0 {
            continue;
        }
        let needed = min_run.min(available);

        let mut pos = offset;
        let mut run = 0;
        while pos < data.len() && run < needed {
            if data[pos] != TS_SYNC_BYTE {
                continue 'candidate;
            }
            run += 1;
            pos += TS_PACKET_SIZE;
        }
        if run >= needed {
            return Some(offset);
        }
    }

    None
}

/// Structural whole-file check: the detected packet alignment must hold
/// to the end of the file with no trailing partial packet.
///
/// Usable standalone before admitting a file into a group or job, and as
/// the post-merge validity pass.
pub async fn is_ts_file_valid<P: AsRef<Path>>(path: P) -> bool {
    let mut scanner = match TSPacketScanner::open(path).await {
        Ok(s) => s,
        Err(_) => return false,
    };

    loop {
        match scanner.next_packet().await {
            Ok(Some(_)) => {}
            Ok(None) => return scanner.packets_read() > 0,
            Err(_) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::runtime::Runtime;

    fn packet(pid: u16) -> Vec<u8> {
        let mut p = vec![0xFFu8; TS_PACKET_SIZE];
        p[0] = TS_SYNC_BYTE;
        p[1] = ((pid >> 8) & 0x1F) as u8;
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10;
        p
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_scan_aligned_file() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut data = Vec::new();
            for _ in 0..6 {
                data.extend_from_slice(&packet(0x100));
            }
            let f = write_temp(&data);

            let mut scanner = TSPacketScanner::open(f.path()).await.unwrap();
            assert_eq!(scanner.alignment(), 0);

            let mut count = 0;
            while let Some(pkt) = scanner.next_packet().await.unwrap() {
                assert_eq!(pkt.header.pid, 0x100);
                count += 1;
            }
            assert_eq!(count, 6);
        });
    }

    #[test]
    fn test_scan_skips_leading_garbage() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut data = vec![0xAB, 0xCD, 0xEF]; // not a sync pattern
            for _ in 0..6 {
                data.extend_from_slice(&packet(0x42));
            }
            let f = write_temp(&data);

            let scanner = TSPacketScanner::open(f.path()).await.unwrap();
            assert_eq!(scanner.alignment(), 3);
        });
    }

    #[test]
    fn test_scan_rejects_non_ts() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let data = vec![0x00u8; TS_PACKET_SIZE * 6];
            let f = write_temp(&data);
            assert!(TSPacketScanner::open(f.path()).await.is_err());
        });
    }

    #[test]
    fn test_restart_rewinds_to_first_packet() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut data = Vec::new();
            for _ in 0..5 {
                data.extend_from_slice(&packet(0x10));
            }
            let f = write_temp(&data);

            let mut scanner = TSPacketScanner::open(f.path()).await.unwrap();
            scanner.next_packet().await.unwrap();
            scanner.next_packet().await.unwrap();
            scanner.restart().await.unwrap();

            let mut count = 0;
            while scanner.next_packet().await.unwrap().is_some() {
                count += 1;
            }
            assert_eq!(count, 5);
        });
    }

    #[test]
    fn test_is_ts_file_valid() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut data = Vec::new();
            for _ in 0..6 {
                data.extend_from_slice(&packet(0x100));
            }
            let good = write_temp(&data);
            assert!(is_ts_file_valid(good.path()).await);

            // Truncated mid-packet
            let truncated = write_temp(&data[..data.len() - 100]);
            assert!(!is_ts_file_valid(truncated.path()).await);

            // Empty
            let empty = write_temp(&[]);
            assert!(!is_ts_file_valid(empty.path()).await);
        });
    }
}
