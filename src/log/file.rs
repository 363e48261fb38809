//! File-backed log store
//!
//! A single append-only file. Every record is framed as
//! `[length: u32][checksum: u32][bincode(DataElement)]`, little endian.
//! The whole log is also indexed in memory so reads never touch the disk.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::entry::{DataElement, SeqNum};
use super::LogStore;
use crate::error::{Error, Result};

/// Magic bytes at the start of the log file
const LOG_MAGIC: &[u8; 8] = b"REPLOGV1";

/// Log file format version
const LOG_VERSION: u32 = 1;

/// File header size in bytes
const HEADER_SIZE: usize = 16;

/// Record header size in bytes
const RECORD_HEADER_SIZE: usize = 8;

struct FileState {
    file: File,
    write_pos: u64,
    last: SeqNum,
    entries: BTreeMap<SeqNum, DataElement>,
}

/// Durable append-only log
pub struct FileLog {
    path: PathBuf,
    fsync: bool,
    state: Mutex<FileState>,
}

impl FileLog {
    /// Open (or create) the log file at `path`, replaying existing records.
    ///
    /// A torn or corrupt record at the tail is treated as an interrupted
    /// append and truncated away. Records that are intact but out of
    /// sequence mean the file was tampered with and fail the open.
    pub fn open(path: &Path, fsync: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let len = file.metadata()?.len();
        let state = if len == 0 {
            file.write_all(&header_bytes())?;
            file.sync_all()?;
            FileState {
                file,
                write_pos: HEADER_SIZE as u64,
                last: 0,
                entries: BTreeMap::new(),
            }
        } else {
            Self::replay(file)?
        };

        tracing::info!(
            "Opened log file {:?} with {} entries (last sequence {})",
            path,
            state.entries.len(),
            state.last
        );

        Ok(Self {
            path: path.to_path_buf(),
            fsync,
            state: Mutex::new(state),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(mut file: File) -> Result<FileState> {
        let mut contents = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut contents)?;

        if contents.len() < HEADER_SIZE || &contents[0..8] != LOG_MAGIC {
            return Err(Error::LogCorrupted {
                offset: 0,
                reason: "invalid log file header".into(),
            });
        }
        let version = u32::from_le_bytes([contents[8], contents[9], contents[10], contents[11]]);
        if version != LOG_VERSION {
            return Err(Error::LogCorrupted {
                offset: 8,
                reason: format!("unsupported log version {}", version),
            });
        }

        let mut pos = HEADER_SIZE;
        let mut last: SeqNum = 0;
        let mut entries = BTreeMap::new();

        while pos < contents.len() {
            let Some((element, record_len)) = decode_record(&contents[pos..]) else {
                if intact_record_follows(&contents[pos..]) {
                    return Err(Error::LogCorrupted {
                        offset: pos as u64,
                        reason: "damaged record followed by intact records".into(),
                    });
                }
                tracing::warn!(
                    "Truncating {} trailing bytes of incomplete log record at offset {}",
                    contents.len() - pos,
                    pos
                );
                break;
            };

            if element.sequence_number != last + 1 {
                return Err(Error::LogCorrupted {
                    offset: pos as u64,
                    reason: format!(
                        "expected sequence {}, found {}",
                        last + 1,
                        element.sequence_number
                    ),
                });
            }

            last = element.sequence_number;
            entries.insert(last, element);
            pos += record_len;
        }

        if pos < contents.len() {
            file.set_len(pos as u64)?;
            file.sync_all()?;
        }

        Ok(FileState {
            file,
            write_pos: pos as u64,
            last,
            entries,
        })
    }
}

fn header_bytes() -> [u8; HEADER_SIZE] {
    let mut bytes = [0u8; HEADER_SIZE];
    bytes[0..8].copy_from_slice(LOG_MAGIC);
    bytes[8..12].copy_from_slice(&LOG_VERSION.to_le_bytes());
    bytes
}

/// Decode one record from the start of `buf`. Returns `None` when the
/// record is incomplete or fails its checksum.
fn decode_record(buf: &[u8]) -> Option<(DataElement, usize)> {
    if buf.len() < RECORD_HEADER_SIZE {
        return None;
    }
    let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let checksum = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let body = buf.get(RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + length)?;
    if crc32fast::hash(body) != checksum {
        return None;
    }
    let element = bincode::deserialize(body).ok()?;
    Some((element, RECORD_HEADER_SIZE + length))
}

/// Whether an intact record starts anywhere after the damaged record at
/// the start of `buf`. Only a damaged tail may be truncated.
fn intact_record_follows(buf: &[u8]) -> bool {
    // Body damage leaves the length intact, so try the declared boundary first
    if buf.len() >= RECORD_HEADER_SIZE {
        let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if let Some(rest) = buf.get(RECORD_HEADER_SIZE + length..) {
            if !rest.is_empty() && decode_record(rest).is_some() {
                return true;
            }
        }
    }
    (1..buf.len()).any(|offset| decode_record(&buf[offset..]).is_some())
}

fn encode_record(element: &DataElement) -> Result<Vec<u8>> {
    let body = bincode::serialize(element)?;
    let length = u32::try_from(body.len()).map_err(|_| {
        Error::InvalidArgument(format!("payload too large: {} bytes", body.len()))
    })?;

    let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + body.len());
    record.extend_from_slice(&length.to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    record.extend_from_slice(&body);
    Ok(record)
}

fn write_record(file: &mut File, pos: u64, record: &[u8], fsync: bool) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(pos))?;
    file.write_all(record)?;
    if fsync {
        file.sync_data()?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl LogStore for FileLog {
    async fn append(&self, payload: &str) -> Result<SeqNum> {
        let mut state = self.state.lock().await;
        let seq = state.last + 1;
        let element = DataElement::new(payload, seq);
        let record = encode_record(&element)?;

        let write_pos = state.write_pos;
        if let Err(e) = write_record(&mut state.file, write_pos, &record, self.fsync) {
            // Drop whatever part of the record made it to disk so the next
            // append starts on a clean boundary.
            if let Err(truncate_err) = state.file.set_len(write_pos) {
                tracing::warn!(
                    "Failed to truncate {:?} back to offset {} after a failed append: {}",
                    self.path,
                    write_pos,
                    truncate_err
                );
            }
            return Err(Error::Storage(format!(
                "failed to append sequence {} to {:?}: {}",
                seq, self.path, e
            )));
        }

        state.write_pos += record.len() as u64;
        state.last = seq;
        state.entries.insert(seq, element);
        Ok(seq)
    }

    async fn entries_from(&self, from: SeqNum) -> Vec<DataElement> {
        let state = self.state.lock().await;
        state.entries.range(from..).map(|(_, e)| e.clone()).collect()
    }

    async fn last_sequence(&self) -> SeqNum {
        self.state.lock().await.last
    }
}
