use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Larger length prefixes can only come from a corrupt header.
const MAX_FRAME_LEN: usize = 1 << 20;

/// Frame one event as `[u32 len][bincode payload][u32 crc32]`, little-endian.
fn encode_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Events recovered from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// A torn or corrupt tail was found and ignored.
    pub truncated: bool,
    /// Byte length of the intact prefix.
    pub valid_len: u64,
}

/// Append-only log of reservation events.
///
/// A crash mid-append leaves at most one partial frame at the end of the
/// file; replay stops at the first frame whose length, CRC or payload does
/// not check out.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Cut the file back to `len` bytes so new frames follow the last
    /// intact one instead of a torn tail.
    pub fn discard_tail(path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()
    }

    /// Buffer one event. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_frame(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a compacted log next to the live one and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::compact_tmp_path(path))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the live log and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read every intact frame. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            match read_frame_part(&mut reader, &mut len_buf)? {
                FramePart::Complete => {}
                FramePart::CleanEof => break,
                FramePart::Torn => {
                    replay.truncated = true;
                    break;
                }
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME_LEN {
                replay.truncated = true;
                break;
            }
            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if read_frame_part(&mut reader, &mut payload)? != FramePart::Complete
                || read_frame_part(&mut reader, &mut crc_buf)? != FramePart::Complete
                || u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload)
            {
                replay.truncated = true;
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => {
                    replay.events.push(event);
                    replay.valid_len += (len + 8) as u64;
                }
                Err(_) => {
                    replay.truncated = true;
                    break;
                }
            }
        }

        Ok(replay)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FramePart {
    Complete,
    /// End of file before any byte of this part.
    CleanEof,
    /// End of file partway through this part.
    Torn,
}

fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<FramePart> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(FramePart::CleanEof),
            Ok(0) => return Ok(FramePart::Torn),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(FramePart::Complete)
}
