//! Zero-copy reader for committed shard files.
//!
//! The file is memory-mapped; [`ShardReader::open`] checks magic, version,
//! header and footer, and walks every record once so a reader never hands out
//! data from a truncated or uncommitted shard.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use shardprep_common::{format_error, IoResultExt, PrepResult};

use crate::schema::{FieldType, FieldValue, Record, Schema};
use crate::writer::{ShardHeader, FOOTER_LEN, FOOTER_MAGIC, FORMAT_VERSION, MAGIC, PREAMBLE_LEN};

fn read_u32(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u64(buf: &[u8], pos: usize) -> Option<u64> {
    let bytes = buf.get(pos..pos.checked_add(8)?)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

/// Per-field prefix: dtype code + element count.
const FIELD_PREFIX_LEN: usize = 1 + 8;

/// A committed shard, opened for reading.
pub struct ShardReader {
    path: PathBuf,
    mmap: Mmap,
    header: ShardHeader,
    data_start: usize,
    data_end: usize,
    num_records: u64,
}

impl ShardReader {
    pub fn open(path: &Path) -> PrepResult<Self> {
        let file = File::open(path).with_path(path)?;
        let file_len = file.metadata().with_path(path)?.len() as usize;
        if file_len < PREAMBLE_LEN + FOOTER_LEN {
            return Err(format_error(path, "file too short to be a shard"));
        }
        let mmap = unsafe { Mmap::map(&file) }.with_path(path)?;

        if &mmap[0..4] != MAGIC {
            return Err(format_error(path, "bad magic"));
        }
        let version = read_u32(&mmap, 4).ok_or_else(|| format_error(path, "missing version"))?;
        if version != FORMAT_VERSION {
            return Err(format_error(path, format!("unsupported version {version}")));
        }
        let header_len =
            read_u32(&mmap, 8).ok_or_else(|| format_error(path, "missing header length"))? as usize;
        let data_start = PREAMBLE_LEN
            .checked_add(header_len)
            .ok_or_else(|| format_error(path, "header length overflow"))?;
        let data_end = mmap.len() - FOOTER_LEN;
        if data_start > data_end {
            return Err(format_error(path, "header runs past the footer"));
        }
        let header: ShardHeader = serde_json::from_slice(&mmap[PREAMBLE_LEN..data_start])
            .map_err(|e| format_error(path, format!("bad header: {e}")))?;

        if &mmap[data_end + 8..] != FOOTER_MAGIC {
            return Err(format_error(path, "missing footer; shard was never committed"));
        }
        let num_records =
            read_u64(&mmap, data_end).ok_or_else(|| format_error(path, "missing record count"))?;

        let reader = Self {
            path: path.to_path_buf(),
            mmap,
            header,
            data_start,
            data_end,
            num_records,
        };
        reader.verify()?;
        Ok(reader)
    }

    /// Walk every record and check the count and the end offset match the footer.
    fn verify(&self) -> PrepResult<()> {
        let mut pos = self.data_start;
        for _ in 0..self.num_records {
            let (_, next) = self.decode_at(pos)?;
            pos = next;
        }
        if pos != self.data_end {
            return Err(format_error(
                &self.path,
                format!("{} trailing bytes after {} records", self.data_end - pos, self.num_records),
            ));
        }
        Ok(())
    }

    fn decode_at(&self, mut pos: usize) -> PrepResult<(Record, usize)> {
        let data = &self.mmap[..self.data_end];
        let mut record = Record::new();
        for (name, spec) in self.header.schema.fields() {
            let code = *data
                .get(pos)
                .ok_or_else(|| format_error(&self.path, "record truncated"))?;
            let field_type = FieldType::from_code(code)
                .ok_or_else(|| format_error(&self.path, format!("unknown dtype {code}")))?;
            if field_type != spec.field_type {
                return Err(format_error(
                    &self.path,
                    format!("field '{name}' stored as {field_type:?}, schema says {:?}", spec.field_type),
                ));
            }
            let count = pos
                .checked_add(1)
                .and_then(|at| read_u64(data, at))
                .ok_or_else(|| format_error(&self.path, "record truncated"))?;
            let payload_start = pos
                .checked_add(FIELD_PREFIX_LEN)
                .ok_or_else(|| format_error(&self.path, "record truncated"))?;
            let payload_end = usize::try_from(count)
                .ok()
                .and_then(|n| n.checked_mul(field_type.width()))
                .and_then(|len| payload_start.checked_add(len))
                .ok_or_else(|| format_error(&self.path, "field length overflow"))?;
            let payload = data
                .get(payload_start..payload_end)
                .ok_or_else(|| format_error(&self.path, "record truncated"))?;
            record.insert(name.clone(), FieldValue::read_payload(field_type, payload));
            pos = payload_end;
        }
        Ok((record, pos))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ShardHeader {
        &self.header
    }

    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    pub fn len(&self) -> u64 {
        self.num_records
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// Iterate records in write order.
    pub fn records(&self) -> RecordIter<'_> {
        RecordIter {
            reader: self,
            pos: self.data_start,
            remaining: self.num_records,
        }
    }

    pub fn read_all(&self) -> PrepResult<Vec<Record>> {
        self.records().collect()
    }
}

pub struct RecordIter<'a> {
    reader: &'a ShardReader,
    pos: usize,
    remaining: u64,
}

impl Iterator for RecordIter<'_> {
    type Item = PrepResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.reader.decode_at(self.pos) {
            Ok((record, next)) => {
                self.pos = next;
                self.remaining -= 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}
