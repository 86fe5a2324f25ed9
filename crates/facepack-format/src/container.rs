//! Container encoding and bounds-checked decoding.

use crate::error::FormatError;
use crate::{FORMAT_VERSION, LENGTH_WIDTH, MAGIC};

/// One `(type, payload)` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Component type name as written on the wire (e.g. "Image", "Text").
    pub kind: String,
    /// Encoded payload; its interpretation depends on `kind`.
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(kind: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// A decoded (or to-be-encoded) container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Project name.
    pub name: String,
    /// Records in file order.
    pub records: Vec<Record>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }

    /// Append a record, keeping insertion order.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Exact encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        let header = MAGIC.len() + LENGTH_WIDTH * 3 + self.name.len();
        let records: usize = self
            .records
            .iter()
            .map(|r| LENGTH_WIDTH * 2 + r.kind.len() + r.payload.len())
            .sum();
        header + records
    }

    /// Encode the container into a fresh buffer.
    ///
    /// Every length prefix is computed from the blob that follows it, so a
    /// reader can skip any record without decoding its payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        write_blob(&mut out, "name", self.name.as_bytes())?;
        write_len(&mut out, "component count", self.records.len())?;
        for record in &self.records {
            write_blob(&mut out, "component type", record.kind.as_bytes())?;
            write_blob(&mut out, "component payload", &record.payload)?;
        }
        Ok(out)
    }

    /// Decode a container, rejecting any length that runs past the input.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = Reader::new(bytes);

        let magic = reader.take("magic", MAGIC.len())?;
        if magic != MAGIC {
            return Err(FormatError::BadMagic {
                expected: MAGIC,
                found: magic.to_vec(),
            });
        }

        let version = reader.u32("version")?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let name = reader.string("name")?;
        let count = reader.u32("component count")? as usize;

        // Each record needs at least its two length prefixes.
        let min_record = LENGTH_WIDTH * 2;
        if count.saturating_mul(min_record) > reader.remaining() {
            return Err(FormatError::Truncated {
                field: "components",
                offset: reader.pos,
                needed: count.saturating_mul(min_record),
                remaining: reader.remaining(),
            });
        }

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let kind = reader.string("component type")?;
            let payload = reader.blob("component payload")?.to_vec();
            records.push(Record { kind, payload });
        }

        if reader.remaining() > 0 {
            return Err(FormatError::TrailingBytes(reader.remaining()));
        }

        Ok(Self { name, records })
    }
}

fn write_len(out: &mut Vec<u8>, field: &'static str, len: usize) -> Result<(), FormatError> {
    let len32 = u32::try_from(len).map_err(|_| FormatError::LengthOverflow { field, len })?;
    out.extend_from_slice(&len32.to_le_bytes());
    Ok(())
}

fn write_blob(out: &mut Vec<u8>, field: &'static str, blob: &[u8]) -> Result<(), FormatError> {
    write_len(out, field, blob.len())?;
    out.extend_from_slice(blob);
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], FormatError> {
        if n > self.remaining() {
            return Err(FormatError::Truncated {
                field,
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, FormatError> {
        let raw = self.take(field, LENGTH_WIDTH)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn blob(&mut self, field: &'static str) -> Result<&'a [u8], FormatError> {
        let len = self.u32(field)? as usize;
        self.take(field, len)
    }

    fn string(&mut self, field: &'static str) -> Result<String, FormatError> {
        let offset = self.pos;
        let raw = self.blob(field)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| FormatError::InvalidUtf8 { field, offset })
    }
}
