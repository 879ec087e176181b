//! Snapshot serializer contract.
//!
//! A snapshot is a header (4-byte magic, 1-byte version) followed by named
//! sections in a fixed order. Each section is a tagged byte blob holding
//! named fields, also in a fixed order:
//!
//! ```text
//! section := name_len:u8 name:[u8] blob_len:u32le blob:[u8]
//! field   := name_len:u8 name:[u8] value_len:u32le value:[u8]
//! ```
//!
//! Readers ask for sections and fields by name, in the order the writer
//! produced them. Any missing, extra, renamed, reordered or resized entry is
//! a format mismatch and fails the restore.

use thiserror::Error;

/// Errors raised while reading a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("not a snapshot: bad magic")]
    BadMagic,
    #[error("unsupported snapshot version {found} (expected {expected})")]
    Version { expected: u8, found: u8 },
    #[error("snapshot truncated")]
    Truncated,
    #[error("missing section `{0}`")]
    MissingSection(String),
    #[error("expected section `{expected}`, found `{found}`")]
    SectionOrder { expected: String, found: String },
    #[error("unexpected trailing section `{0}`")]
    ExtraSection(String),
    #[error("section `{section}`: missing field `{field}`")]
    MissingField { section: String, field: String },
    #[error("section `{section}`: expected field `{expected}`, found `{found}`")]
    FieldOrder { section: String, expected: String, found: String },
    #[error("section `{section}`: field `{field}` is {found} bytes, expected {expected}")]
    FieldSize { section: String, field: String, expected: usize, found: usize },
    #[error("section `{section}`: unexpected field `{field}`")]
    ExtraField { section: String, field: String },
    #[error("section `{section}`: invalid value for `{field}`")]
    InvalidValue { section: String, field: String },
    #[error("snapshot is for `{found}`, this machine is `{expected}`")]
    MachineMismatch { expected: String, found: String },
}

/// A component with an ordered save/restore routine.
///
/// `save_state` and `load_state` must visit the same fields in the same
/// order. Restoring must reproduce subsequent execution bit-for-bit.
pub trait SaveState {
    fn save_state(&self, out: &mut SectionWriter);
    fn load_state(&mut self, src: &mut SectionReader<'_>) -> Result<(), SnapshotError>;
}

/// Builds a snapshot image section by section.
#[derive(Debug)]
pub struct StateWriter {
    data: Vec<u8>,
}

impl StateWriter {
    #[must_use]
    pub fn new(magic: [u8; 4], version: u8) -> Self {
        let mut data = Vec::with_capacity(0x2_0000);
        data.extend_from_slice(&magic);
        data.push(version);
        Self { data }
    }

    /// Append a section whose fields are produced by `fill`.
    pub fn section(&mut self, name: &str, fill: impl FnOnce(&mut SectionWriter)) {
        let mut section = SectionWriter { data: Vec::new() };
        fill(&mut section);
        put_entry(&mut self.data, name, &section.data);
    }

    /// Append a section holding one component's state.
    pub fn component(&mut self, name: &str, component: &impl SaveState) {
        self.section(name, |out| component.save_state(out));
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Field sink for one section.
#[derive(Debug)]
pub struct SectionWriter {
    data: Vec<u8>,
}

impl SectionWriter {
    pub fn bytes(&mut self, name: &str, value: &[u8]) {
        put_entry(&mut self.data, name, value);
    }

    pub fn u8(&mut self, name: &str, value: u8) {
        self.bytes(name, &[value]);
    }

    pub fn bool(&mut self, name: &str, value: bool) {
        self.u8(name, u8::from(value));
    }

    pub fn u16(&mut self, name: &str, value: u16) {
        self.bytes(name, &value.to_le_bytes());
    }

    pub fn u32(&mut self, name: &str, value: u32) {
        self.bytes(name, &value.to_le_bytes());
    }

    pub fn u64(&mut self, name: &str, value: u64) {
        self.bytes(name, &value.to_le_bytes());
    }

    pub fn str(&mut self, name: &str, value: &str) {
        self.bytes(name, value.as_bytes());
    }
}

fn put_entry(out: &mut Vec<u8>, name: &str, value: &[u8]) {
    let name = name.as_bytes();
    debug_assert!(name.len() <= usize::from(u8::MAX));
    out.push(name.len() as u8);
    out.extend_from_slice(name);
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value);
}

/// Cursor over a tagged entry list (sections or fields).
#[derive(Debug, Clone, Copy)]
struct Entries<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Entries<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn next(&mut self) -> Result<(&'a str, &'a [u8]), SnapshotError> {
        let data = self.data;
        let rest = &data[self.pos..];
        let (&name_len, rest) = rest.split_first().ok_or(SnapshotError::Truncated)?;
        let name_len = usize::from(name_len);
        if rest.len() < name_len + 4 {
            return Err(SnapshotError::Truncated);
        }
        let name = std::str::from_utf8(&rest[..name_len]).map_err(|_| SnapshotError::Truncated)?;
        let len_bytes = [rest[name_len], rest[name_len + 1], rest[name_len + 2], rest[name_len + 3]];
        let len = u32::from_le_bytes(len_bytes) as usize;
        let body = rest.get(name_len + 4..name_len + 4 + len).ok_or(SnapshotError::Truncated)?;
        self.pos += 1 + name_len + 4 + len;
        Ok((name, body))
    }
}

/// Reads a snapshot image section by section.
#[derive(Debug)]
pub struct StateReader<'a> {
    entries: Entries<'a>,
}

impl<'a> StateReader<'a> {
    /// Validate the header and position at the first section.
    pub fn new(data: &'a [u8], magic: [u8; 4], version: u8) -> Result<Self, SnapshotError> {
        if data.len() < 5 {
            return Err(SnapshotError::Truncated);
        }
        if data[..4] != magic {
            return Err(SnapshotError::BadMagic);
        }
        if data[4] != version {
            return Err(SnapshotError::Version { expected: version, found: data[4] });
        }
        Ok(Self { entries: Entries { data: &data[5..], pos: 0 } })
    }

    /// Open the next section, which must be called `name`.
    pub fn section(&mut self, name: &str) -> Result<SectionReader<'a>, SnapshotError> {
        if self.entries.at_end() {
            return Err(SnapshotError::MissingSection(name.to_string()));
        }
        let (found, blob) = self.entries.next()?;
        if found != name {
            return Err(SnapshotError::SectionOrder {
                expected: name.to_string(),
                found: found.to_string(),
            });
        }
        Ok(SectionReader { section: found, entries: Entries { data: blob, pos: 0 } })
    }

    /// Read the next section into `component`, checking every field is consumed.
    pub fn component(&mut self, name: &str, component: &mut impl SaveState) -> Result<(), SnapshotError> {
        let mut section = self.section(name)?;
        component.load_state(&mut section)?;
        section.finish()
    }

    /// Fail if any section is left unread.
    pub fn finish(mut self) -> Result<(), SnapshotError> {
        if self.entries.at_end() {
            Ok(())
        } else {
            let (name, _) = self.entries.next()?;
            Err(SnapshotError::ExtraSection(name.to_string()))
        }
    }
}

/// Field source for one section.
#[derive(Debug)]
pub struct SectionReader<'a> {
    section: &'a str,
    entries: Entries<'a>,
}

impl<'a> SectionReader<'a> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.section
    }

    /// Next field, which must be called `name`. Any length is accepted.
    pub fn bytes(&mut self, name: &str) -> Result<&'a [u8], SnapshotError> {
        if self.entries.at_end() {
            return Err(SnapshotError::MissingField {
                section: self.section.to_string(),
                field: name.to_string(),
            });
        }
        let (found, value) = self.entries.next()?;
        if found != name {
            return Err(SnapshotError::FieldOrder {
                section: self.section.to_string(),
                expected: name.to_string(),
                found: found.to_string(),
            });
        }
        Ok(value)
    }

    /// Next field, which must be exactly `out.len()` bytes; copied into `out`.
    pub fn bytes_into(&mut self, name: &str, out: &mut [u8]) -> Result<(), SnapshotError> {
        let value = self.fixed(name, out.len())?;
        out.copy_from_slice(value);
        Ok(())
    }

    pub fn u8(&mut self, name: &str) -> Result<u8, SnapshotError> {
        Ok(self.fixed(name, 1)?[0])
    }

    pub fn bool(&mut self, name: &str) -> Result<bool, SnapshotError> {
        match self.u8(name)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(self.invalid(name)),
        }
    }

    pub fn u16(&mut self, name: &str) -> Result<u16, SnapshotError> {
        let v = self.fixed(name, 2)?;
        Ok(u16::from_le_bytes([v[0], v[1]]))
    }

    pub fn u32(&mut self, name: &str) -> Result<u32, SnapshotError> {
        let v = self.fixed(name, 4)?;
        Ok(u32::from_le_bytes([v[0], v[1], v[2], v[3]]))
    }

    pub fn u64(&mut self, name: &str) -> Result<u64, SnapshotError> {
        let v = self.fixed(name, 8)?;
        let mut raw = [0; 8];
        raw.copy_from_slice(v);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn str(&mut self, name: &str) -> Result<&'a str, SnapshotError> {
        let v = self.bytes(name)?;
        std::str::from_utf8(v).map_err(|_| self.invalid(name))
    }

    /// Error for a field whose value is out of range for its component.
    #[must_use]
    pub fn invalid(&self, field: &str) -> SnapshotError {
        SnapshotError::InvalidValue { section: self.section.to_string(), field: field.to_string() }
    }

    /// Fail if any field is left unread.
    pub fn finish(mut self) -> Result<(), SnapshotError> {
        if self.entries.at_end() {
            return Ok(());
        }
        let (field, _) = self.entries.next()?;
        Err(SnapshotError::ExtraField { section: self.section.to_string(), field: field.to_string() })
    }

    fn fixed(&mut self, name: &str, len: usize) -> Result<&'a [u8], SnapshotError> {
        let value = self.bytes(name)?;
        if value.len() == len {
            Ok(value)
        } else {
            Err(SnapshotError::FieldSize {
                section: self.section.to_string(),
                field: name.to_string(),
                expected: len,
                found: value.len(),
            })
        }
    }
}
