//! Low-level binary codec for the rules container and signed payloads.
//!
//! The wire encoding is a tag-value stream: each field starts with a key
//! `(tag << 3) | wire_type`, followed by either a varint or a
//! length-prefixed byte run. Nested messages are length-prefixed. The codec
//! is strict about what it understands: a missing required field or a
//! truncated buffer is an error, while unknown tags in optional positions
//! are skipped by wire type so newer servers can add fields.
//!
//! [`Reader`] decodes, [`Writer`] encodes; the two round-trip without loss.
//! Message-level schemas live next to their types in [`crate::rules`] and
//! [`crate::envelope`].

use std::fmt;

/// Wire type of a field, encoded in the low three bits of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// Unsigned LEB128 integer.
    Varint,
    /// Eight fixed bytes.
    Fixed64,
    /// Length-prefixed bytes (strings, nested messages, raw bytes).
    Len,
    /// Four fixed bytes.
    Fixed32,
}

impl WireType {
    fn from_bits(bits: u64) -> Option<WireType> {
        match bits {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::Len),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    fn bits(self) -> u64 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::Len => 2,
            WireType::Fixed32 => 5,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::Len => "len",
            WireType::Fixed32 => "fixed32",
        };
        write!(f, "{name}")
    }
}

/// Decode failure for the binary wire format.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended inside a field.
    #[error("truncated input while reading {0}")]
    Truncated(&'static str),
    /// A field key or wire type did not match the schema.
    #[error("tag mismatch in {message}: {detail}")]
    TagMismatch {
        message: &'static str,
        detail: String,
    },
    /// An enumeration code is outside the known range for its type.
    #[error("bad enum code {code} for {what}")]
    BadEnum { what: &'static str, code: u64 },
    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    BadUtf8(&'static str),
}

impl CodecError {
    pub(crate) fn missing(message: &'static str, field: &'static str) -> CodecError {
        CodecError::TagMismatch {
            message,
            detail: format!("required field `{field}` absent"),
        }
    }

    pub(crate) fn unexpected(message: &'static str, tag: u32, wire: WireType) -> CodecError {
        CodecError::TagMismatch {
            message,
            detail: format!("tag {tag} carries unexpected wire type {wire}"),
        }
    }
}

/// Cursor over an immutable byte buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read a field key, returning `(tag, wire_type)`.
    pub fn read_key(&mut self, message: &'static str) -> Result<(u32, WireType), CodecError> {
        let key = self.read_varint(message)?;
        let wire = WireType::from_bits(key & 0x7).ok_or_else(|| CodecError::TagMismatch {
            message,
            detail: format!("reserved wire type {}", key & 0x7),
        })?;
        let tag = (key >> 3) as u32;
        if tag == 0 {
            return Err(CodecError::TagMismatch {
                message,
                detail: "field tag 0 is reserved".to_string(),
            });
        }
        Ok((tag, wire))
    }

    /// Read an unsigned LEB128 varint (at most ten bytes).
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, CodecError> {
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = self.next_byte(context)?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::TagMismatch {
            message: context,
            detail: "varint exceeds 64 bits".to_string(),
        })
    }

    /// Read a length-prefixed byte run, borrowing from the underlying buffer.
    pub fn read_bytes(&mut self, context: &'static str) -> Result<&'a [u8], CodecError> {
        let len = self.read_varint(context)? as usize;
        if self.buf.len() - self.pos < len {
            return Err(CodecError::Truncated(context));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self, context: &'static str) -> Result<String, CodecError> {
        let bytes = self.read_bytes(context)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::BadUtf8(context))
    }

    /// Skip over a field of the given wire type.
    pub fn skip(&mut self, wire: WireType, context: &'static str) -> Result<(), CodecError> {
        match wire {
            WireType::Varint => {
                self.read_varint(context)?;
            }
            WireType::Len => {
                self.read_bytes(context)?;
            }
            WireType::Fixed64 => self.advance(8, context)?,
            WireType::Fixed32 => self.advance(4, context)?,
        }
        Ok(())
    }

    fn next_byte(&mut self, context: &'static str) -> Result<u8, CodecError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(CodecError::Truncated(context))?;
        self.pos += 1;
        Ok(byte)
    }

    fn advance(&mut self, n: usize, context: &'static str) -> Result<(), CodecError> {
        if self.buf.len() - self.pos < n {
            return Err(CodecError::Truncated(context));
        }
        self.pos += n;
        Ok(())
    }
}

/// Append-only encoder producing the same stream [`Reader`] consumes.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn varint_field(&mut self, tag: u32, value: u64) -> &mut Self {
        self.key(tag, WireType::Varint);
        self.varint(value);
        self
    }

    pub fn bool_field(&mut self, tag: u32, value: bool) -> &mut Self {
        self.varint_field(tag, u64::from(value))
    }

    pub fn bytes_field(&mut self, tag: u32, bytes: &[u8]) -> &mut Self {
        self.key(tag, WireType::Len);
        self.varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn string_field(&mut self, tag: u32, value: &str) -> &mut Self {
        self.bytes_field(tag, value.as_bytes())
    }

    /// Encode a nested message built by `build` as a length-prefixed field.
    pub fn message_field(&mut self, tag: u32, build: impl FnOnce(&mut Writer)) -> &mut Self {
        let mut inner = Writer::new();
        build(&mut inner);
        self.bytes_field(tag, &inner.buf)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn key(&mut self, tag: u32, wire: WireType) {
        self.varint((u64::from(tag) << 3) | wire.bits());
    }

    fn varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }
}
