//! Bounds-checked big-endian reads over a byte slice.
//!
//! Every multi-byte field in the title formats is big-endian. Reads past the
//! end of the slice are reported as a format error against the structure
//! being parsed, never as a panic.

use crate::error::{ErrorKind, Result, Structure};

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    structure: Structure,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], structure: Structure) -> Self {
        Self { data, pos: 0, structure }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize, structure: Structure) -> Result<Self> {
        let mut reader = Self::new(data, structure);
        reader.seek(pos)?;
        Ok(reader)
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            exn::bail!(self.truncated(pos.saturating_sub(self.pos)));
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            exn::bail!(self.truncated(len));
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.bytes(N)?);
        Ok(array)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn be_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn be_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn truncated(&self, needed: usize) -> ErrorKind {
        let reason = format!(
            "needed {needed} bytes at offset {:#x}, but the buffer is only {:#x} bytes long",
            self.pos,
            self.data.len()
        );
        match self.structure {
            Structure::Manifest => ErrorKind::manifest(reason),
            Structure::Ticket => ErrorKind::ticket(reason),
            Structure::DirectoryTable => ErrorKind::directory(reason),
        }
    }
}

/// Read a NUL-terminated string starting at `offset`. The terminator is
/// required; a string running off the end of `data` yields `None`.
pub(crate) fn null_terminated(data: &[u8], offset: usize) -> Option<&[u8]> {
    let tail = data.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    Some(&tail[..end])
}

/// Decode a fixed-width, NUL-padded text field such as an issuer.
pub(crate) fn fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
