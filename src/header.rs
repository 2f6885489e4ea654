//! RFC 1952 §2.3 header and trailer encoding/decoding.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::BufMut;

use crate::crc::Crc32;
use crate::error::{Error, Result};

pub(crate) const MAGIC: [u8; 2] = [0x1f, 0x8b];
pub(crate) const CM_DEFLATE: u8 = 8;

const FHCRC: u8 = 1 << 1;
const FEXTRA: u8 = 1 << 2;
const FNAME: u8 = 1 << 3;
const FCOMMENT: u8 = 1 << 4;

/// The metadata carried by a GZIP member's header.
///
/// `name` and `comment` must be representable as ISO-8859-1 (Latin-1)
/// without an embedded NUL; see [`Header::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// The original file name, if any.
    pub name: Option<String>,
    /// A free-form comment, if any.
    pub comment: Option<String>,
    /// Arbitrary extra data (FEXTRA), if any. Must be shorter than 2^16 bytes.
    pub extra: Option<Vec<u8>>,
    /// Seconds since the Unix epoch, or 0 if unavailable.
    pub mod_time: u32,
    /// The originating OS byte (RFC 1952 §2.3.1). Defaults to 255
    /// ("unknown"), matching this crate's choice to keep output
    /// reproducible across build machines rather than reporting the build
    /// OS.
    pub os: u8,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            name: None,
            comment: None,
            extra: None,
            mod_time: 0,
            os: 255,
        }
    }
}

impl Header {
    /// Checks that `name`, `comment`, and `extra` all satisfy the RFC 1952
    /// representability constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_latin1(name)?;
        }
        if let Some(comment) = &self.comment {
            validate_latin1(comment)?;
        }
        if let Some(extra) = &self.extra {
            if extra.len() > u16::MAX as usize {
                return Err(Error::InvalidHeader(format!(
                    "extra field is {} bytes, limit is {}",
                    extra.len(),
                    u16::MAX
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn write_to<W: Write>(&self, w: &mut W, xfl: u8) -> io::Result<()> {
        let mut flg = 0u8;
        if self.extra.is_some() {
            flg |= FEXTRA;
        }
        if self.name.is_some() {
            flg |= FNAME;
        }
        if self.comment.is_some() {
            flg |= FCOMMENT;
        }
        flg |= FHCRC;

        let mut buf = Vec::with_capacity(10);
        buf.put_slice(&MAGIC);
        buf.put_u8(CM_DEFLATE);
        buf.put_u8(flg);
        buf.put_u32_le(self.mod_time);
        buf.put_u8(xfl);
        buf.put_u8(self.os);

        if let Some(extra) = &self.extra {
            buf.put_u16_le(extra.len() as u16);
            buf.put_slice(extra);
        }
        if let Some(name) = &self.name {
            buf.put_slice(&to_latin1_bytes(name));
            buf.put_u8(0);
        }
        if let Some(comment) = &self.comment {
            buf.put_slice(&to_latin1_bytes(comment));
            buf.put_u8(0);
        }

        let mut crc = Crc32::new();
        crc.update(&buf);
        let crc16 = crc.finalize() as u16;

        w.write_all(&buf)?;
        w.write_u16::<LittleEndian>(crc16)?;
        Ok(())
    }
}

fn validate_latin1(s: &str) -> Result<()> {
    for c in s.chars() {
        if c == '\0' {
            return Err(Error::InvalidHeader(
                "header string fields must not contain NUL".to_string(),
            ));
        }
        if c as u32 > 0xFF {
            return Err(Error::InvalidHeader(format!(
                "header string fields must be Latin-1, found {c:?}"
            )));
        }
    }
    Ok(())
}

fn to_latin1_bytes(s: &str) -> Vec<u8> {
    s.chars().map(|c| c as u32 as u8).collect()
}

fn from_latin1_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// XFL byte per RFC 1952 §2.3.1: 2 for best compression, 4 for fastest, 0
/// otherwise.
pub(crate) fn xfl_for_level(level: flate2::Compression) -> u8 {
    if level == flate2::Compression::best() {
        2
    } else if level == flate2::Compression::fast() {
        4
    } else {
        0
    }
}

/// Reads and validates one RFC 1952 header, consuming exactly its bytes
/// (including FEXTRA/FNAME/FCOMMENT/FHCRC) from `r`.
pub(crate) fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let mut crc = Crc32::new();

    let mut fixed = [0u8; 10];
    read_tracked(r, &mut fixed, &mut crc)?;

    if fixed[0] != MAGIC[0] || fixed[1] != MAGIC[1] {
        return Err(Error::InvalidHeader("bad magic number".to_string()));
    }
    if fixed[2] != CM_DEFLATE {
        return Err(Error::InvalidHeader(format!(
            "unsupported compression method: {}",
            fixed[2]
        )));
    }

    let flg = fixed[3];
    let mod_time = u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
    let os = fixed[9];

    let extra = if flg & FEXTRA != 0 {
        let mut len_buf = [0u8; 2];
        read_tracked(r, &mut len_buf, &mut crc)?;
        let len = u16::from_le_bytes(len_buf) as usize;
        let mut extra = vec![0u8; len];
        read_tracked(r, &mut extra, &mut crc)?;
        Some(extra)
    } else {
        None
    };

    let name = if flg & FNAME != 0 {
        Some(from_latin1_bytes(&read_cstring(r, &mut crc)?))
    } else {
        None
    };

    let comment = if flg & FCOMMENT != 0 {
        Some(from_latin1_bytes(&read_cstring(r, &mut crc)?))
    } else {
        None
    };

    if flg & FHCRC != 0 {
        let expected = crc.peek() as u16;
        let actual = r
            .read_u16::<LittleEndian>()
            .map_err(Error::source_read)?;
        if actual != expected {
            return Err(Error::InvalidHeader(
                "header CRC-16 (FHCRC) mismatch".to_string(),
            ));
        }
    }

    Ok(Header {
        name,
        comment,
        extra,
        mod_time,
        os,
    })
}

fn read_tracked<R: Read>(r: &mut R, buf: &mut [u8], crc: &mut Crc32) -> Result<()> {
    r.read_exact(buf).map_err(Error::source_read)?;
    crc.update(buf);
    Ok(())
}

fn read_cstring<R: Read>(r: &mut R, crc: &mut Crc32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte).map_err(Error::source_read)?;
        crc.update(&byte);
        if byte[0] == 0 {
            break;
        }
        out.push(byte[0]);
    }
    Ok(out)
}

/// Reads and validates the 8-byte `CRC32_LE || ISIZE_LE` trailer against the
/// accumulated checksum and byte count for the member just decompressed.
pub(crate) fn read_trailer<R: Read>(r: &mut R, crc: u32, isize_: u32) -> Result<()> {
    let expected_crc = r.read_u32::<LittleEndian>().map_err(Error::source_read)?;
    let expected_isize = r.read_u32::<LittleEndian>().map_err(Error::source_read)?;

    if expected_crc != crc {
        return Err(Error::InvalidChecksum(format!(
            "CRC-32 mismatch: stream says {expected_crc:#010x}, computed {crc:#010x}"
        )));
    }
    if expected_isize != isize_ {
        return Err(Error::InvalidChecksum(format!(
            "ISIZE mismatch: stream says {expected_isize}, computed {isize_}"
        )));
    }
    Ok(())
}
