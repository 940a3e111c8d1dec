//!
//! Signing-key material validation
//! -------------------------------
//! Decodes an untrusted `"<tag> <base64>"` submission into structured key
//! material. The only supported tag is `openpgp`; the decoded bytes must be
//! one structurally valid v4 RSA public-key packet. Every decode stage has
//! its own failure class so callers can report precisely what was wrong,
//! and the parser never panics on arbitrary input.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha384};
use thiserror::Error;

/// Failure classes, ordered by decode stage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("public key is empty or not text")]
    InvalidFormat,
    #[error("unsupported public key type, expected 'openpgp'")]
    UnsupportedKeyType,
    #[error("public key body is not valid base64")]
    InvalidEncoding,
    #[error("public key bytes are not a valid public key packet: {0}")]
    InvalidStructure(String),
}

impl KeyDecodeError {
    /// Envelope subcode, reported under error code `error-decode-key`.
    pub fn subcode(&self) -> &'static str {
        match self {
            KeyDecodeError::InvalidFormat => "invalid-format",
            KeyDecodeError::UnsupportedKeyType => "unsupported-type",
            KeyDecodeError::InvalidEncoding => "invalid-encoding",
            KeyDecodeError::InvalidStructure(_) => "invalid-structure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    OpenPgp,
}

/// A validated public key. Only produced by `decode_public_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key_type: KeyType,
    /// Decoded public-key packet bytes.
    pub bytes: Vec<u8>,
    /// base64url (no padding) of the SHA-384 digest of the packet bytes.
    pub key_id: String,
}

// RFC 4880 values for the one packet shape we accept.
const TAG_PUBLIC_KEY: u8 = 6;
const VERSION_V4: u8 = 4;
const ALGO_RSA: u8 = 1;

pub fn decode_public_key(raw: &[u8]) -> Result<KeyMaterial, KeyDecodeError> {
    if raw.is_empty() {
        return Err(KeyDecodeError::InvalidFormat);
    }
    let text = std::str::from_utf8(raw).map_err(|_| KeyDecodeError::InvalidFormat)?;
    let Some((tag, body)) = text.split_once(char::is_whitespace) else {
        return Err(KeyDecodeError::UnsupportedKeyType);
    };
    if tag != "openpgp" {
        return Err(KeyDecodeError::UnsupportedKeyType);
    }
    let bytes = STANDARD.decode(body).map_err(|_| KeyDecodeError::InvalidEncoding)?;
    parse_public_key_packet(&bytes)?;
    let key_id = URL_SAFE_NO_PAD.encode(Sha384::digest(&bytes));
    Ok(KeyMaterial { key_type: KeyType::OpenPgp, bytes, key_id })
}

fn structure(msg: impl Into<String>) -> KeyDecodeError {
    KeyDecodeError::InvalidStructure(msg.into())
}

/// Bounds-checked reader over the untrusted packet bytes.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], KeyDecodeError> {
        let end = self.pos.checked_add(n).ok_or_else(|| structure("length overflow"))?;
        if end > self.buf.len() {
            return Err(structure(format!("truncated {}", what)));
        }
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self, what: &str) -> Result<u8, KeyDecodeError> {
        Ok(self.take(1, what)?[0])
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

fn parse_public_key_packet(data: &[u8]) -> Result<(), KeyDecodeError> {
    let mut cur = Cursor::new(data);
    let b0 = cur.u8("packet header")?;
    if b0 & 0x80 == 0 {
        return Err(structure("first byte is not a packet header"));
    }
    let (tag, len) = if b0 & 0x40 != 0 {
        // New-format header
        let tag = b0 & 0x3f;
        let l0 = cur.u8("packet length")? as usize;
        let len = match l0 {
            0..=191 => l0,
            192..=223 => {
                let l1 = cur.u8("packet length")? as usize;
                ((l0 - 192) << 8) + l1 + 192
            }
            255 => {
                let b = cur.take(4, "packet length")?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
            }
            // Partial body lengths make no sense for a key packet
            _ => return Err(structure("partial packet length is not supported")),
        };
        (tag, len)
    } else {
        // Old-format header
        let tag = (b0 >> 2) & 0x0f;
        let len = match b0 & 0x03 {
            0 => cur.u8("packet length")? as usize,
            1 => {
                let b = cur.take(2, "packet length")?;
                u16::from_be_bytes([b[0], b[1]]) as usize
            }
            2 => {
                let b = cur.take(4, "packet length")?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
            }
            // Indeterminate length: body runs to the end of the input
            _ => cur.remaining(),
        };
        (tag, len)
    };
    if tag != TAG_PUBLIC_KEY {
        return Err(structure(format!("packet tag {} is not a public key", tag)));
    }
    let body = cur.take(len, "packet body")?;
    if cur.remaining() != 0 {
        return Err(structure("trailing bytes after the public key packet"));
    }
    parse_v4_rsa_body(body)
}

fn parse_v4_rsa_body(body: &[u8]) -> Result<(), KeyDecodeError> {
    let mut cur = Cursor::new(body);
    let version = cur.u8("key version")?;
    if version != VERSION_V4 {
        return Err(structure(format!("unsupported key version {}", version)));
    }
    cur.take(4, "creation time")?;
    let algo = cur.u8("key algorithm")?;
    if algo != ALGO_RSA {
        return Err(structure(format!("unsupported key algorithm {}", algo)));
    }
    let n = read_mpi(&mut cur, "modulus")?;
    if n.is_empty() {
        return Err(structure("empty modulus"));
    }
    let e = read_mpi(&mut cur, "public exponent")?;
    if e.is_empty() || e.len() > 8 {
        return Err(structure("implausible public exponent"));
    }
    if cur.remaining() != 0 {
        return Err(structure("trailing bytes after key material"));
    }
    Ok(())
}

fn read_mpi<'a>(cur: &mut Cursor<'a>, what: &str) -> Result<&'a [u8], KeyDecodeError> {
    let b = cur.take(2, what)?;
    let bits = u16::from_be_bytes([b[0], b[1]]) as usize;
    cur.take(bits.div_ceil(8), what)
}
