//! Session key codec
//!
//! Two byte forms of a [`Windowed`] key:
//!
//! ```text
//! changelog form: [raw key][8 bytes: end BE][8 bytes: start BE]
//! ordered form:   [escaped raw key][0x00 0x01][8 bytes: !end BE][8 bytes: !start BE]
//! ```
//!
//! The changelog form is what log records carry and must stay bit-for-bit
//! stable. The ordered form sorts byte-lexicographically in store scan order
//! (raw key ascending, end descending, start descending), so stores can serve
//! fetches and session lookups as plain range scans. In the ordered form a
//! `0x00` inside the raw key is written as `0x00 0xFF`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{StoreError, StoreResult};
use crate::window::{SessionWindow, Windowed};

/// Largest raw key either form accepts (what a 16-bit length field addresses)
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Size of one encoded timestamp
pub const TIMESTAMP_SIZE: usize = 8;

/// Size of the `end, start` trailer
pub const SUFFIX_SIZE: usize = 2 * TIMESTAMP_SIZE;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Encoder/decoder for session store keys
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionKeySchema;

impl SessionKeySchema {
    /// Encode a windowed key into changelog form
    pub fn to_binary(key: &Windowed) -> StoreResult<Bytes> {
        let window = key.window();
        Self::to_binary_parts(key.key(), window.start(), window.end())
    }

    /// Encode raw parts into changelog form
    pub fn to_binary_parts(raw: &[u8], start: i64, end: i64) -> StoreResult<Bytes> {
        check_key_len(raw)?;
        let mut buf = BytesMut::with_capacity(raw.len() + SUFFIX_SIZE);
        buf.put_slice(raw);
        buf.put_i64(end);
        buf.put_i64(start);
        Ok(buf.freeze())
    }

    /// Decode a changelog-form key
    pub fn from_binary(bytes: &[u8]) -> StoreResult<Windowed> {
        let key_len = binary_key_len(bytes)?;
        let end = read_i64(&bytes[key_len..]);
        let start = read_i64(&bytes[key_len + TIMESTAMP_SIZE..]);
        let window = decoded_window(start, end)?;
        Ok(Windowed::new(Bytes::copy_from_slice(&bytes[..key_len]), window))
    }

    /// Raw key of a changelog-form key, without decoding the window
    pub fn extract_key(bytes: &[u8]) -> StoreResult<Bytes> {
        let key_len = binary_key_len(bytes)?;
        Ok(Bytes::copy_from_slice(&bytes[..key_len]))
    }

    /// Session end of a changelog-form key
    pub fn extract_end(bytes: &[u8]) -> StoreResult<i64> {
        let key_len = binary_key_len(bytes)?;
        Ok(read_i64(&bytes[key_len..]))
    }

    /// Session start of a changelog-form key
    pub fn extract_start(bytes: &[u8]) -> StoreResult<i64> {
        let key_len = binary_key_len(bytes)?;
        Ok(read_i64(&bytes[key_len + TIMESTAMP_SIZE..]))
    }

    /// Encode a windowed key into ordered form
    pub fn to_ordered(key: &Windowed) -> StoreResult<Bytes> {
        let window = key.window();
        let mut buf = Self::ordered_prefix(key.key())?;
        buf.put_u64(invert(window.end()));
        buf.put_u64(invert(window.start()));
        Ok(buf.freeze())
    }

    /// Decode an ordered-form key
    pub fn from_ordered(bytes: &[u8]) -> StoreResult<Windowed> {
        let mut raw = Vec::with_capacity(bytes.len().saturating_sub(SUFFIX_SIZE + 2));
        let mut pos = 0;
        loop {
            let Some(&byte) = bytes.get(pos) else {
                return Err(StoreError::malformed("missing key terminator"));
            };
            if byte != ESCAPE {
                raw.push(byte);
                pos += 1;
                continue;
            }
            match bytes.get(pos + 1) {
                Some(&ESCAPED_ZERO) => {
                    raw.push(0);
                    pos += 2;
                }
                Some(&TERMINATOR) => {
                    pos += 2;
                    break;
                }
                Some(other) => {
                    return Err(StoreError::malformed(format!(
                        "invalid escape byte {other:#04x} at offset {}",
                        pos + 1
                    )));
                }
                None => return Err(StoreError::malformed("truncated escape sequence")),
            }
        }

        if raw.len() > MAX_KEY_LEN {
            return Err(StoreError::malformed(format!(
                "raw key length {} exceeds {MAX_KEY_LEN}",
                raw.len()
            )));
        }
        let suffix = &bytes[pos..];
        if suffix.len() != SUFFIX_SIZE {
            return Err(StoreError::malformed(format!(
                "expected {SUFFIX_SIZE} trailer bytes, found {}",
                suffix.len()
            )));
        }
        let end = revert(read_u64(suffix));
        let start = revert(read_u64(&suffix[TIMESTAMP_SIZE..]));
        let window = decoded_window(start, end)?;
        Ok(Windowed::new(raw, window))
    }

    /// Escaped raw key plus terminator; every ordered key of `raw` starts with it
    pub fn ordered_prefix(raw: &[u8]) -> StoreResult<BytesMut> {
        check_key_len(raw)?;
        let zeros = raw.iter().filter(|b| **b == ESCAPE).count();
        let mut buf = BytesMut::with_capacity(raw.len() + zeros + 2 + SUFFIX_SIZE);
        for &byte in raw {
            if byte == ESCAPE {
                buf.put_u8(ESCAPE);
                buf.put_u8(ESCAPED_ZERO);
            } else {
                buf.put_u8(byte);
            }
        }
        buf.put_u8(ESCAPE);
        buf.put_u8(TERMINATOR);
        Ok(buf)
    }

    /// Smallest ordered key any session of `raw` can have
    pub fn lower_bound(raw: &[u8]) -> StoreResult<Bytes> {
        let mut buf = Self::ordered_prefix(raw)?;
        buf.put_bytes(0x00, SUFFIX_SIZE);
        Ok(buf.freeze())
    }

    /// Largest ordered key any session of `raw` can have
    pub fn upper_bound(raw: &[u8]) -> StoreResult<Bytes> {
        let mut buf = Self::ordered_prefix(raw)?;
        buf.put_bytes(0xFF, SUFFIX_SIZE);
        Ok(buf.freeze())
    }

    /// Largest ordered key of a session of `raw` that ends at or after `time_from`
    pub fn upper_bound_for_end(raw: &[u8], time_from: i64) -> StoreResult<Bytes> {
        let mut buf = Self::ordered_prefix(raw)?;
        buf.put_u64(invert(time_from.max(0)));
        buf.put_bytes(0xFF, TIMESTAMP_SIZE);
        Ok(buf.freeze())
    }
}

fn check_key_len(raw: &[u8]) -> StoreResult<()> {
    if raw.len() > MAX_KEY_LEN {
        return Err(StoreError::KeyTooLarge {
            len: raw.len(),
            max: MAX_KEY_LEN,
        });
    }
    Ok(())
}

fn binary_key_len(bytes: &[u8]) -> StoreResult<usize> {
    if bytes.len() < SUFFIX_SIZE {
        return Err(StoreError::malformed(format!(
            "expected at least {SUFFIX_SIZE} bytes, found {}",
            bytes.len()
        )));
    }
    let key_len = bytes.len() - SUFFIX_SIZE;
    if key_len > MAX_KEY_LEN {
        return Err(StoreError::malformed(format!(
            "raw key length {key_len} exceeds {MAX_KEY_LEN}"
        )));
    }
    Ok(key_len)
}

fn decoded_window(start: i64, end: i64) -> StoreResult<SessionWindow> {
    SessionWindow::new(start, end)
        .map_err(|_| StoreError::malformed(format!("invalid window [{start}, {end}]")))
}

fn invert(timestamp: i64) -> u64 {
    !(timestamp as u64)
}

fn revert(encoded: u64) -> i64 {
    (!encoded) as i64
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; TIMESTAMP_SIZE];
    buf.copy_from_slice(&bytes[..TIMESTAMP_SIZE]);
    u64::from_be_bytes(buf)
}

fn read_i64(bytes: &[u8]) -> i64 {
    read_u64(bytes) as i64
}
