//! JSON string escape and unescape helpers.
//!
//! Payload bytes enter the arena already escaped; these helpers exist for
//! the read side (string getters, name-scan lookup) and for callers
//! preparing payloads. Unescaping targets a bounded stack buffer that
//! spills to the heap for long names.

use smallvec::SmallVec;

use crate::error::{Result, ResultDocError};

/// Stack-first buffer used for unescaped names and short strings.
pub type NameBuf = SmallVec<[u8; 64]>;

/// Appends the JSON-escaped form of `value` to `out`.
///
/// Returns `true` when any escape sequence was emitted, i.e. the encoded
/// bytes differ from the input.
pub fn escape_into(value: &str, out: &mut Vec<u8>) -> bool {
    let mut escaped = false;
    for byte in value.bytes() {
        match byte {
            b'"' => {
                out.extend_from_slice(b"\\\"");
                escaped = true;
            }
            b'\\' => {
                out.extend_from_slice(b"\\\\");
                escaped = true;
            }
            b'\x08' => {
                out.extend_from_slice(b"\\b");
                escaped = true;
            }
            b'\x0C' => {
                out.extend_from_slice(b"\\f");
                escaped = true;
            }
            b'\n' => {
                out.extend_from_slice(b"\\n");
                escaped = true;
            }
            b'\r' => {
                out.extend_from_slice(b"\\r");
                escaped = true;
            }
            b'\t' => {
                out.extend_from_slice(b"\\t");
                escaped = true;
            }
            b if b < 0x20 => {
                out.extend_from_slice(format!("\\u{b:04x}").as_bytes());
                escaped = true;
            }
            b => out.push(b),
        }
    }
    escaped
}

/// Decodes JSON escape sequences in `raw` (payload bytes without the
/// surrounding quotes) into `out`.
pub fn unescape_into(raw: &[u8], out: &mut NameBuf) -> Result<()> {
    let mut i = 0;
    while i < raw.len() {
        let byte = raw[i];
        if byte != b'\\' {
            out.push(byte);
            i += 1;
            continue;
        }
        i += 1;
        let esc = *raw.get(i).ok_or(ResultDocError::Format("string"))?;
        i += 1;
        match esc {
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'/' => out.push(b'/'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'u' => {
                let unit = read_hex4(raw, &mut i)?;
                let ch = if (0xD800..0xDC00).contains(&unit) {
                    // High surrogate: a low surrogate escape must follow.
                    if raw.get(i) != Some(&b'\\') || raw.get(i + 1) != Some(&b'u') {
                        return Err(ResultDocError::Format("string"));
                    }
                    i += 2;
                    let low = read_hex4(raw, &mut i)?;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(ResultDocError::Format("string"));
                    }
                    let code =
                        0x10000 + ((u32::from(unit) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
                    char::from_u32(code).ok_or(ResultDocError::Format("string"))?
                } else if (0xDC00..0xE000).contains(&unit) {
                    return Err(ResultDocError::Format("string"));
                } else {
                    char::from_u32(u32::from(unit)).ok_or(ResultDocError::Format("string"))?
                };
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            _ => return Err(ResultDocError::Format("string")),
        }
    }
    Ok(())
}

fn read_hex4(raw: &[u8], i: &mut usize) -> Result<u16> {
    let digits = raw
        .get(*i..*i + 4)
        .ok_or(ResultDocError::Format("string"))?;
    *i += 4;
    let mut value = 0u16;
    for &d in digits {
        let nibble = match d {
            b'0'..=b'9' => d - b'0',
            b'a'..=b'f' => d - b'a' + 10,
            b'A'..=b'F' => d - b'A' + 10,
            _ => return Err(ResultDocError::Format("string")),
        };
        value = (value << 4) | u16::from(nibble);
    }
    Ok(value)
}

/// Decodes escaped payload bytes into an owned string.
pub fn unescape(raw: &[u8]) -> Result<String> {
    let mut buf = NameBuf::new();
    unescape_into(raw, &mut buf)?;
    String::from_utf8(buf.into_vec()).map_err(|_| ResultDocError::Format("string"))
}
