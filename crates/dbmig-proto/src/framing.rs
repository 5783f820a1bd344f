//! Line framing for the host protocol.
//!
//! Every message is one compact JSON document followed by `\n`. JSON string
//! escaping guarantees the document itself never contains a raw newline.

use crate::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, Read, Write};

/// Maximum encoded message size (1 MiB), newline excluded.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Encode a message as a newline-terminated JSON line.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>, Error> {
    let mut line =
        serde_json::to_vec(message).map_err(|e| Error::Serialization(e.to_string()))?;
    if line.len() > MAX_LINE_LENGTH {
        return Err(Error::InvalidMessage(format!(
            "message size {} exceeds maximum {}",
            line.len(),
            MAX_LINE_LENGTH
        )));
    }
    line.push(b'\n');
    Ok(line)
}

/// Decode a single line (with or without its terminator).
pub fn decode_message<T: DeserializeOwned>(line: &[u8]) -> Result<T, Error> {
    let line = trim_line_end(line);
    if line.is_empty() {
        return Err(Error::InvalidMessage("empty line".to_string()));
    }
    serde_json::from_slice(line).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Write one message and flush.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), Error> {
    let line = encode_message(message)?;
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Read the next message, skipping blank lines.
///
/// Returns `Ok(None)` at end of input.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, Error> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .by_ref()
            .take(MAX_LINE_LENGTH as u64 + 2)
            .read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Ok(None);
        }
        if trim_line_end(&buf).len() > MAX_LINE_LENGTH {
            return Err(Error::InvalidMessage(format!(
                "line exceeds maximum {}",
                MAX_LINE_LENGTH
            )));
        }
        if trim_line_end(&buf).iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        return decode_message(&buf).map(Some);
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}
