// src/nomad/frames.rs

//! Incremental decoder for streams of concatenated JSON values.
//!
//! Both the event stream (newline separated) and the logs endpoint
//! (back-to-back objects) deliver JSON values split arbitrarily across HTTP
//! chunks. Bytes are buffered until a complete value is available.

use serde::de::DeserializeOwned;

#[derive(Debug, Default)]
pub struct JsonFrameDecoder {
    buf: Vec<u8>,
}

impl JsonFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete value.
    ///
    /// Returns `None` when more bytes are needed. A value that fails to
    /// decode is reported once and dropped, up to the next newline if the
    /// buffer has one, otherwise together with the rest of the buffer.
    pub fn next_value<T: DeserializeOwned>(&mut self) -> Option<Result<T, serde_json::Error>> {
        let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
        match stream.next() {
            None => {
                self.buf.clear();
                None
            }
            Some(Ok(value)) => {
                let consumed = stream.byte_offset();
                self.buf.drain(..consumed);
                Some(Ok(value))
            }
            Some(Err(err)) if err.is_eof() => None,
            Some(Err(err)) => {
                match self.buf.iter().position(|b| *b == b'\n') {
                    Some(pos) => {
                        self.buf.drain(..=pos);
                    }
                    None => self.buf.clear(),
                }
                Some(Err(err))
            }
        }
    }
}
