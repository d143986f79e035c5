use std::collections::VecDeque;

/// How much of a stream a single read may consume.
///
/// `length` caps the chunk size; `delimiter` ends the chunk early, and is
/// included in it. Both absent means "whatever is buffered".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// At most this many bytes.
    pub length: Option<usize>,
    /// Stop after the first occurrence of this byte.
    pub delimiter: Option<u8>,
}

impl Frame {
    /// Everything currently buffered.
    pub fn all() -> Self {
        Self::default()
    }

    /// At most `length` bytes.
    pub fn bytes(length: usize) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }

    /// Up to and including the first `delimiter` byte.
    pub fn until(delimiter: u8) -> Self {
        Self {
            delimiter: Some(delimiter),
            ..Self::default()
        }
    }

    /// Up to and including the first `delimiter` within `length` bytes, or
    /// `length` bytes when the delimiter is not among them.
    pub fn bytes_until(length: usize, delimiter: u8) -> Self {
        Self {
            length: Some(length),
            delimiter: Some(delimiter),
        }
    }
}

/// An owned, ordered run of bytes between a producer and a consumer.
///
/// Every stream in this crate funnels its bytes through one of these; its
/// lifetime is its owning stream's.
#[derive(Debug, Default)]
pub struct Buffer {
    bytes: VecDeque<u8>,
}

impl Buffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes at the back.
    pub fn push(&mut self, data: &[u8]) {
        self.bytes.extend(data.iter().copied());
    }

    /// Remove and return everything.
    pub fn drain(&mut self) -> Vec<u8> {
        self.bytes.drain(..).collect()
    }

    /// Remove and return the first `count` bytes (fewer when the buffer is
    /// shorter).
    pub fn remove(&mut self, count: usize) -> Vec<u8> {
        let count = count.min(self.bytes.len());
        self.bytes.drain(..count).collect()
    }

    /// Index of the first occurrence of `byte`.
    pub fn search(&self, byte: u8) -> Option<usize> {
        self.bytes.iter().position(|&b| b == byte)
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Remove one chunk according to `frame`.
    ///
    /// This is the framing rule every stream's `read` applies: a delimiter
    /// is honored only within the first `length` bytes and is included in
    /// the chunk; without one, up to `length` bytes come out. A zero-length
    /// frame takes nothing.
    pub fn take(&mut self, frame: Frame) -> Vec<u8> {
        if frame.length == Some(0) {
            return Vec::new();
        }
        let window = frame.length.unwrap_or(self.len()).min(self.len());
        let cut = match frame.delimiter {
            Some(delimiter) => {
                match self.bytes.iter().take(window).position(|&b| b == delimiter) {
                    Some(found) => found + 1,
                    None => window,
                }
            }
            None => window,
        };
        self.remove(cut)
    }
}
