//! Incremental NDJSON frame decoder for chunked stream bodies.

use hostrun_core::events::{decode_frame, FrameError, StreamEvent};

/// One decoded line of the stream.
#[derive(Debug)]
pub enum SourceItem {
    Event(StreamEvent),
    Malformed(FrameError),
}

impl From<Result<StreamEvent, FrameError>> for SourceItem {
    fn from(result: Result<StreamEvent, FrameError>) -> Self {
        match result {
            Ok(event) => SourceItem::Event(event),
            Err(err) => SourceItem::Malformed(err),
        }
    }
}

/// Splits arbitrary byte chunks into newline-terminated frames. Blank lines
/// are skipped; an oversized frame is reported once and discarded up to the
/// next newline.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_bytes: usize,
    discarding: bool,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes: max_frame_bytes.max(1),
            discarding: false,
        }
    }

    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<SourceItem> {
        let mut out = Vec::new();
        while let Some(pos) = chunk.iter().position(|byte| *byte == b'\n') {
            let (line, rest) = chunk.split_at(pos);
            chunk = &rest[1..];
            if self.discarding {
                self.discarding = false;
                self.buf.clear();
                continue;
            }
            if self.overflows(line.len()) {
                out.push(self.too_large(line.len()));
                continue;
            }
            self.buf.extend_from_slice(line);
            if let Some(item) = self.take_frame() {
                out.push(item);
            }
        }

        if !chunk.is_empty() && !self.discarding {
            if self.overflows(chunk.len()) {
                out.push(self.too_large(chunk.len()));
                self.discarding = true;
            } else {
                self.buf.extend_from_slice(chunk);
            }
        }
        out
    }

    /// Decodes a trailing unterminated line once the body has ended.
    pub fn finish(&mut self) -> Option<SourceItem> {
        if self.discarding {
            self.discarding = false;
            self.buf.clear();
            return None;
        }
        self.take_frame()
    }

    fn overflows(&self, extra: usize) -> bool {
        self.buf.len() + extra > self.max_frame_bytes
    }

    fn too_large(&mut self, extra: usize) -> SourceItem {
        let size = self.buf.len() + extra;
        self.buf.clear();
        SourceItem::Malformed(FrameError::TooLarge {
            size,
            limit: self.max_frame_bytes,
        })
    }

    fn take_frame(&mut self) -> Option<SourceItem> {
        let line = std::mem::take(&mut self.buf);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let decoded = std::str::from_utf8(&line)
            .map_err(FrameError::from)
            .and_then(decode_frame);
        Some(decoded.into())
    }
}
