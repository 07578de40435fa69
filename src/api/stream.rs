use super::frame::decode_frame;
use super::logging::emit_frame_parse_error;
use crate::types::StreamFrame;

/// Incremental event-stream reader.
///
/// Bytes are buffered raw and only decoded once a whole frame is present, so
/// frames (and multi-byte characters) split across reads come out the same
/// as when the body arrives in one piece.
#[derive(Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
    scanned: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every frame completed by it, in order.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;

        while let Some((end, boundary_len)) = find_boundary(&self.buffer, search_from.max(start)) {
            if let Some(frame) = decode_raw(&self.buffer[start..end]) {
                frames.push(frame);
            }
            start = end + boundary_len;
            search_from = start;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        // A boundary can still begin in the last two bytes once more data arrives.
        self.scanned = self.buffer.len().saturating_sub(2);

        frames
    }

    /// Decodes whatever is left once the body has ended.
    pub fn flush(&mut self) -> Option<StreamFrame> {
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        decode_raw(&rest)
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Splits a complete body into frames, including an unterminated last one.
pub fn split_frames(body: &[u8]) -> Vec<StreamFrame> {
    let mut buffer = FrameBuffer::new();
    let mut frames = buffer.process(body);
    frames.extend(buffer.flush());
    frames
}

/// Finds the next blank line at or after `from`: `\n\n`, or `\n\r\n` when
/// lines end in CRLF. Returns its start and length.
fn find_boundary(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut index = from;
    while index < bytes.len() {
        if bytes[index] == b'\n' {
            match bytes.get(index + 1) {
                Some(b'\n') => return Some((index, 2)),
                Some(b'\r') if bytes.get(index + 2) == Some(&b'\n') => return Some((index, 3)),
                _ => {}
            }
        }
        index += 1;
    }
    None
}

fn decode_raw(raw: &[u8]) -> Option<StreamFrame> {
    let text = String::from_utf8_lossy(raw);
    if text.trim().is_empty() {
        return None;
    }

    let decoded = decode_frame(&text);
    if let Some(error) = &decoded.data_error {
        emit_frame_parse_error(&decoded.frame.event, &text, error);
    }
    Some(decoded.frame)
}
