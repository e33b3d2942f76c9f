/// Literal payload marking explicit stream termination, distinct from
/// connection closure.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental parser for SSE text streams.
///
/// Feeding the same bytes split at any offset yields the identical payload
/// sequence; partial event blocks stay buffered as raw bytes until the
/// closing blank line arrives, so a multi-byte UTF-8 character split across
/// reads is reassembled before decoding. Once the `[DONE]` sentinel has been
/// yielded the parser latches closed and ignores any further bytes on the
/// connection.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete payloads.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        // Normalize CRLF framing up front so block splitting only has to
        // consider bare newlines. CR is ASCII, so dropping it byte-wise never
        // lands inside a multi-byte sequence.
        self.buffer
            .extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));
        let mut payloads = Vec::new();

        while let Some(split) = frame_boundary(&self.buffer) {
            let frame_bytes: Vec<u8> = self.buffer.drain(0..split + 2).take(split).collect();
            let frame = String::from_utf8_lossy(&frame_bytes);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };

            if payload == DONE_SENTINEL {
                self.finished = true;
                self.buffer.clear();
                payloads.push(payload);
                break;
            }

            payloads.push(payload);
        }

        payloads
    }

    /// Parse a complete SSE body in one shot.
    pub fn parse_frames(input: &str) -> Vec<String> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    /// True once the `[DONE]` sentinel has been consumed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn is_empty_buffer(&self) -> bool {
        String::from_utf8_lossy(&self.buffer).trim().is_empty()
    }

    /// Drains whatever trailing bytes never formed a complete event block.
    ///
    /// Used after stream closure to inspect non-SSE bodies (a plain JSON
    /// error document arrives as one unframed chunk).
    pub fn take_remainder(&mut self) -> String {
        let bytes = std::mem::take(&mut self.buffer);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn frame_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
