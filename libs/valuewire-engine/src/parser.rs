//! Stream Parser (§4.4): an incremental tokenizer tolerant of chunk
//! boundaries landing anywhere, including mid-token. Mirrors the
//! `decode(buf) -> Option<(frame, consumed)>` framing contract: callers
//! feed bytes as they arrive and get back a complete frame only once one
//! is fully buffered.

use serde_json::Value;

use valuewire_api::{StreamError, StreamResult};

/// Scans a buffer for one complete top-level JSON array (the frame) using
/// bracket-balance slicing: track nesting depth and string/escape state
/// byte by byte, without requiring the whole value to already be valid
/// JSON before we know where it ends.
#[derive(Default)]
pub struct FrameDecoder {
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    /// Looks for one complete frame at the front of `buf`. Returns
    /// `Ok(None)` if no complete frame is buffered yet — call again once
    /// more bytes have arrived. `consumed` never includes trailing
    /// whitespace the caller should also drop.
    pub fn decode(&self, buf: &[u8]) -> StreamResult<Option<(Value, usize)>> {
        let start = match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(i) => i,
            None => return Ok(None),
        };
        if buf[start] != b'[' {
            return Err(StreamError::protocol("frame must start with '['"));
        }

        let mut depth: u32 = 0;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &byte) in buf[start..].iter().enumerate() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'[' | b'{' => depth += 1,
                b']' | b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = start + offset + 1;
                        let slice = &buf[start..end];
                        let value: Value = serde_json::from_slice(slice)
                            .map_err(|e| StreamError::protocol(format!("malformed frame: {e}")))?;
                        return Ok(Some((value, end)));
                    }
                }
                _ => {}
            }

            if self.max_frame_bytes > 0 && offset > self.max_frame_bytes {
                return Err(StreamError::protocol(format!(
                    "frame exceeds {} bytes with no closing bracket",
                    self.max_frame_bytes
                )));
            }
        }

        Ok(None)
    }
}

fn skip_ws(buf: &[u8]) -> usize {
    buf.iter().take_while(|b| b.is_ascii_whitespace()).count()
}

/// Bracket-balance scan for one complete bracketed value, given that
/// `buf[0]` is the byte immediately *after* its opening `[` or `{` (the
/// caller has already matched and consumed the opening byte). Depth counts
/// any `[`/`{`/`]`/`}`, not just the matching pair, the same way
/// `FrameDecoder` does — valid JSON can't actually mismatch them, and
/// `serde_json::from_slice` still validates that once a slice is found.
fn scan_bracketed(buf: &[u8]) -> StreamResult<Option<usize>> {
    let mut depth: u32 = 1;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in buf.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(offset + 1));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

/// One delivery off the row list: either a tail row, or the end of the
/// frame (the row list and the outer frame both closed).
#[derive(Debug)]
pub enum Delivery {
    Row(Value),
    End,
}

enum Stage {
    AwaitingHead,
    AwaitingRows,
    Closed,
}

/// Staged, chunk-tolerant counterpart of `FrameDecoder` for the case
/// `FrameDecoder` doesn't cover: a consumer that must resolve the head as
/// soon as it arrives, while rows keep trickling in afterwards (§6,
/// `parse`). `take_head` must succeed once before `next_delivery` is
/// called.
pub struct IncrementalParser {
    buf: Vec<u8>,
    cursor: usize,
    stage: Stage,
}

impl Default for IncrementalParser {
    fn default() -> Self {
        Self { buf: Vec::new(), cursor: 0, stage: Stage::AwaitingHead }
    }
}

impl IncrementalParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.stage, Stage::Closed)
    }

    /// Append newly arrived bytes, compacting away whatever has already
    /// been consumed so the buffer doesn't grow across the whole session.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.cursor > 0 {
            self.buf.drain(0..self.cursor);
            self.cursor = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Parse the head object, consuming it and the `,[` that opens the row
    /// list. Returns `Ok(None)` until enough bytes have arrived.
    pub fn take_head(&mut self) -> StreamResult<Option<Value>> {
        let (consumed, head) = {
            let tail = &self.buf[self.cursor..];
            let mut pos = skip_ws(tail);
            if pos >= tail.len() {
                return Ok(None);
            }
            if tail[pos] != b'[' {
                return Err(StreamError::protocol("frame must start with '['"));
            }
            pos += 1;
            pos += skip_ws(&tail[pos..]);
            if pos >= tail.len() {
                return Ok(None);
            }
            if tail[pos] != b'{' {
                return Err(StreamError::protocol("head must be a JSON object"));
            }
            let head_start = pos;
            let after_open = pos + 1;
            let head_len = match scan_bracketed(&tail[after_open..])? {
                Some(len) => len,
                None => return Ok(None),
            };
            let head_end = after_open + head_len;
            let head: Value = serde_json::from_slice(&tail[head_start..head_end])
                .map_err(|e| StreamError::protocol(format!("malformed head: {e}")))?;

            let mut after = head_end;
            after += skip_ws(&tail[after..]);
            if after >= tail.len() {
                return Ok(None);
            }
            if tail[after] != b',' {
                return Err(StreamError::protocol("expected ',' after the head"));
            }
            after += 1;
            after += skip_ws(&tail[after..]);
            if after >= tail.len() {
                return Ok(None);
            }
            if tail[after] != b'[' {
                return Err(StreamError::protocol("expected '[' opening the row list"));
            }
            after += 1;

            (after, head)
        };

        self.cursor += consumed;
        self.stage = Stage::AwaitingRows;
        Ok(Some(head))
    }

    /// Parse the next tail row, or the close of the row list and frame.
    /// Returns `Ok(None)` until enough bytes have arrived.
    pub fn next_delivery(&mut self) -> StreamResult<Option<Delivery>> {
        let (consumed, delivery) = {
            let tail = &self.buf[self.cursor..];
            let mut pos = skip_ws(tail);
            if pos >= tail.len() {
                return Ok(None);
            }
            match tail[pos] {
                b']' => {
                    let mut after = pos + 1;
                    after += skip_ws(&tail[after..]);
                    if after >= tail.len() {
                        return Ok(None);
                    }
                    if tail[after] != b']' {
                        return Err(StreamError::protocol("expected ']' closing the frame"));
                    }
                    (after + 1, Delivery::End)
                }
                b',' | b'[' => {
                    if tail[pos] == b',' {
                        pos += 1;
                        pos += skip_ws(&tail[pos..]);
                        if pos >= tail.len() {
                            return Ok(None);
                        }
                    }
                    if tail[pos] != b'[' {
                        return Err(StreamError::protocol("expected '[' opening a tail row"));
                    }
                    let row_start = pos;
                    let after_open = pos + 1;
                    let row_len = match scan_bracketed(&tail[after_open..])? {
                        Some(len) => len,
                        None => return Ok(None),
                    };
                    let row_end = after_open + row_len;
                    let row: Value = serde_json::from_slice(&tail[row_start..row_end])
                        .map_err(|e| StreamError::protocol(format!("malformed row: {e}")))?;
                    (row_end, Delivery::Row(row))
                }
                _ => return Err(StreamError::protocol("malformed row list")),
            }
        };

        self.cursor += consumed;
        if matches!(delivery, Delivery::End) {
            self.stage = Stage::Closed;
        }
        Ok(Some(delivery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_frame_delivered_in_one_chunk() {
        let decoder = FrameDecoder::default();
        let buf = br#"[{"a":1},[]]"#;
        let (value, consumed) = decoder.decode(buf).unwrap().unwrap();
        assert_eq!(value, serde_json::json!([{"a": 1}, []]));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn returns_none_for_a_frame_split_mid_token() {
        let decoder = FrameDecoder::default();
        let full = br#"[{"a":1},[]]"#;
        // Split inside the string key "a".
        let (head, _tail) = full.split_at(3);
        assert!(decoder.decode(head).unwrap().is_none());
    }

    #[test]
    fn ignores_brackets_embedded_in_strings() {
        let decoder = FrameDecoder::default();
        let buf = br#"[{"note":"[nested] {braces}"},[]]"#;
        let (value, consumed) = decoder.decode(buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(value[0]["note"], "[nested] {braces}");
    }

    #[test]
    fn handles_escaped_quotes_inside_strings() {
        let decoder = FrameDecoder::default();
        let buf = br#"[{"note":"a \" b ] c"},[]]"#;
        let (_value, consumed) = decoder.decode(buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn decodes_only_the_first_frame_and_reports_its_length() {
        let decoder = FrameDecoder::default();
        let mut buf = br#"[1,[]]"#.to_vec();
        buf.extend_from_slice(br#"[2,[]]"#);
        let (value, consumed) = decoder.decode(&buf).unwrap().unwrap();
        assert_eq!(value, serde_json::json!([1, []]));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn rejects_a_buffer_not_starting_with_an_array() {
        let decoder = FrameDecoder::default();
        assert!(decoder.decode(br#"{"a":1}"#).is_err());
    }

    #[test]
    fn incremental_parser_resolves_head_before_rows_arrive() {
        let mut parser = IncrementalParser::new();
        parser.feed(br#"[{"json":{"foo":"bar"},"nonce":"__tson"},["#);
        let head = parser.take_head().unwrap().unwrap();
        assert_eq!(head, serde_json::json!({"json": {"foo": "bar"}, "nonce": "__tson"}));
        assert!(parser.next_delivery().unwrap().is_none());
    }

    #[test]
    fn incremental_parser_resumes_head_after_a_mid_token_split() {
        let mut parser = IncrementalParser::new();
        let full = br#"[{"json":{"foo":"bar"},"nonce":"__tson"},["#;
        let (first, second) = full.split_at(10);
        parser.feed(first);
        assert!(parser.take_head().unwrap().is_none());
        parser.feed(second);
        assert!(parser.take_head().unwrap().is_some());
    }

    #[test]
    fn incremental_parser_delivers_rows_then_end() {
        let mut parser = IncrementalParser::new();
        parser.feed(br#"[{"json":1,"nonce":"__tson"},["#);
        parser.take_head().unwrap().unwrap();
        parser.feed(br#"[0,[0,42]]"#);
        match parser.next_delivery().unwrap().unwrap() {
            Delivery::Row(row) => assert_eq!(row, serde_json::json!([0, [0, 42]])),
            Delivery::End => panic!("expected a row"),
        }
        assert!(parser.next_delivery().unwrap().is_none());
        parser.feed(br#"]]"#);
        assert!(matches!(parser.next_delivery().unwrap().unwrap(), Delivery::End));
        assert!(parser.is_closed());
    }

    #[test]
    fn incremental_parser_handles_an_empty_row_list() {
        let mut parser = IncrementalParser::new();
        parser.feed(br#"[{"json":null,"nonce":"__tson"},[]]"#);
        parser.take_head().unwrap().unwrap();
        assert!(matches!(parser.next_delivery().unwrap().unwrap(), Delivery::End));
    }
}
