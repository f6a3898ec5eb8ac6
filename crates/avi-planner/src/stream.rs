//! Incremental reassembly of a streamed `streamGenerateContent` response.
//!
//! The endpoint streams a sequence of JSON chunk objects. Depending on the
//! transport they arrive one per line, as elements of a (possibly
//! pretty-printed) JSON array, or as SSE `data:` lines. The assembler
//! ignores all framing between objects, so bytes can be pushed exactly as
//! they come off the socket and the call can be abandoned at any point.

use serde::Deserialize;

use crate::error::{PlannerError, PlannerResult};

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Accumulates text fragments from streamed chunks in arrival order.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    /// Bytes of the chunk object currently being read.
    pending: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    text: String,
    chunks: usize,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw response bytes. Complete chunk objects are decoded as soon
    /// as their closing brace arrives.
    pub fn push(&mut self, bytes: &[u8]) -> PlannerResult<()> {
        for &byte in bytes {
            if self.depth == 0 {
                // Between objects: array brackets, commas, `data:` prefixes.
                if byte == b'{' {
                    self.depth = 1;
                    self.pending.push(byte);
                }
                continue;
            }

            self.pending.push(byte);
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let object = std::mem::take(&mut self.pending);
                        self.consume(&object)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Number of chunk objects decoded so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// The concatenated text. Fails if the stream stopped mid-object.
    pub fn finish(self) -> PlannerResult<String> {
        if self.depth > 0 {
            return Err(PlannerError::Decode(
                "stream ended in the middle of a response chunk".into(),
            ));
        }
        Ok(self.text)
    }

    fn consume(&mut self, object: &[u8]) -> PlannerResult<()> {
        let chunk: StreamChunk = serde_json::from_slice(object)
            .map_err(|e| PlannerError::Decode(format!("malformed stream chunk: {e}")))?;
        self.chunks += 1;

        if let Some(error) = chunk.error {
            return Err(PlannerError::Http(format!("planner stream reported an error: {error}")));
        }

        let parts = chunk
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();
        for text in parts.into_iter().filter_map(|p| p.text) {
            self.text.push_str(&text);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> String {
        serde_json::json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        })
        .to_string()
    }

    fn assemble(body: &str) -> String {
        let mut assembler = StreamAssembler::new();
        assembler.push(body.as_bytes()).unwrap();
        assembler.finish().unwrap()
    }

    #[test]
    fn one_object_per_line() {
        let body = format!("{}\n{}\n", chunk("{\"actions\":"), chunk("[]}"));
        assert_eq!(assemble(&body), "{\"actions\":[]}");
    }

    #[test]
    fn pretty_printed_array_framing() {
        let first: serde_json::Value = serde_json::from_str(&chunk("Hel")).unwrap();
        let second: serde_json::Value = serde_json::from_str(&chunk("lo")).unwrap();
        let body = serde_json::to_string_pretty(&vec![first, second]).unwrap();
        assert_eq!(assemble(&body), "Hello");
    }

    #[test]
    fn sse_framing() {
        let body = format!("data: {}\r\n\r\ndata: {}\r\n\r\n", chunk("a"), chunk("b"));
        assert_eq!(assemble(&body), "ab");
    }

    #[test]
    fn bytes_split_anywhere() {
        let body = format!("[{},\n{}]", chunk("{\"x\": \"}{\\\"\"}"), chunk("!"));
        let mut assembler = StreamAssembler::new();
        for byte in body.as_bytes() {
            assembler.push(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(assembler.chunks(), 2);
        assert_eq!(assembler.finish().unwrap(), "{\"x\": \"}{\\\"\"}!");
    }

    #[test]
    fn multibyte_text_survives_splitting() {
        let body = chunk("olá, ligar a luz");
        let bytes = body.as_bytes();
        let mid = body.find('á').unwrap() + 1;
        let mut assembler = StreamAssembler::new();
        assembler.push(&bytes[..mid]).unwrap();
        assembler.push(&bytes[mid..]).unwrap();
        assert_eq!(assembler.finish().unwrap(), "olá, ligar a luz");
    }

    #[test]
    fn only_first_candidate_and_all_its_parts() {
        let body = serde_json::json!({
            "candidates": [
                { "content": { "parts": [{ "text": "a" }, { "text": "b" }] } },
                { "content": { "parts": [{ "text": "IGNORED" }] } }
            ]
        })
        .to_string();
        assert_eq!(assemble(&body), "ab");
    }

    #[test]
    fn chunks_without_text_are_skipped() {
        let body = format!(
            "{}\n{}\n{}",
            chunk("x"),
            r#"{"usageMetadata": {"totalTokenCount": 10}}"#,
            r#"{"candidates": [{"finishReason": "STOP"}]}"#
        );
        assert_eq!(assemble(&body), "x");
    }

    #[test]
    fn truncated_stream_is_a_decode_error() {
        let body = chunk("x");
        let mut assembler = StreamAssembler::new();
        assembler.push(&body.as_bytes()[..body.len() - 3]).unwrap();
        assert!(matches!(assembler.finish(), Err(PlannerError::Decode(_))));
    }

    #[test]
    fn error_chunk_surfaces() {
        let mut assembler = StreamAssembler::new();
        let err = assembler
            .push(br#"[{"error": {"code": 429, "message": "quota"}}]"#)
            .unwrap_err();
        assert!(matches!(err, PlannerError::Http(msg) if msg.contains("quota")));
    }
}
