//! Decoder for response bodies that carry a series of whole JSON documents
//! with no delimiter between them.
//!
//! Document boundaries are recovered from JSON syntax alone. Bytes are
//! accumulated until they form complete documents; every complete document is
//! emitted in wire order and removed from the buffer. An incomplete trailing
//! document waits for more bytes. A malformed one is logged and kept, which
//! stalls the sequence until the underlying stream ends. There is no resync.
//!
//! Reads are decoded as UTF-8 text before parsing. Invalid byte sequences are
//! replaced with U+FFFD, while a character split across two reads is held back
//! until its remaining bytes arrive.
//!
//! The buffer is unbounded unless [`DecoderOptions::max_buffer_bytes`] is set,
//! in which case exceeding it ends the sequence with
//! [`JsonStreamError::BufferOverflow`].

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use serde_json::{Deserializer, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Boxed error produced by the byte source feeding the decoder.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failures surfaced by [`decode_json_stream`].
///
/// Malformed JSON is never reported here; it is logged and buffered.
#[derive(Debug, Error)]
pub enum JsonStreamError {
    #[error("response stream failed: {0}")]
    Source(#[source] BoxError),

    #[error("buffered {buffered} bytes without a complete JSON document (limit {limit} bytes)")]
    BufferOverflow { buffered: usize, limit: usize },
}

/// Tuning for [`JsonChunkDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Maximum number of unparsed bytes kept between reads. `None` keeps everything.
    pub max_buffer_bytes: Option<usize>,
}

/// Incremental decoder turning raw reads into whole JSON documents.
#[derive(Debug, Default)]
pub struct JsonChunkDecoder {
    /// Decoded text not yet consumed by a complete document. Always valid UTF-8.
    buffer: Vec<u8>,
    /// Trailing bytes of an incomplete UTF-8 character.
    partial_char: Vec<u8>,
    ready: VecDeque<Value>,
    options: DecoderOptions,
}

impl JsonChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecoderOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Append one read to the buffer and parse every document it completes.
    ///
    /// Parsed documents are queued for [`JsonChunkDecoder::pop`] even when the
    /// call reports a buffer overflow.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), JsonStreamError> {
        self.append_text(chunk);

        let (consumed, failure) = {
            let mut documents = Deserializer::from_slice(&self.buffer).into_iter::<Value>();
            let mut failure = None;
            for next in documents.by_ref() {
                match next {
                    Ok(document) => self.ready.push_back(document),
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }
            (documents.byte_offset(), failure)
        };
        self.buffer.drain(..consumed);

        match failure {
            Some(error) if error.is_eof() => {
                debug!(target: "json_stream", buffered = self.buffer.len(), "waiting for the rest of a JSON document");
            }
            Some(error) => {
                warn!(target: "json_stream", error = %error, buffered = self.buffer.len(), "JSON parse error");
            }
            None => {}
        }

        if let Some(limit) = self.options.max_buffer_bytes
            && self.pending_len() > limit
        {
            return Err(JsonStreamError::BufferOverflow {
                buffered: self.pending_len(),
                limit,
            });
        }
        Ok(())
    }

    fn append_text(&mut self, chunk: &[u8]) {
        self.partial_char.extend_from_slice(chunk);
        let complete = complete_utf8_len(&self.partial_char);
        let text = String::from_utf8_lossy(&self.partial_char[..complete]);
        self.buffer.extend_from_slice(text.as_bytes());
        self.partial_char.drain(..complete);
    }

    /// Take the oldest decoded document, if any.
    pub fn pop(&mut self) -> Option<Value> {
        self.ready.pop_front()
    }

    /// Push a read and return every document it completed.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Value>, JsonStreamError> {
        let pushed = self.push(chunk);
        let documents = self.ready.drain(..).collect();
        pushed.map(|_| documents)
    }

    /// Number of bytes waiting for a document to complete.
    pub fn pending_len(&self) -> usize {
        self.buffer.len() + self.partial_char.len()
    }

    /// Discard whatever is left in the buffer at end of stream.
    ///
    /// Returns the number of bytes dropped. No final parse is attempted.
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending_len();
        if discarded > 0 {
            debug!(target: "json_stream", discarded, "discarding unparsed bytes at end of stream");
        }
        self.buffer.clear();
        self.partial_char.clear();
        discarded
    }
}

/// Length of the prefix of `bytes` that does not end inside a UTF-8 character.
///
/// Invalid sequences count as complete; only a truncated trailing character is excluded.
fn complete_utf8_len(bytes: &[u8]) -> usize {
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(_) => return bytes.len(),
            Err(error) => match error.error_len() {
                Some(invalid) => start += error.valid_up_to() + invalid,
                None => return start + error.valid_up_to(),
            },
        }
    }
}

struct DecodeState<S> {
    source: Pin<Box<S>>,
    decoder: JsonChunkDecoder,
    failure: Option<JsonStreamError>,
    exhausted: bool,
}

/// Adapt a byte stream into a lazy sequence of JSON documents.
///
/// The sequence is forward-only and ends when `source` ends, after a read
/// error from `source`, or after a buffer overflow. Each of the latter two is
/// yielded once as an `Err` before the sequence ends.
pub fn decode_json_stream<S, E>(source: S, options: DecoderOptions) -> impl Stream<Item = Result<Value, JsonStreamError>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let state = DecodeState {
        source: Box::pin(source),
        decoder: JsonChunkDecoder::with_options(options),
        failure: None,
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(document) = state.decoder.pop() {
                return Some((Ok(document), state));
            }
            if let Some(error) = state.failure.take() {
                state.exhausted = true;
                return Some((Err(error), state));
            }
            if state.exhausted {
                return None;
            }
            match state.source.next().await {
                Some(Ok(bytes)) => {
                    if let Err(error) = state.decoder.push(&bytes) {
                        state.failure = Some(error);
                    }
                }
                Some(Err(error)) => state.failure = Some(JsonStreamError::Source(error.into())),
                None => {
                    state.decoder.finish();
                    state.exhausted = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;
    use std::io;

    fn reads(parts: &[&str]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        let owned: Vec<Result<Bytes, io::Error>> = parts.iter().map(|part| Ok(Bytes::from(part.to_string()))).collect();
        stream::iter(owned)
    }

    async fn collect(parts: &[&str]) -> Vec<Value> {
        decode_json_stream(reads(parts), DecoderOptions::default())
            .map(|item| item.expect("no stream errors"))
            .collect()
            .await
    }

    #[test]
    fn one_document_per_read_is_emitted_and_buffer_reset() {
        let mut decoder = JsonChunkDecoder::new();
        assert_eq!(decoder.decode(br#"{"node":"A"}"#).unwrap(), vec![json!({"node": "A"})]);
        assert_eq!(decoder.pending_len(), 0);
        assert_eq!(decoder.decode(br#"["t1",{"node":"B"}]"#).unwrap(), vec![json!(["t1", {"node": "B"}])]);
    }

    #[test]
    fn document_split_across_reads_waits_for_completion() {
        let mut decoder = JsonChunkDecoder::new();
        assert!(decoder.decode(br#"{"node":"#).unwrap().is_empty());
        assert!(decoder.pending_len() > 0);
        assert_eq!(decoder.decode(br#""A","data":[1,2]}"#).unwrap(), vec![json!({"node": "A", "data": [1, 2]})]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn coalesced_documents_are_split_in_order() {
        let mut decoder = JsonChunkDecoder::new();
        let documents = decoder.decode(b"{\"a\":1}\n[2,3] {\"b\":").unwrap();
        assert_eq!(documents, vec![json!({"a": 1}), json!([2, 3])]);
        assert_eq!(decoder.decode(b"4}").unwrap(), vec![json!({"b": 4})]);
    }

    #[test]
    fn multibyte_characters_split_across_reads_survive() {
        let text = "{\"greeting\":\"héllo\"}".as_bytes();
        let split = text.iter().position(|byte| *byte == 0xC3).expect("multibyte lead") + 1;
        let mut decoder = JsonChunkDecoder::new();
        assert!(decoder.decode(&text[..split]).unwrap().is_empty());
        assert_eq!(decoder.decode(&text[split..]).unwrap(), vec![json!({"greeting": "héllo"})]);
    }

    #[test]
    fn invalid_utf8_is_replaced_and_decoding_continues() {
        let mut decoder = JsonChunkDecoder::new();
        assert_eq!(decoder.decode(b"{\"name\":\"caf\xe9\"}").unwrap(), vec![json!({"name": "caf\u{FFFD}"})]);
        assert_eq!(decoder.decode(br#"{"node":"A"}"#).unwrap(), vec![json!({"node": "A"})]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn truncated_character_at_end_of_read_is_held_back() {
        let mut decoder = JsonChunkDecoder::new();
        assert!(decoder.decode(b"{\"sym\":\"\xe2\x82").unwrap().is_empty());
        assert_eq!(decoder.decode(b"\xac\"}").unwrap(), vec![json!({"sym": "\u{20AC}"})]);
        assert_eq!(complete_utf8_len(b"ab\xe2\x82"), 2);
        assert_eq!(complete_utf8_len(b"a\xffb"), 3);
    }

    #[test]
    fn malformed_buffer_is_retained_without_error() {
        let mut decoder = JsonChunkDecoder::new();
        assert!(decoder.decode(b"{oops").unwrap().is_empty());
        assert!(decoder.decode(b"}").unwrap().is_empty());
        assert_eq!(decoder.pending_len(), "{oops}".len());
        assert_eq!(decoder.finish(), "{oops}".len());
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn buffer_cap_fails_loudly() {
        let mut decoder = JsonChunkDecoder::with_options(DecoderOptions { max_buffer_bytes: Some(8) });
        let error = decoder.decode(b"{\"key\":\"0123456789\"").unwrap_err();
        assert!(matches!(error, JsonStreamError::BufferOverflow { limit: 8, .. }));
    }

    #[test]
    fn buffer_cap_keeps_documents_parsed_before_overflow() {
        let mut decoder = JsonChunkDecoder::with_options(DecoderOptions { max_buffer_bytes: Some(4) });
        assert!(decoder.push(b"{\"a\":1}{\"unterminated\":").is_err());
        assert_eq!(decoder.pop(), Some(json!({"a": 1})));
        assert_eq!(decoder.pop(), None);
    }

    #[tokio::test]
    async fn stream_yields_each_document_in_order() {
        let values = collect(&[r#"{"node":"A"}"#, r#"["t1",{"node":"B","checkpoint":"c1","data":{}}]"#]).await;
        assert_eq!(
            values,
            vec![json!({"node": "A"}), json!(["t1", {"node": "B", "checkpoint": "c1", "data": {}}])]
        );
    }

    #[tokio::test]
    async fn stream_that_never_parses_yields_nothing_and_ends() {
        let values = collect(&["{not json", "still not", "]"]).await;
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn trailing_partial_document_is_discarded_at_end() {
        let values = collect(&[r#"{"a":1}"#, r#"{"b":"#]).await;
        assert_eq!(values, vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let values = collect(&[]).await;
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn source_error_is_yielded_after_earlier_documents() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(br#"{"a":1}"#)),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(br#"{"b":2}"#)),
        ]);
        let items: Vec<_> = decode_json_stream(source, DecoderOptions::default()).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &json!({"a": 1}));
        assert!(matches!(items[1], Err(JsonStreamError::Source(_))));
    }
}
