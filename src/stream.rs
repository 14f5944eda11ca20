//! Server-sent event decoding for `streamGenerateContent?alt=sse`.
//!
//! Each SSE event carries one JSON-encoded [`GenerateContentResponse`]. The
//! decoded stream is lazy and single-pass: dropping it stops reading from the
//! underlying HTTP body.

use std::pin::Pin;

use futures::stream::{BoxStream, Stream, StreamExt};

use crate::error::{RagError, Result};
use crate::types::GenerateContentResponse;

/// Incremental response fragments in arrival order.
pub type ResponseStream = BoxStream<'static, Result<GenerateContentResponse>>;

/// Splits a byte stream into SSE `data:` payloads.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete event payload, skipping comment-only blocks.
    pub fn next_event(&mut self) -> Option<String> {
        while let Some((pos, sep_len)) = find_separator(&self.buf) {
            let block: Vec<u8> = self.buf.drain(..pos + sep_len).take(pos).collect();
            if let Some(data) = event_data(&block) {
                return Some(data);
            }
        }
        None
    }

    /// Flushes whatever is left once the body has ended without a trailing blank line.
    pub fn finish(&mut self) -> Option<String> {
        let block = std::mem::take(&mut self.buf);
        event_data(&block)
    }
}

fn find_separator(buf: &[u8]) -> Option<(usize, usize)> {
    (0..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

fn event_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();

    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

fn parse_event(data: &str) -> Result<GenerateContentResponse> {
    serde_json::from_str(data).map_err(|e| RagError::Stream(format!("{}: {}", e, data)))
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    finished: bool,
}

/// Turns an HTTP body stream into a stream of parsed response fragments.
///
/// A transport error is yielded once and ends the stream.
pub(crate) fn decode_sse<S, B, E>(bytes: S) -> ResponseStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<RagError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.decoder.next_event() {
                return Some((parse_event(&data), state));
            }
            if state.finished {
                return state
                    .decoder
                    .finish()
                    .map(|data| (parse_event(&data), state));
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.decoder.push(chunk.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    state.decoder = SseDecoder::default();
                    return Some((Err(e.into()), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> Vec<std::result::Result<&'static [u8], RagError>> {
        parts.iter().map(|p| Ok(p.as_bytes())).collect()
    }

    #[test]
    fn test_decoder_splits_events() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\"");
        assert_eq!(decoder.next_event().as_deref(), Some("{\"a\":1}"));
        assert!(decoder.next_event().is_none());

        decoder.push(b":2}\r\n\r\n");
        assert_eq!(decoder.next_event().as_deref(), Some("{\"b\":2}"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_skips_comments() {
        let mut decoder = SseDecoder::default();
        decoder.push(b": keep-alive\n\ndata: x\n\n");
        assert_eq!(decoder.next_event().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_decode_sse_in_arrival_order() {
        let body = futures::stream::iter(chunks(&[
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\n",
            "\ndata: {\"candidates\":[{\"groundingMetadata\":{\"groundingChunks\":[]}}]}",
        ]));

        let fragments: Vec<_> = decode_sse(body).collect().await;
        assert_eq!(fragments.len(), 3);

        let texts: Vec<Option<String>> = fragments
            .iter()
            .map(|f| f.as_ref().unwrap().text())
            .collect();
        assert_eq!(texts, vec![Some("Hel".into()), Some("lo".into()), None]);
        assert!(fragments[2].as_ref().unwrap().candidates[0]
            .grounding_metadata
            .is_some());
    }

    #[tokio::test]
    async fn test_decode_sse_reports_malformed_payload() {
        let body = futures::stream::iter(chunks(&["data: not json\n\n"]));
        let fragments: Vec<_> = decode_sse(body).collect().await;
        assert_eq!(fragments.len(), 1);
        assert!(matches!(fragments[0], Err(RagError::Stream(_))));
    }

    #[tokio::test]
    async fn test_decode_sse_stops_after_transport_error() {
        let body = futures::stream::iter(vec![
            Ok(&b"data: {}\n\n"[..]),
            Err(RagError::Stream("connection reset".into())),
            Ok(&b"data: {}\n\n"[..]),
        ]);
        let fragments: Vec<_> = decode_sse(body).collect().await;
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].is_ok());
        assert!(fragments[1].is_err());
    }
}
