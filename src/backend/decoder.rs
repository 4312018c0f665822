//! Event frame decoder
//!
//! Turns the raw response body of a chat stream into typed [`StreamEvent`]s.
//! Frames are newline-delimited `data:` lines; a `[DONE]` payload ends the
//! sequence. Anything that does not decode is skipped, never surfaced.

use super::types::{RawFrame, StreamEvent};
use super::BackendError;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use std::io;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;

/// Prefix marking a data frame
pub const DATA_PREFIX: &str = "data:";

/// Payload that terminates the sequence
pub const END_MARKER: &str = "[DONE]";

/// Boxed stream of decoded events; ends after the end marker or at EOF
pub type EventStream = BoxStream<'static, Result<StreamEvent, BackendError>>;

/// A complete, classified frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(StreamEvent),
    End,
}

/// Line-oriented codec over the response body.
///
/// Only complete lines are classified; a partial line stays buffered until
/// the rest of it arrives. Once the end marker has been seen every further
/// byte is dropped.
#[derive(Debug, Default)]
pub struct FrameCodec {
    finished: bool,
    /// Lines discarded so far (non-data lines and malformed payloads)
    skipped: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn classify(&mut self, line: &[u8]) -> Option<Frame> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Ok(line) = std::str::from_utf8(line) else {
            self.skipped += 1;
            return None;
        };
        // Blank keep-alive separators between frames are expected
        if line.is_empty() {
            return None;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            self.skipped += 1;
            return None;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        if payload == END_MARKER {
            return Some(Frame::End);
        }
        match serde_json::from_str::<RawFrame>(payload)
            .ok()
            .and_then(RawFrame::into_event)
        {
            Some(event) => Some(Frame::Event(event)),
            None => {
                self.skipped += 1;
                tracing::debug!(payload = %payload, "Discarding undecodable frame");
                None
            }
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            if self.finished {
                buf.clear();
                return Ok(None);
            }
            let Some(newline) = buf.iter().position(|b| *b == b'\n') else {
                return Ok(None);
            };
            let line = buf.split_to(newline + 1);
            if let Some(frame) = self.classify(&line[..newline]) {
                if frame == Frame::End {
                    self.finished = true;
                }
                return Ok(Some(frame));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        let frame = self.decode(buf)?;
        if frame.is_none() && !buf.is_empty() {
            // Incomplete trailing frame
            tracing::debug!(bytes = buf.len(), "Discarding partial frame at end of stream");
            buf.clear();
        }
        if frame.is_none() && self.skipped > 0 {
            tracing::debug!(skipped = self.skipped, "Stream ended with discarded lines");
        }
        Ok(frame)
    }
}

/// Decode a body byte stream into events.
///
/// The returned stream yields events in arrival order, ends without an item
/// at the end marker (or at EOF), and surfaces transport faults as
/// [`BackendError`]s with kind `Network`.
pub fn decode_events<S, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let reader = StreamReader::new(body.map_err(io::Error::other));
    FramedRead::new(reader, FrameCodec::new())
        .map_err(|e| BackendError::network(e.to_string()))
        .take_while(|frame| std::future::ready(!matches!(frame, Ok(Frame::End))))
        .filter_map(|frame| {
            std::future::ready(match frame {
                Ok(Frame::Event(event)) => Some(Ok(event)),
                Ok(Frame::End) => None,
                Err(e) => Some(Err(e)),
            })
        })
        .boxed()
}

/// Decode an in-memory list of chunks
#[cfg(test)]
pub fn decode_chunks<I, C>(chunks: I) -> EventStream
where
    I: IntoIterator<Item = C>,
    C: Into<Bytes>,
{
    let chunks: Vec<Result<Bytes, io::Error>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
    decode_events(futures::stream::iter(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn collect(stream: EventStream) -> Vec<Result<StreamEvent, BackendError>> {
        stream.collect().await
    }

    fn token(content: &str, done: bool) -> StreamEvent {
        StreamEvent::Token {
            content: content.to_string(),
            done,
        }
    }

    #[tokio::test]
    async fn test_decodes_frames_in_order() {
        let body = concat!(
            "data: {\"event\":\"token\",\"content\":\"Hel\",\"done\":false}\n\n",
            "data: {\"event\":\"token\",\"content\":\"lo\",\"done\":true}\n\n",
            "data: [DONE]\n\n",
        );
        let events: Vec<_> = collect(decode_chunks([body]))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(events, vec![token("Hel", false), token("lo", true)]);
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks() {
        let chunks = [
            "data: {\"event\":\"thin",
            "king\",\"content\":\"hmm\"}",
            "\r\n\r\ndata: [DO",
            "NE]\n",
        ];
        let events: Vec<_> = collect(decode_chunks(chunks))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            events,
            vec![StreamEvent::Thinking {
                content: "hmm".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_every_split_point_yields_same_events() {
        let body = "data: {\"event\":\"token\",\"content\":\"αβ\"}\ndata: {\"event\":\"error\",\"content\":\"x\"}\ndata: [DONE]\n";
        let bytes = body.as_bytes();
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            let events: Vec<_> = collect(decode_chunks([a.to_vec(), b.to_vec()]))
                .await
                .into_iter()
                .map(Result::unwrap)
                .collect();
            assert_eq!(
                events,
                vec![
                    token("αβ", false),
                    StreamEvent::Error {
                        content: "x".to_string()
                    }
                ],
                "split at {split}"
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_skipped() {
        let body = concat!(
            "data: {\"event\":\"token\",\"content\":\"a\"}\n",
            "data: not json at all\n",
            ": keep-alive comment\n",
            "event: message\n",
            "data: {\"event\":\"token\",\"content\":\"b\"}\n",
            "data: [DONE]\n",
        );
        let events: Vec<_> = collect(decode_chunks([body]))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(events, vec![token("a", false), token("b", false)]);
    }

    #[tokio::test]
    async fn test_nothing_emitted_after_end_marker() {
        let body = concat!(
            "data: [DONE]\n",
            "data: {\"event\":\"token\",\"content\":\"late\"}\n",
        );
        assert!(collect(decode_chunks([body])).await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_trailing_frame_discarded() {
        let body = "data: {\"event\":\"token\",\"content\":\"a\"}\ndata: {\"event\":\"token\",\"content\":\"b\"}";
        let events: Vec<_> = collect(decode_chunks([body]))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(events, vec![token("a", false)]);
    }

    #[tokio::test]
    async fn test_transport_fault_surfaces_as_network_error() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"event\":\"token\",\"content\":\"a\"}\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let items = collect(decode_events(stream::iter(chunks))).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &token("a", false));
        let err = items[1].as_ref().unwrap_err();
        assert_eq!(err.kind, crate::backend::BackendErrorKind::Network);
    }

    #[test]
    fn test_codec_counts_skipped_lines() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("garbage\ndata: {oops\ndata: [DONE]\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::End));
        assert_eq!(codec.skipped, 2);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
