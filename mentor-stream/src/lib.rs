use std::collections::VecDeque;
use std::pin::Pin;

use futures_core::Stream;
use futures_util::{stream, StreamExt};
use tracing::debug;

use mentor_transport::{ByteStream, TransportError};
use mentor_types::StreamEvent;

pub mod text;
pub use text::{decode_text, TextStream, Utf8Decoder};

/// Decoded generation events, in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, TransportError>> + Send>>;

/// Incremental decoder for newline-delimited JSON records.
///
/// Chunks may split records and multi-byte characters anywhere. Blank lines
/// are skipped; lines that are not a known record are counted and dropped.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: String,
    utf8: Utf8Decoder,
    dropped: usize,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the records it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.utf8.decode(chunk, &mut self.buffer);

        let Some(cut) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(cut + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete
            .split('\n')
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// End of input: the unterminated remainder is parsed as a last record.
    pub fn finish(mut self) -> Vec<StreamEvent> {
        self.utf8.finish(&mut self.buffer);
        let rest = std::mem::take(&mut self.buffer);
        let out: Vec<StreamEvent> = self.parse_line(&rest).into_iter().collect();
        if self.dropped > 0 {
            debug!(dropped = self.dropped, "stream ended with dropped records");
        }
        out
    }

    /// Lines discarded so far as unparsable.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn parse_line(&mut self, line: &str) -> Option<StreamEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(event) => Some(event),
            Err(err) => {
                self.dropped += 1;
                debug!(error = %err, len = line.len(), "dropping unparsable stream record");
                None
            }
        }
    }
}

struct DecodeState {
    source: ByteStream,
    decoder: Option<EventStreamDecoder>,
    ready: VecDeque<Result<StreamEvent, TransportError>>,
}

/// Adapt a response body into decoded events. A source error is yielded once
/// and ends the stream.
pub fn decode_stream(source: ByteStream) -> EventStream {
    let state = DecodeState {
        source,
        decoder: Some(EventStreamDecoder::new()),
        ready: VecDeque::new(),
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            let decoder = st.decoder.as_mut()?;
            match st.source.next().await {
                Some(Ok(chunk)) => st.ready.extend(decoder.push(&chunk).into_iter().map(Ok)),
                Some(Err(err)) => {
                    st.decoder = None;
                    st.ready.push_back(Err(err));
                }
                None => {
                    if let Some(decoder) = st.decoder.take() {
                        st.ready.extend(decoder.finish().into_iter().map(Ok));
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    const RECORDS: &str = concat!(
        r#"{"type":"status","message":"Drafting plan – étape 1 ✓"}"#,
        "\n",
        r#"{"type":"draft","version":1,"plan":{"exam_name":"NEET","total_days":3}}"#,
        "\n",
        r#"{"type":"verification","version":1,"result":{"is_valid":true}}"#,
        "\n",
    );

    fn decode_all(chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = EventStreamDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn every_split_point_decodes_identically() {
        let bytes = RECORDS.as_bytes();
        let whole = decode_all(&[bytes]);
        assert_eq!(whole.len(), 3);

        // Includes splits inside the multi-byte characters of the status message.
        for at in 0..=bytes.len() {
            let (a, b) = bytes.split_at(at);
            assert_eq!(decode_all(&[a, b]), whole, "split at byte {at}");
        }
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&singles), whole);
    }

    #[test]
    fn malformed_line_is_dropped_between_good_records() {
        let input = concat!(
            r#"{"type":"status","message":"a"}"#,
            "\n{not json\n",
            r#"{"type":"heartbeat"}"#,
            "\n\n",
            r#"{"type":"status","message":"b"}"#,
            "\r\n",
        );
        let mut decoder = EventStreamDecoder::new();
        let events = decoder.push(input.as_bytes());
        assert_eq!(
            events,
            vec![
                StreamEvent::Status { message: "a".into() },
                StreamEvent::Status { message: "b".into() },
            ]
        );
        assert_eq!(decoder.dropped(), 2);
    }

    #[test]
    fn unterminated_last_record_is_parsed_at_end() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.push(br#"{"type":"status","message":"done"}"#).is_empty());
        assert_eq!(
            decoder.finish(),
            vec![StreamEvent::Status { message: "done".into() }]
        );

        let mut decoder = EventStreamDecoder::new();
        decoder.push(br#"{"type":"status","#);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut decoder = EventStreamDecoder::new();
        let mut input = br#"{"type":"status","message":"x"#.to_vec();
        input.push(0xFF);
        input.extend_from_slice(b"\"}\n");
        assert_eq!(
            decoder.push(&input),
            vec![StreamEvent::Status { message: "x\u{FFFD}".into() }]
        );
    }

    #[tokio::test]
    async fn decode_stream_yields_source_error_once_then_ends() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"{\"type\":\"status\",\"message\":\"one\"}\n{\"type\":")),
            Err(TransportError::network("stream error: reset")),
            Ok(Bytes::from_static(b"\"status\",\"message\":\"late\"}\n")),
        ];
        let source: ByteStream = Box::pin(stream::iter(chunks));

        let items: Vec<_> = decode_stream(source).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().unwrap(),
            &StreamEvent::Status { message: "one".into() }
        );
        assert!(items[1].as_ref().unwrap_err().cause.contains("reset"));
    }

    #[tokio::test]
    async fn decode_stream_flushes_remainder() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"{\"type\":\"status\",")),
            Ok(Bytes::from_static(b"\"message\":\"tail\"}")),
        ];
        let source: ByteStream = Box::pin(stream::iter(chunks));

        let items: Vec<_> = decode_stream(source).collect().await;

        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].as_ref().unwrap(),
            &StreamEvent::Status { message: "tail".into() }
        );
    }
}
