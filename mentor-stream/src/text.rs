use std::pin::Pin;

use futures_core::Stream;
use futures_util::{stream, StreamExt};

use mentor_transport::{ByteStream, TransportError};

/// Plain text as it arrives, one piece per chunk.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Incremental UTF-8 decoding.
///
/// A multi-byte character split across chunks is held back until the rest of
/// it arrives. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the text `chunk` completes to `out`.
    pub fn decode(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                }
                Err(err) => {
                    let valid = start + err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid + len;
                        }
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }

    /// End of input: a truncated character becomes U+FFFD.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }
}

/// Adapt a plain-text response body. A source error is yielded once and ends
/// the stream.
pub fn decode_text(source: ByteStream) -> TextStream {
    let state = (source, Some(Utf8Decoder::new()));

    Box::pin(stream::unfold(state, |(mut source, mut utf8)| async move {
        loop {
            let decoder = utf8.as_mut()?;
            let mut text = String::new();
            match source.next().await {
                Some(Ok(chunk)) => decoder.decode(&chunk, &mut text),
                Some(Err(err)) => return Some((Err(err), (source, None))),
                None => {
                    decoder.finish(&mut text);
                    utf8 = None;
                    if text.is_empty() {
                        return None;
                    }
                }
            }
            if !text.is_empty() {
                return Some((Ok(text), (source, utf8)));
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn source(chunks: Vec<Result<Bytes, TransportError>>) -> ByteStream {
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn split_characters_are_joined() {
        let text = "Mitochondria – the cell's powerhouse ⚡";
        let bytes = text.as_bytes();

        for at in 0..=bytes.len() {
            let (a, b) = bytes.split_at(at);
            let pieces: Vec<String> = decode_text(source(vec![
                Ok(Bytes::copy_from_slice(a)),
                Ok(Bytes::copy_from_slice(b)),
            ]))
            .map(|piece| piece.unwrap())
            .collect()
            .await;
            assert_eq!(pieces.concat(), text, "split at byte {at}");
            assert!(pieces.iter().all(|p| !p.is_empty()));
        }
    }

    #[tokio::test]
    async fn truncated_tail_is_replaced() {
        let pieces: Vec<_> = decode_text(source(vec![Ok(Bytes::from_static(b"ok \xE2\x9A"))]))
            .collect()
            .await;

        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].as_deref().unwrap(), "ok ");
        assert_eq!(pieces[1].as_deref().unwrap(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn source_error_ends_text() {
        let pieces: Vec<_> = decode_text(source(vec![
            Ok(Bytes::from_static(b"Light bends")),
            Err(TransportError::network("stream error: reset")),
            Ok(Bytes::from_static(b" never seen")),
        ]))
        .collect()
        .await;

        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].as_deref().unwrap(), "Light bends");
        assert!(pieces[1].is_err());
    }
}
