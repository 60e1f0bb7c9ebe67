//! Text transcoding between caller-facing UTF-8 and stored encodings.
//!
//! Encodings are looked up by label (WHATWG labels plus the short
//! aliases `utf8`, `latin1`, `binary`, `ucs2`, `utf16le`). Each one can be
//! applied to a whole buffer or as a stage over a [`ContentStream`], in which
//! case multi-byte sequences split across chunk boundaries are carried over
//! to the next chunk.
//!
//! Writing never substitutes: a character the target cannot represent, or
//! input that is not valid in its declared encoding, is an error.

use std::{fmt, io};

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, DecoderResult, Encoder, EncoderResult, Encoding};
use futures::{StreamExt, stream};

use crate::errors::{AdapterError, AdapterResult};
use crate::models::ContentStream;

/// A resolved text encoding.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// ISO-8859-1 proper: each byte is the code point of the same value.
    Latin1,
    Standard(&'static Encoding),
}

impl TextEncoding {
    pub fn utf8() -> Self {
        TextEncoding::Standard(encoding_rs::UTF_8)
    }

    /// Resolve an encoding label, failing with [`AdapterError::UnknownEncoding`].
    pub fn for_label(label: &str) -> AdapterResult<Self> {
        let lowered = label.trim().to_ascii_lowercase();
        let whatwg = match lowered.as_str() {
            // WHATWG folds these into windows-1252, which remaps 0x80-0x9F.
            "latin1" | "binary" | "l1" | "iso-8859-1" | "iso8859-1" => {
                return Ok(TextEncoding::Latin1);
            }
            "utf8" => "utf-8",
            "ucs2" | "ucs-2" | "utf16le" => "utf-16le",
            "utf16be" => "utf-16be",
            other => other,
        };
        Encoding::for_label(whatwg.as_bytes())
            .map(TextEncoding::Standard)
            .ok_or_else(|| AdapterError::UnknownEncoding(label.to_string()))
    }

    /// Resolve an optional label, defaulting to UTF-8.
    pub fn for_option(label: Option<&str>) -> AdapterResult<Self> {
        match label {
            Some(label) => Self::for_label(label),
            None => Ok(Self::utf8()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Latin1 => "ISO-8859-1",
            TextEncoding::Standard(encoding) => encoding.name(),
        }
    }

    /// Encode UTF-8 text into this encoding.
    pub fn encode(&self, text: &str) -> AdapterResult<Bytes> {
        let mut encoder = TextEncoder::new(*self);
        encoder.encode_chunk(text, true).map(Bytes::from)
    }

    /// Decode bytes in this encoding into text. Malformed input is replaced
    /// with U+FFFD.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let mut decoder = StreamDecoder::new(*self);
        decoder.decode_chunk(bytes, true)
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextEncoding").field(&self.name()).finish()
    }
}

/// Incremental decoder from a stored encoding to UTF-8.
///
/// Only the encoding's own byte-order mark is stripped; a BOM never switches
/// the decoder to another encoding.
pub struct StreamDecoder {
    name: &'static str,
    inner: Option<Decoder>,
}

impl StreamDecoder {
    pub fn new(encoding: TextEncoding) -> Self {
        let inner = match encoding {
            TextEncoding::Latin1 => None,
            TextEncoding::Standard(encoding) => Some(encoding.new_decoder_with_bom_removal()),
        };
        Self {
            name: encoding.name(),
            inner,
        }
    }

    /// Decode, replacing malformed sequences with U+FFFD.
    pub fn decode_chunk(&mut self, chunk: &[u8], last: bool) -> String {
        match &mut self.inner {
            None => chunk.iter().map(|&b| char::from(b)).collect(),
            Some(decoder) => decode_lossy(decoder, chunk, last),
        }
    }

    /// Decode, failing on the first malformed sequence.
    pub fn decode_chunk_strict(&mut self, chunk: &[u8], last: bool) -> AdapterResult<String> {
        match &mut self.inner {
            None => Ok(chunk.iter().map(|&b| char::from(b)).collect()),
            Some(decoder) => decode_strict(decoder, chunk, last, self.name),
        }
    }
}

enum EncoderKind {
    Latin1,
    Utf16Le,
    Utf16Be,
    Standard(Encoder),
}

/// Incremental encoder from text to a stored encoding.
struct TextEncoder {
    name: &'static str,
    kind: EncoderKind,
}

impl TextEncoder {
    fn new(encoding: TextEncoding) -> Self {
        let kind = match encoding {
            TextEncoding::Latin1 => EncoderKind::Latin1,
            // encoding_rs only decodes UTF-16.
            TextEncoding::Standard(e) if e == encoding_rs::UTF_16LE => EncoderKind::Utf16Le,
            TextEncoding::Standard(e) if e == encoding_rs::UTF_16BE => EncoderKind::Utf16Be,
            TextEncoding::Standard(e) => EncoderKind::Standard(e.new_encoder()),
        };
        Self {
            name: encoding.name(),
            kind,
        }
    }

    fn encode_chunk(&mut self, text: &str, last: bool) -> AdapterResult<Vec<u8>> {
        match &mut self.kind {
            EncoderKind::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(c).map_err(|_| AdapterError::UnencodableText {
                        encoding: self.name,
                        character: c,
                    })
                })
                .collect(),
            EncoderKind::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            EncoderKind::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            EncoderKind::Standard(encoder) => encode_strict(encoder, text, last, self.name),
        }
    }
}

/// Decode a stream of stored bytes into a stream of UTF-8 bytes.
pub fn decode_stream(source: ContentStream, encoding: TextEncoding) -> ContentStream {
    let mut decoder = StreamDecoder::new(encoding);
    transcode(source, move |chunk, last| {
        Ok(decoder.decode_chunk(chunk, last).into_bytes())
    })
}

/// Check that a stream is valid text in `encoding` on its way to storage.
///
/// Incoming bytes are decoded from `encoding` and encoded back into it, so
/// what is stored reads back with the same label. Malformed input ends the
/// stream with an [`io::ErrorKind::InvalidData`] error.
pub fn recode_stream(source: ContentStream, encoding: TextEncoding) -> ContentStream {
    let mut decoder = StreamDecoder::new(encoding);
    let mut encoder = TextEncoder::new(encoding);
    transcode(source, move |chunk, last| {
        let text = decoder.decode_chunk_strict(chunk, last)?;
        Ok(encoder.encode_chunk(&text, last)?)
    })
}

fn transcode<F>(source: ContentStream, step: F) -> ContentStream
where
    F: FnMut(&[u8], bool) -> io::Result<Vec<u8>> + Send + 'static,
{
    stream::unfold(
        (source, step, false),
        |(mut source, mut step, finished)| async move {
            if finished {
                return None;
            }
            loop {
                match source.next().await {
                    Some(Ok(chunk)) => match step(&chunk, false) {
                        Ok(out) if out.is_empty() => continue,
                        Ok(out) => return Some((Ok(Bytes::from(out)), (source, step, false))),
                        Err(err) => return Some((Err(err), (source, step, true))),
                    },
                    Some(Err(err)) => return Some((Err(err), (source, step, true))),
                    None => {
                        return match step(&[], true) {
                            Ok(tail) if tail.is_empty() => None,
                            Ok(tail) => Some((Ok(Bytes::from(tail)), (source, step, true))),
                            Err(err) => Some((Err(err), (source, step, true))),
                        };
                    }
                }
            }
        },
    )
    .boxed()
}

fn decode_lossy(decoder: &mut Decoder, mut src: &[u8], last: bool) -> String {
    let mut out = String::with_capacity(
        decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 16),
    );
    loop {
        let (result, read, _) = decoder.decode_to_string(src, &mut out, last);
        src = &src[read..];
        match result {
            CoderResult::InputEmpty => return out,
            CoderResult::OutputFull => out.reserve(src.len() * 3 + 16),
        }
    }
}

fn decode_strict(
    decoder: &mut Decoder,
    mut src: &[u8],
    last: bool,
    name: &'static str,
) -> AdapterResult<String> {
    let mut out = String::with_capacity(
        decoder
            .max_utf8_buffer_length_without_replacement(src.len())
            .unwrap_or(src.len() * 3 + 16),
    );
    loop {
        let (result, read) = decoder.decode_to_string_without_replacement(src, &mut out, last);
        src = &src[read..];
        match result {
            DecoderResult::InputEmpty => return Ok(out),
            DecoderResult::OutputFull => out.reserve(src.len() * 3 + 16),
            DecoderResult::Malformed(_, _) => {
                return Err(AdapterError::MalformedText { encoding: name });
            }
        }
    }
}

fn encode_strict(
    encoder: &mut Encoder,
    mut src: &str,
    last: bool,
    name: &'static str,
) -> AdapterResult<Vec<u8>> {
    let mut out = Vec::with_capacity(
        encoder
            .max_buffer_length_from_utf8_without_replacement(src.len())
            .unwrap_or(src.len() * 4 + 16),
    );
    loop {
        let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(src, &mut out, last);
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => return Ok(out),
            EncoderResult::OutputFull => out.reserve(src.len() * 4 + 16),
            EncoderResult::Unmappable(character) => {
                return Err(AdapterError::UnencodableText {
                    encoding: name,
                    character,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn chunks(parts: &[&'static [u8]]) -> ContentStream {
        let parts: Vec<io::Result<Bytes>> = parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        stream::iter(parts).boxed()
    }

    #[test]
    fn resolves_short_aliases() {
        assert_eq!(TextEncoding::for_label("utf8").unwrap().name(), "UTF-8");
        assert_eq!(TextEncoding::for_label("UTF-8").unwrap().name(), "UTF-8");
        assert_eq!(TextEncoding::for_label("ucs2").unwrap().name(), "UTF-16LE");
        assert_eq!(TextEncoding::for_label("latin1").unwrap(), TextEncoding::Latin1);
        assert_eq!(TextEncoding::for_label("binary").unwrap(), TextEncoding::Latin1);
        assert_eq!(TextEncoding::for_label("windows-1252").unwrap().name(), "windows-1252");
        assert!(matches!(
            TextEncoding::for_label("klingon"),
            Err(AdapterError::UnknownEncoding(label)) if label == "klingon"
        ));
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        let latin1 = TextEncoding::Latin1;
        let encoded = latin1.encode("café\u{85}").unwrap();
        assert_eq!(&encoded[..], b"caf\xe9\x85");
        assert_eq!(latin1.decode(&encoded), "café\u{85}");
        assert_eq!(latin1.decode(b"\x80\x9f"), "\u{80}\u{9f}");
    }

    #[test]
    fn unencodable_characters_are_errors() {
        let err = TextEncoding::Latin1.encode("日本").unwrap_err();
        assert!(matches!(err, AdapterError::UnencodableText { character: '日', .. }));

        let cp1252 = TextEncoding::for_label("windows-1252").unwrap();
        let err = cp1252.encode("x日y").unwrap_err();
        assert!(matches!(err, AdapterError::UnencodableText { character: '日', .. }));
    }

    #[test]
    fn foreign_byte_order_marks_are_plain_text() {
        assert_eq!(TextEncoding::Latin1.decode(b"\xff\xfeab"), "ÿþab");
        let cp1252 = TextEncoding::for_label("windows-1252").unwrap();
        assert_eq!(cp1252.decode(b"\xef\xbb\xbfhi"), "ï»¿hi");
        assert_eq!(TextEncoding::utf8().decode(b"\xef\xbb\xbfhi"), "hi");
    }

    #[test]
    fn utf16_is_encoded_as_utf16() {
        let utf16 = TextEncoding::for_label("utf16le").unwrap();
        assert_eq!(&utf16.encode("hi").unwrap()[..], b"h\0i\0");
        assert_eq!(utf16.decode(b"h\0i\0"), "hi");

        let be = TextEncoding::for_label("utf-16be").unwrap();
        assert_eq!(&be.encode("hi").unwrap()[..], b"\0h\0i");
    }

    #[tokio::test]
    async fn decode_stream_joins_split_sequences() {
        // "é" is 0xC3 0xA9 in UTF-8; split it across two chunks.
        let source = chunks(&[b"caf\xc3", b"\xa9!"]);
        let out: Vec<Bytes> = decode_stream(source, TextEncoding::utf8())
            .try_collect()
            .await
            .unwrap();
        let joined: Vec<u8> = out.concat();
        assert_eq!(String::from_utf8(joined).unwrap(), "café!");
    }

    #[tokio::test]
    async fn recode_stream_keeps_valid_input() {
        let source = chunks(&[b"caf", b"\xe9"]);
        let out: Vec<Bytes> = recode_stream(source, TextEncoding::Latin1)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.concat(), b"caf\xe9".to_vec());

        // A UTF-16 code unit split across chunks.
        let source = chunks(&[b"h", b"\0\xe9\0"]);
        let utf16 = TextEncoding::for_label("utf16le").unwrap();
        let out: Vec<Bytes> = recode_stream(source, utf16).try_collect().await.unwrap();
        assert_eq!(out.concat(), b"h\0\xe9\0".to_vec());
    }

    #[tokio::test]
    async fn recode_stream_rejects_malformed_input() {
        let source = chunks(&[b"caf\xe9"]);
        let result: io::Result<Vec<Bytes>> =
            recode_stream(source, TextEncoding::utf8()).try_collect().await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[tokio::test]
    async fn stream_errors_end_the_stream() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(io::Error::other("connection reset")),
            Ok(Bytes::from_static(b"never")),
        ])
        .boxed();
        let items: Vec<io::Result<Bytes>> = decode_stream(source, TextEncoding::utf8()).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
