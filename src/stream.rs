//! Stream filters.
//!
//! All streams that capypdf writes go through a [`FilterStreamBuilder`], which
//! applies the filters that the serialize settings ask for and remembers them so
//! that the `/Filter` entry can be written alongside the encoded data.

use std::borrow::Cow;

use pdf_writer::{Array, Dict, Name};

use crate::configure::SerializeSettings;
use crate::geom::Rect;
use crate::resource::ResourceDictionary;

/// The finished content of a draw context.
#[derive(Debug, Clone)]
pub(crate) struct Stream {
    pub(crate) content: Vec<u8>,
    pub(crate) bbox: Rect,
    pub(crate) resource_dictionary: ResourceDictionary,
}

impl Stream {
    pub(crate) fn new(content: Vec<u8>, bbox: Rect, resource_dictionary: ResourceDictionary) -> Self {
        Self {
            content,
            bbox,
            resource_dictionary,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StreamFilter {
    Flate,
    AsciiHex,
    Dct,
}

impl StreamFilter {
    fn name(self) -> Name<'static> {
        Name(match self {
            Self::Flate => b"FlateDecode",
            Self::AsciiHex => b"ASCIIHexDecode",
            Self::Dct => b"DCTDecode",
        })
    }
}

/// Encodes stream data and tracks which filters a reader needs to decode it.
pub(crate) struct FilterStreamBuilder<'a> {
    data: Cow<'a, [u8]>,
    filters: Vec<StreamFilter>,
}

impl<'a> FilterStreamBuilder<'a> {
    fn raw(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
            filters: Vec::new(),
        }
    }

    /// Content streams are only compressed if the settings ask for it.
    pub(crate) fn new_from_content_stream(data: &'a [u8], settings: &SerializeSettings) -> Self {
        let builder = Self::raw(data);

        if settings.compress_content_streams {
            builder.encode(StreamFilter::Flate, deflate_encode)
        } else {
            builder
        }
    }

    /// Data that is zlib compressed already.
    pub(crate) fn new_from_deflated(data: &'a [u8]) -> Self {
        Self::raw(data).declare(StreamFilter::Flate)
    }

    pub(crate) fn new_from_binary_data(data: &'a [u8]) -> Self {
        Self::raw(data).encode(StreamFilter::Flate, deflate_encode)
    }

    pub(crate) fn new_from_jpeg_data(data: &'a [u8]) -> Self {
        Self::raw(data).declare(StreamFilter::Dct)
    }

    pub(crate) fn finish(self, settings: &SerializeSettings) -> FilterStream<'a> {
        let binary = matches!(
            self.filters.last(),
            Some(StreamFilter::Flate | StreamFilter::Dct)
        );

        let builder = if settings.ascii_compatible && binary {
            self.encode(StreamFilter::AsciiHex, hex_encode)
        } else {
            self
        };

        FilterStream {
            data: builder.data,
            filters: builder.filters,
        }
    }

    fn encode(mut self, filter: StreamFilter, encoder: fn(&[u8]) -> Vec<u8>) -> Self {
        self.data = Cow::Owned(encoder(&self.data));
        self.declare(filter)
    }

    fn declare(mut self, filter: StreamFilter) -> Self {
        self.filters.push(filter);
        self
    }
}

pub(crate) struct FilterStream<'a> {
    data: Cow<'a, [u8]>,
    filters: Vec<StreamFilter>,
}

impl FilterStream<'_> {
    pub(crate) fn encoded_data(&self) -> &[u8] {
        &self.data
    }

    /// Filters are listed in decoding order, the reverse of the encoding order.
    pub(crate) fn write_filters(&self, dict: &mut Dict) {
        match self.filters.as_slice() {
            [] => {}
            [filter] => {
                dict.pair(Name(b"Filter"), filter.name());
            }
            filters => {
                dict.insert(Name(b"Filter"))
                    .start::<Array>()
                    .items(filters.iter().rev().map(|f| f.name()));
            }
        }
    }
}

pub(crate) fn deflate_encode(data: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(data, 6)
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";
const HEX_LINE_BYTES: usize = 35;

fn hex_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + data.len() / HEX_LINE_BYTES + 1);

    for line in data.chunks(HEX_LINE_BYTES) {
        for byte in line {
            out.push(HEX_DIGITS[usize::from(byte >> 4)]);
            out.push(HEX_DIGITS[usize::from(byte & 0x0F)]);
        }
        out.push(b'\n');
    }

    // End of data marker.
    out.push(b'>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_streams_are_left_alone_without_compression() {
        let settings = SerializeSettings {
            compress_content_streams: false,
            ..SerializeSettings::default()
        };

        let stream = FilterStreamBuilder::new_from_content_stream(b"0 0 m", &settings)
            .finish(&settings);
        assert_eq!(stream.encoded_data(), b"0 0 m");
    }

    #[test]
    fn ascii_compatible_streams_are_hex_encoded() {
        let settings = SerializeSettings {
            ascii_compatible: true,
            ..SerializeSettings::default()
        };

        let stream = FilterStreamBuilder::new_from_binary_data(&[0, 1, 2]).finish(&settings);
        assert!(stream.encoded_data().iter().all(|b| b.is_ascii()));
        assert_eq!(
            stream.filters,
            vec![StreamFilter::Flate, StreamFilter::AsciiHex]
        );
    }

    #[test]
    fn hex_lines_are_wrapped() {
        let encoded = hex_encode(&[0xAB; 40]);
        let text = std::str::from_utf8(&encoded).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 70);
        assert_eq!(lines[1], "ABABABABAB");
        assert_eq!(lines[2], ">");
    }

    #[test]
    fn deflate_round_trips() {
        let data = b"BT /F0 12 Tf ET".repeat(10);
        let encoded = deflate_encode(&data);
        let decoded = miniz_oxide::inflate::decompress_to_vec_zlib(&encoded).unwrap();
        assert_eq!(decoded, data);
    }
}
