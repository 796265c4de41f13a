//! Configuring the document and its export.
//!
//! [`DocumentProperties`] describes the document itself: its metadata, the default
//! page geometry and the print standard it should conform to. [`SerializeSettings`]
//! only affects how the bytes are written, not what the document looks like.

use pdf_writer::Pdf;
use xmp_writer::XmpWriter;

use crate::color::DeviceColorSpace;
use crate::metadata::DateTime;
use crate::page::PageProperties;

/// The PDF version of the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PdfVersion {
    /// PDF 1.4.
    Pdf14,
    /// PDF 1.5.
    Pdf15,
    /// PDF 1.6.
    Pdf16,
    /// PDF 1.7.
    Pdf17,
    /// PDF 2.0.
    Pdf20,
}

impl PdfVersion {
    pub(crate) fn write_xmp(&self, xmp: &mut XmpWriter) {
        xmp.pdf_version(self.as_number());
    }

    pub(crate) fn as_number(&self) -> &'static str {
        match self {
            PdfVersion::Pdf14 => "1.4",
            PdfVersion::Pdf15 => "1.5",
            PdfVersion::Pdf16 => "1.6",
            PdfVersion::Pdf17 => "1.7",
            PdfVersion::Pdf20 => "2.0",
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            PdfVersion::Pdf14 => "PDF-1.4",
            PdfVersion::Pdf15 => "PDF-1.5",
            PdfVersion::Pdf16 => "PDF-1.6",
            PdfVersion::Pdf17 => "PDF-1.7",
            PdfVersion::Pdf20 => "PDF-2.0",
        }
    }

    pub(crate) fn set_version(&self, pdf: &mut Pdf) {
        match self {
            PdfVersion::Pdf14 => pdf.set_version(1, 4),
            PdfVersion::Pdf15 => pdf.set_version(1, 5),
            PdfVersion::Pdf16 => pdf.set_version(1, 6),
            PdfVersion::Pdf17 => pdf.set_version(1, 7),
            PdfVersion::Pdf20 => pdf.set_version(2, 0),
        };
    }
}

/// The standard an output intent declares conformance to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputIntentSubtype {
    /// PDF/X, for prepress exchange.
    PdfX,
    /// PDF/A, for archival.
    PdfA,
}

impl OutputIntentSubtype {
    pub(crate) fn to_pdf(self) -> pdf_writer::Name<'static> {
        match self {
            OutputIntentSubtype::PdfX => pdf_writer::Name(b"GTS_PDFX"),
            OutputIntentSubtype::PdfA => pdf_writer::Name(b"GTS_PDFA1"),
        }
    }
}

/// The intended output device of the document.
///
/// The profile is the ICC profile of the output condition, for example a
/// coated FOGRA39 CMYK profile for offset printing.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputIntent {
    /// The standard to conform to.
    pub subtype: OutputIntentSubtype,
    /// The name of the output condition, e.g. `"FOGRA39"`.
    pub identifier: String,
    /// The raw bytes of the destination ICC profile.
    pub profile: Vec<u8>,
}

/// Properties of the document as a whole.
#[derive(Clone, Debug)]
pub struct DocumentProperties {
    /// The title of the document.
    pub title: Option<String>,
    /// The author of the document.
    pub author: Option<String>,
    /// The application that created the document.
    pub creator: Option<String>,
    /// A short description of the document.
    pub subject: Option<String>,
    /// The natural language of the document, as a BCP 47 tag.
    pub language: Option<String>,
    /// When the document was created.
    pub creation_date: Option<DateTime>,
    /// Whether the document should be written as a tagged PDF.
    pub tagged: bool,
    /// The page properties of every page that doesn't override them.
    pub default_page_properties: PageProperties,
    /// The output intent and conformance level.
    pub output_intent: Option<OutputIntent>,
    /// The PDF version of the output.
    pub pdf_version: PdfVersion,
    /// The colorspace device colors are converted to when they are set.
    pub output_colorspace: DeviceColorSpace,
}

impl Default for DocumentProperties {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            creator: None,
            subject: None,
            language: None,
            creation_date: None,
            tagged: false,
            default_page_properties: PageProperties::a4(),
            output_intent: None,
            pdf_version: PdfVersion::Pdf17,
            output_colorspace: DeviceColorSpace::Rgb,
        }
    }
}

/// Settings that should be applied when serializing a document.
#[derive(Clone, Debug)]
pub struct SerializeSettings {
    /// Whether content streams should be compressed. Leads to significantly smaller file sizes,
    /// but also longer running times.
    pub compress_content_streams: bool,
    /// Whether the PDF should only consist of characters in the ASCII range.
    ///
    /// Binary streams will be hex encoded. The binary marker in the file header is
    /// replaced with an ASCII one.
    pub ascii_compatible: bool,
    /// Whether the PDF should contain XMP metadata.
    ///
    /// Always enabled for documents with an output intent, since both PDF/X and
    /// PDF/A require it.
    pub xmp_metadata: bool,
}

impl Default for SerializeSettings {
    fn default() -> Self {
        Self {
            compress_content_streams: true,
            ascii_compatible: false,
            xmp_metadata: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_ordered() {
        assert!(PdfVersion::Pdf14 < PdfVersion::Pdf17);
        assert_eq!(PdfVersion::Pdf20.as_str(), "PDF-2.0");
    }

    #[test]
    fn default_page_is_a4() {
        let properties = DocumentProperties::default();
        let media = properties
            .default_page_properties
            .media_box
            .unwrap();
        assert_eq!(media.width(), 595.28);
        assert_eq!(media.height(), 841.89);
        assert!(!properties.tagged);
    }
}
