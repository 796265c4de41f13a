//! Document metadata.
//!
//! The metadata is taken from the [`DocumentProperties`] and written twice: once
//! into the document information dictionary and once as an XMP packet. PDF/X
//! and PDF/A readers look at both, so both always carry the same values.
//!
//! [`DocumentProperties`]: crate::configure::DocumentProperties

use pdf_writer::{Finish, Name, Pdf, Ref, TextStr};
use xmp_writer::{LangId, Timezone, XmpWriter};

use crate::configure::{DocumentProperties, OutputIntentSubtype, PdfVersion};
use crate::error::{CapyError, CapyResult};

const PRODUCER: &str = concat!("capypdf ", env!("CARGO_PKG_VERSION"));
const PDFX_VERSION: &str = "PDF/X-3:2003";

/// A point in time, used for the creation date of the document.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DateTime {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    utc_offset: Option<(i8, u8)>,
}

impl DateTime {
    /// A date and time in UTC.
    ///
    /// Fails if any field is out of range. Days are only checked against 31.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> CapyResult<Self> {
        let in_range = year <= 9999
            && (1..=12).contains(&month)
            && (1..=31).contains(&day)
            && hour < 24
            && minute < 60
            && second < 60;

        if !in_range {
            return Err(CapyError::invalid(format!(
                "Invalid date {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}."
            )));
        }

        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            utc_offset: None,
        })
    }

    /// Mark the time as local to a timezone. The minutes have the sign of the hours.
    pub fn with_utc_offset(mut self, hours: i8, minutes: u8) -> CapyResult<Self> {
        if !(-23..=23).contains(&hours) || minutes > 59 {
            return Err(CapyError::invalid(format!(
                "Invalid UTC offset {hours}:{minutes:02}."
            )));
        }

        self.utc_offset = Some((hours, minutes));
        Ok(self)
    }

    fn to_pdf(self) -> pdf_writer::Date {
        let (hours, minutes) = self.utc_offset.unwrap_or((0, 0));

        pdf_writer::Date::new(self.year)
            .month(self.month)
            .day(self.day)
            .hour(self.hour)
            .minute(self.minute)
            .second(self.second)
            .utc_offset_hour(hours)
            .utc_offset_minute(minutes)
    }

    fn to_xmp(self) -> xmp_writer::DateTime {
        let timezone = match self.utc_offset {
            Some((hour, minute)) => Timezone::Local {
                hour,
                // Both values are in range, see `with_utc_offset`.
                minute: minute as i8,
            },
            None => Timezone::Utc,
        };

        xmp_writer::DateTime {
            year: self.year,
            month: Some(self.month),
            day: Some(self.day),
            hour: Some(self.hour),
            minute: Some(self.minute),
            second: Some(self.second),
            timezone: Some(timezone),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Metadata {
    pub(crate) title: Option<String>,
    pub(crate) author: Option<String>,
    pub(crate) creator: Option<String>,
    pub(crate) subject: Option<String>,
    pub(crate) language: Option<String>,
    pub(crate) creation_date: Option<DateTime>,
    pub(crate) pdf_version: PdfVersion,
    pub(crate) output_intent: Option<OutputIntentSubtype>,
}

impl Metadata {
    pub(crate) fn new(properties: &DocumentProperties) -> Self {
        // Empty strings are treated as if they were not set.
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());

        Self {
            title: non_empty(&properties.title),
            author: non_empty(&properties.author),
            creator: non_empty(&properties.creator),
            subject: non_empty(&properties.subject),
            language: non_empty(&properties.language),
            creation_date: properties.creation_date,
            pdf_version: properties.pdf_version,
            output_intent: properties.output_intent.as_ref().map(|oi| oi.subtype),
        }
    }

    pub(crate) fn serialize_xmp_metadata(&self, xmp: &mut XmpWriter) {
        if let Some(title) = &self.title {
            xmp.title([(None, title.as_str())]);
        }

        if let Some(subject) = &self.subject {
            xmp.description([(None, subject.as_str())]);
        }

        if let Some(author) = &self.author {
            xmp.creator([author.as_str()]);
        }

        if let Some(creator) = &self.creator {
            xmp.creator_tool(creator);
        }

        if let Some(language) = &self.language {
            xmp.language([LangId(language.as_str())]);
        }

        xmp.producer(PRODUCER);

        if let Some(date_time) = self.creation_date {
            xmp.create_date(date_time.to_xmp());
            xmp.modify_date(date_time.to_xmp());
        }

        if self.output_intent == Some(OutputIntentSubtype::PdfA) {
            xmp.pdfa_part(1);
            xmp.pdfa_conformance("B");
        }
    }

    pub(crate) fn serialize_document_info(&self, ref_: &mut Ref, pdf: &mut Pdf) {
        let info_ref = ref_.bump();
        let mut document_info = pdf.document_info(info_ref);

        // All of those are deprecated in PDF 2.0 and only written to the XMP metadata.
        if self.pdf_version < PdfVersion::Pdf20 {
            if let Some(title) = &self.title {
                document_info.title(TextStr(title));
            }

            if let Some(subject) = &self.subject {
                document_info.subject(TextStr(subject));
            }

            if let Some(author) = &self.author {
                document_info.author(TextStr(author));
            }

            if let Some(creator) = &self.creator {
                document_info.creator(TextStr(creator));
            }

            document_info.producer(TextStr(PRODUCER));
        }

        if let Some(date_time) = self.creation_date {
            document_info.creation_date(date_time.to_pdf());
            document_info.modified_date(date_time.to_pdf());
        }

        if self.output_intent == Some(OutputIntentSubtype::PdfX) {
            document_info.pair(Name(b"GTS_PDFXVersion"), TextStr(PDFX_VERSION));
            document_info.pair(Name(b"Trapped"), Name(b"False"));
        }

        document_info.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure::OutputIntent;

    #[test]
    fn empty_strings_are_dropped() {
        let properties = DocumentProperties {
            title: Some(String::new()),
            author: Some("Jane Doe".to_string()),
            ..DocumentProperties::default()
        };

        let metadata = Metadata::new(&properties);
        assert_eq!(metadata.title, None);
        assert_eq!(metadata.author.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn dates_are_range_checked() {
        assert!(DateTime::new(2024, 2, 30, 12, 0, 0).is_ok());
        assert!(DateTime::new(2024, 13, 1, 0, 0, 0).is_err());
        assert!(DateTime::new(2024, 1, 1, 24, 0, 0).is_err());

        let date = DateTime::new(2024, 5, 17, 9, 30, 0).unwrap();
        assert!(date.with_utc_offset(2, 0).is_ok());
        assert!(date.with_utc_offset(-24, 0).is_err());
    }

    #[test]
    fn creation_date_goes_to_both_places() {
        let properties = DocumentProperties {
            creation_date: Some(
                DateTime::new(2024, 5, 17, 9, 30, 0)
                    .unwrap()
                    .with_utc_offset(2, 0)
                    .unwrap(),
            ),
            ..DocumentProperties::default()
        };
        let metadata = Metadata::new(&properties);

        let mut pdf = Pdf::new();
        let mut next_ref = Ref::new(1);
        metadata.serialize_document_info(&mut next_ref, &mut pdf);
        let data = String::from_utf8_lossy(&pdf.finish()).into_owned();
        assert!(data.contains("/CreationDate (D:20240517093000"));

        let mut xmp = XmpWriter::new();
        metadata.serialize_xmp_metadata(&mut xmp);
        assert!(xmp.finish(None).contains("2024-05-17T09:30:00"));
    }

    #[test]
    fn pdfx_version_is_written_to_info_dict() {
        let properties = DocumentProperties {
            title: Some("Proof".to_string()),
            output_intent: Some(OutputIntent {
                subtype: OutputIntentSubtype::PdfX,
                identifier: "FOGRA39".to_string(),
                profile: vec![],
            }),
            ..DocumentProperties::default()
        };

        let mut pdf = Pdf::new();
        let mut next_ref = Ref::new(1);
        Metadata::new(&properties).serialize_document_info(&mut next_ref, &mut pdf);

        let data = String::from_utf8_lossy(&pdf.finish()).into_owned();
        assert!(data.contains("/GTS_PDFXVersion (PDF/X-3:2003)"));
        assert!(data.contains("/Trapped /False"));
        assert!(data.contains("/Title (Proof)"));
        assert_eq!(next_ref, Ref::new(2));
    }
}
