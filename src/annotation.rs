//! Annotations, i.e. interactive or auxiliary objects placed on a page.
//!
//! An annotation is registered with the document first and then attached to exactly
//! one page with [`DrawContext::annotate`]. Annotations that are never attached are
//! still written, but no page refers to them.
//!
//! [`DrawContext::annotate`]: crate::draw::DrawContext::annotate

use pdf_writer::types::AnnotationFlags;
use pdf_writer::{Chunk, Finish, Name, Ref, Str, TextStr};

use crate::destination::{Destination, DestinationKey, DestinationTable};
use crate::error::{CapyError, CapyResult};
use crate::geom::{Rect, RectExt};
use crate::handle::{DocumentId, EmbeddedFileId, FormXObjectId, Handle};
use crate::serialize::SerializeContext;

/// Where a link leads.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    /// An external resource.
    Uri(String),
    /// A location within the document.
    Destination(Destination),
}

/// The kind of an annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    /// A sticky note with some text.
    Text(String),
    /// A clickable link.
    Link(LinkTarget),
    /// A reference to an embedded file.
    FileAttachment(EmbeddedFileId),
    /// Printer's marks like registration targets, drawn by a form XObject.
    PrintersMark(FormXObjectId),
}

/// An annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// What kind of annotation it is.
    pub kind: AnnotationKind,
    /// Where the annotation is placed on the page.
    pub rect: Rect,
    /// Whether the annotation is printed.
    pub print: bool,
    /// Whether the annotation is hidden.
    pub hidden: bool,
}

impl Annotation {
    /// Create a new annotation that is neither printed nor hidden.
    pub fn new(kind: AnnotationKind, rect: Rect) -> Self {
        Self {
            kind,
            rect,
            print: false,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone)]
enum RecordKind {
    Text(String),
    Uri(String),
    Destination(DestinationKey),
    FileAttachment(EmbeddedFileId),
    PrintersMark(FormXObjectId),
}

#[derive(Debug, Clone)]
pub(crate) struct AnnotationRecord {
    kind: RecordKind,
    rect: Rect,
    flags: u32,
    /// The index of the page the annotation is attached to.
    pub(crate) page: Option<usize>,
}

impl AnnotationRecord {
    pub(crate) fn new(
        annotation: Annotation,
        document: DocumentId,
        destinations: &mut DestinationTable,
    ) -> CapyResult<Self> {
        let kind = match annotation.kind {
            AnnotationKind::Text(text) => RecordKind::Text(text),
            AnnotationKind::Link(LinkTarget::Uri(uri)) => {
                if !uri.is_ascii() {
                    return Err(CapyError::invalid("Link URIs must be ASCII."));
                }

                RecordKind::Uri(uri)
            }
            AnnotationKind::Link(LinkTarget::Destination(destination)) => {
                RecordKind::Destination(destinations.register(destination)?)
            }
            AnnotationKind::FileAttachment(file) => {
                file.check(document)?;
                RecordKind::FileAttachment(file)
            }
            AnnotationKind::PrintersMark(form) => {
                form.check(document)?;
                RecordKind::PrintersMark(form)
            }
        };

        let mut flags = AnnotationFlags::empty();
        if annotation.print {
            flags |= AnnotationFlags::PRINT;
        }
        if annotation.hidden {
            flags |= AnnotationFlags::HIDDEN;
        }

        Ok(Self {
            kind,
            rect: annotation.rect,
            flags: flags.bits(),
            page: None,
        })
    }

    pub(crate) fn serialize(
        &self,
        sc: &SerializeContext,
        destinations: &DestinationTable,
        root_ref: Ref,
    ) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();
        let mut annotation = chunk
            .indirect(root_ref)
            .start::<pdf_writer::writers::Annotation>();

        annotation.rect(self.rect.to_pdf_rect());
        annotation.flags(AnnotationFlags::from_bits_truncate(self.flags));

        if let Some(page) = self.page {
            if let Some(page_ref) = sc.refs.pages.get(page) {
                annotation.page(*page_ref);
            }
        }

        match &self.kind {
            RecordKind::Text(text) => {
                annotation.subtype(pdf_writer::types::AnnotationType::Text);
                annotation.contents(TextStr(text));
            }
            RecordKind::Uri(uri) => {
                annotation.subtype(pdf_writer::types::AnnotationType::Link);
                annotation
                    .action()
                    .action_type(pdf_writer::types::ActionType::Uri)
                    .uri(Str(uri.as_bytes()));
            }
            RecordKind::Destination(key) => {
                annotation.subtype(pdf_writer::types::AnnotationType::Link);
                destinations.write(*key, &sc.refs.pages, annotation.insert(Name(b"Dest")))?;
            }
            RecordKind::FileAttachment(file) => {
                annotation.subtype(pdf_writer::types::AnnotationType::FileAttachment);
                annotation.pair(Name(b"FS"), sc.refs.embedded_files.get(*file)?);
            }
            RecordKind::PrintersMark(form) => {
                annotation.pair(Name(b"Subtype"), Name(b"PrinterMark"));
                let mut appearance = annotation.insert(Name(b"AP")).dict();
                appearance.pair(Name(b"N"), sc.refs.form_xobjects.get(*form)?);
                appearance.finish();
            }
        }

        annotation.finish();

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> Rect {
        Rect::from_xywh(10.0, 10.0, 50.0, 20.0).unwrap()
    }

    #[test]
    fn foreign_attachments_are_rejected() {
        let doc = DocumentId::fresh();
        let mut destinations = DestinationTable::new();
        let foreign = EmbeddedFileId::new(DocumentId::fresh(), 0);

        let annotation = Annotation::new(AnnotationKind::FileAttachment(foreign), area());
        assert!(matches!(
            AnnotationRecord::new(annotation, doc, &mut destinations),
            Err(CapyError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn link_destinations_are_deferred() {
        let doc = DocumentId::fresh();
        let mut destinations = DestinationTable::new();

        let annotation = Annotation::new(
            AnnotationKind::Link(LinkTarget::Destination(Destination::fit(7))),
            area(),
        );
        assert!(AnnotationRecord::new(annotation, doc, &mut destinations).is_ok());
        assert!(destinations.check(8).is_ok());
        assert!(destinations.check(2).is_err());
    }

    #[test]
    fn print_flag_is_written() {
        use crate::configure::SerializeSettings;
        use crate::serialize::ObjectCounts;

        let doc = DocumentId::fresh();
        let mut destinations = DestinationTable::new();
        let mut annotation = Annotation::new(AnnotationKind::Text("Note".to_string()), area());
        annotation.print = true;

        let record = AnnotationRecord::new(annotation, doc, &mut destinations).unwrap();
        let copy = record.clone();
        let mut sc = SerializeContext::new(SerializeSettings::default(), ObjectCounts::default());
        let root_ref = sc.new_ref();
        let chunk = copy.serialize(&sc, &destinations, root_ref).unwrap();
        let data = String::from_utf8_lossy(chunk.as_bytes()).into_owned();

        assert!(data.contains("/F 4"));
        assert!(data.contains("/Subtype /Text"));
        assert!(data.contains("(Note)"));
        assert!(!data.contains("/P "));
    }

    #[test]
    fn non_ascii_uris_are_rejected() {
        let doc = DocumentId::fresh();
        let mut destinations = DestinationTable::new();
        let annotation = Annotation::new(
            AnnotationKind::Link(LinkTarget::Uri("https://exämple.org".to_string())),
            area(),
        );

        assert!(AnnotationRecord::new(annotation, doc, &mut destinations).is_err());
    }
}
