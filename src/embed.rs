//! Embedding attachments to a PDF file.

use std::ops::DerefMut;

use pdf_writer::{Chunk, Finish, Name, Ref, Str, TextStr};

use crate::chunk_container::ChunkContainerFn;
use crate::configure::PdfVersion;
use crate::error::{CapyError, CapyResult};
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::FilterStreamBuilder;
use crate::util::NameExt;

/// An embedded file.
#[derive(Debug, Clone)]
pub(crate) struct EmbeddedFile {
    /// The name of the file inside the PDF.
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) mime_type: Option<String>,
    pub(crate) pdf_version: PdfVersion,
}

impl EmbeddedFile {
    pub(crate) fn new(
        name: &str,
        data: Vec<u8>,
        mime_type: Option<&str>,
        pdf_version: PdfVersion,
    ) -> CapyResult<Self> {
        if name.is_empty() {
            return Err(CapyError::invalid("Embedded file name must not be empty."));
        }

        if let Some(mime_type) = mime_type {
            if !valid_mime_type(mime_type) {
                return Err(CapyError::invalid(format!(
                    "Invalid mime type {mime_type:?}."
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            data,
            mime_type: mime_type.map(str::to_string),
            pdf_version,
        })
    }
}

impl Serialize for EmbeddedFile {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.embedded_files
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();
        let stream_ref = sc.new_ref();

        let file_stream =
            FilterStreamBuilder::new_from_binary_data(&self.data).finish(sc.serialize_settings());

        let mut embedded_file_stream = chunk.embedded_file(stream_ref, file_stream.encoded_data());
        file_stream.write_filters(embedded_file_stream.deref_mut().deref_mut());

        if let Some(mime_type) = &self.mime_type {
            // Slashes are escaped by the name writer.
            embedded_file_stream.subtype(mime_type.to_pdf_name());
        }

        let mut params = embedded_file_stream.params();
        params.size(i32::try_from(self.data.len()).map_err(|_| {
            CapyError::SerializationFailure(format!("embedded file {} is too large", self.name))
        })?);
        params.finish();
        embedded_file_stream.finish();

        let mut file_spec = chunk.file_spec(root_ref);
        file_spec.path(Str(self.name.as_bytes()));

        if self.pdf_version >= PdfVersion::Pdf17 {
            file_spec.unic_file(TextStr(&self.name));
        }

        let mut ef = file_spec.insert(Name(b"EF")).dict();
        ef.pair(Name(b"F"), stream_ref);

        if self.pdf_version >= PdfVersion::Pdf17 {
            ef.pair(Name(b"UF"), stream_ref);
        }

        ef.finish();
        file_spec.finish();

        sc.chunk_container
            .embedded_file_names
            .push((self.name.clone(), root_ref));

        Ok(chunk)
    }
}

fn valid_mime_type(mime_type: &str) -> bool {
    match mime_type.split_once('/') {
        Some((type_part, subtype_part)) => {
            valid_mime_part(type_part) && valid_mime_part(subtype_part)
        }
        None => false,
    }
}

fn valid_mime_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_types_are_checked() {
        assert!(valid_mime_type("text/plain"));
        assert!(valid_mime_type("application/vnd.ms-excel"));
        assert!(!valid_mime_type("text"));
        assert!(!valid_mime_type("text/"));
        assert!(!valid_mime_type("text/plain/extra"));
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(EmbeddedFile::new("", vec![1, 2, 3], None, PdfVersion::Pdf17).is_err());
        assert!(EmbeddedFile::new("data.csv", vec![], Some("text/csv"), PdfVersion::Pdf17).is_ok());
    }
}
