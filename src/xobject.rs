//! Form XObjects and transparency groups.
//!
//! Both are written as form XObjects. A transparency group additionally carries a
//! `/Group` dictionary, which makes its content composited as a unit.

use std::ops::DerefMut;

use pdf_writer::{Chunk, Finish, Name, Ref};

use crate::chunk_container::ChunkContainerFn;
use crate::error::CapyResult;
use crate::geom::RectExt;
use crate::graphics_state::TransparencyGroupProperties;
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::{FilterStreamBuilder, Stream};

#[derive(Debug, Clone)]
pub(crate) struct FormXObjectRecord {
    pub(crate) stream: Stream,
    pub(crate) group: Option<TransparencyGroupProperties>,
}

impl FormXObjectRecord {
    pub(crate) fn form(stream: Stream) -> Self {
        Self {
            stream,
            group: None,
        }
    }

    pub(crate) fn transparency_group(
        stream: Stream,
        properties: TransparencyGroupProperties,
    ) -> Self {
        Self {
            stream,
            group: Some(properties),
        }
    }
}

impl Serialize for FormXObjectRecord {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.x_objects
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();

        let x_object_stream =
            FilterStreamBuilder::new_from_content_stream(&self.stream.content, sc.serialize_settings())
                .finish(sc.serialize_settings());

        let mut x_object = chunk.form_xobject(root_ref, x_object_stream.encoded_data());
        x_object_stream.write_filters(x_object.deref_mut().deref_mut());

        self.stream
            .resource_dictionary
            .to_pdf_resources(sc, &mut x_object)?;
        x_object.bbox(self.stream.bbox.to_pdf_rect());

        if let Some(group) = &self.group {
            group.write(sc, x_object.insert(Name(b"Group")).dict())?;
        }

        x_object.finish();

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure::SerializeSettings;
    use crate::geom::Rect;
    use crate::resource::ResourceDictionary;
    use crate::serialize::ObjectCounts;

    fn uncompressed() -> SerializeContext {
        let settings = SerializeSettings {
            compress_content_streams: false,
            ..SerializeSettings::default()
        };
        SerializeContext::new(settings, ObjectCounts::default())
    }

    #[test]
    fn groups_are_marked_as_transparency() {
        let mut sc = uncompressed();
        let stream = Stream::new(
            b"0 0 10 10 re\nf\n".to_vec(),
            Rect::from_xywh(0.0, 0.0, 10.0, 10.0).unwrap(),
            ResourceDictionary::default(),
        );
        let record = FormXObjectRecord::transparency_group(
            stream,
            TransparencyGroupProperties {
                isolated: true,
                ..TransparencyGroupProperties::default()
            },
        );

        let root_ref = sc.new_ref();
        let chunk = record.serialize(&mut sc, root_ref).unwrap();
        let data = String::from_utf8_lossy(chunk.as_bytes()).into_owned();

        assert!(data.contains("/Subtype /Form"));
        assert!(data.contains("/S /Transparency"));
        assert!(data.contains("/I true"));
        assert!(data.contains("0 0 10 10 re"));
    }

    #[test]
    fn plain_forms_have_no_group() {
        let mut sc = uncompressed();
        let stream = Stream::new(
            vec![],
            Rect::from_xywh(0.0, 0.0, 5.0, 5.0).unwrap(),
            ResourceDictionary::default(),
        );

        let root_ref = sc.new_ref();
        let chunk = FormXObjectRecord::form(stream)
            .serialize(&mut sc, root_ref)
            .unwrap();
        let data = String::from_utf8_lossy(chunk.as_bytes()).into_owned();

        assert!(!data.contains("/Group"));
        assert!(data.contains("/BBox [0 0 5 5]"));
    }
}
