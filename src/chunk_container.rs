use std::collections::HashMap;

use pdf_writer::{Chunk, Finish, Name, Pdf, Ref, Str, TextStr};
use xmp_writer::{RenditionClass, XmpWriter};

use crate::error::{CapyError, CapyResult};
use crate::metadata::Metadata;
use crate::serialize::SerializeContext;
use crate::util::hash_base64;

pub(crate) type ChunkContainerFn = fn(&mut ChunkContainer) -> &mut Vec<Chunk>;

/// Collects all chunks that we create while building
/// the PDF and then writes them out in an orderly manner.
#[derive(Default)]
pub(crate) struct ChunkContainer {
    pub(crate) page_tree: Option<(Ref, Chunk)>,
    pub(crate) outline: Option<(Ref, Chunk)>,
    pub(crate) page_label_tree: Option<(Ref, Chunk)>,
    pub(crate) destination_profiles: Option<(Ref, Chunk)>,
    pub(crate) struct_tree_root: Option<(Ref, Chunk)>,

    pub(crate) pages: Vec<Chunk>,
    pub(crate) struct_elements: Vec<Chunk>,
    pub(crate) outline_items: Vec<Chunk>,
    pub(crate) annotations: Vec<Chunk>,
    pub(crate) fonts: Vec<Chunk>,
    pub(crate) color_spaces: Vec<Chunk>,
    pub(crate) functions: Vec<Chunk>,
    pub(crate) ext_g_states: Vec<Chunk>,
    pub(crate) optional_content: Vec<Chunk>,
    pub(crate) x_objects: Vec<Chunk>,
    pub(crate) shadings: Vec<Chunk>,
    pub(crate) patterns: Vec<Chunk>,
    pub(crate) images: Vec<Chunk>,
    pub(crate) embedded_files: Vec<Chunk>,

    /// The optional content groups, which are all turned on by default.
    pub(crate) optional_content_groups: Vec<Ref>,
    /// The file specifications of the embedded files, keyed by their name.
    pub(crate) embedded_file_names: Vec<(String, Ref)>,
    pub(crate) metadata: Option<Metadata>,
}

impl ChunkContainer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn finish(self, sc: &mut SerializeContext) -> CapyResult<Pdf> {
        let mut remapped_ref = Ref::new(1);
        let mut remapper = HashMap::new();

        // Allows us to estimate the capacity we will need for the new PDF.
        let mut chunks_byte_len = 0;

        // Traverse the chunks in the order they are written and assign new references
        // as we go, so that the final file is numbered with monotonically increasing
        // numbers.
        self.visit(&mut |chunk| {
            for object_ref in chunk.refs() {
                let existing = remapper.insert(object_ref, remapped_ref.bump());
                debug_assert!(existing.is_none());
            }
            chunks_byte_len += chunk.len();
        });

        let remap = |old: Ref| -> CapyResult<Ref> {
            remapper.get(&old).copied().ok_or_else(|| {
                CapyError::SerializationFailure(format!("dangling reference {}", old.get()))
            })
        };

        // The padding is a rough estimate for the renumbering and the catalog.
        let capacity = (chunks_byte_len as f32 * 1.1 + 200.0) as usize;
        let mut pdf = Pdf::with_capacity(capacity);

        let version = self
            .metadata
            .as_ref()
            .map(|m| m.pdf_version)
            .unwrap_or(crate::configure::PdfVersion::Pdf17);
        version.set_version(&mut pdf);

        if sc.serialize_settings().ascii_compatible {
            pdf.set_binary_marker(b"AAAA")
        }

        // Write the chunks in all the fields. A reference that no chunk defines
        // can't be renumbered and fails the whole export.
        let mut dangling = None;
        self.visit(&mut |chunk| {
            chunk.renumber_into(&mut pdf, |old| match remapper.get(&old) {
                Some(new) => *new,
                None => {
                    dangling.get_or_insert(old);
                    old
                }
            });
        });

        if let Some(old) = dangling {
            return Err(CapyError::SerializationFailure(format!(
                "object {} was never written",
                old.get()
            )));
        }

        // Write the PDF document info metadata.
        if let Some(metadata) = &self.metadata {
            metadata.serialize_document_info(&mut remapped_ref, &mut pdf);
        }

        let instance_id = hash_base64(pdf.as_bytes());

        let document_id = if let Some(metadata) = &self.metadata {
            if metadata.title.is_some() && metadata.author.is_some() {
                hash_base64(&(version.as_str(), &metadata.title, &metadata.author))
            } else {
                instance_id.clone()
            }
        } else {
            instance_id.clone()
        };

        let mut xmp = XmpWriter::new();
        if let Some(metadata) = &self.metadata {
            metadata.serialize_xmp_metadata(&mut xmp);
        }

        xmp.num_pages(self.pages.len() as u32);
        xmp.format("application/pdf");
        xmp.instance_id(&instance_id);
        xmp.document_id(&document_id);
        pdf.set_file_id((
            document_id.as_bytes().to_vec(),
            instance_id.as_bytes().to_vec(),
        ));

        xmp.rendition_class(RenditionClass::Proof);
        version.write_xmp(&mut xmp);

        let write_xmp = sc.serialize_settings().xmp_metadata
            || self
                .metadata
                .as_ref()
                .is_some_and(|m| m.output_intent.is_some());

        let meta_ref = if write_xmp {
            let meta_ref = remapped_ref.bump();
            let xmp_buf = xmp.finish(None);
            pdf.stream(meta_ref, xmp_buf.as_bytes())
                .pair(Name(b"Type"), Name(b"Metadata"))
                .pair(Name(b"Subtype"), Name(b"XML"));
            Some(meta_ref)
        } else {
            None
        };

        let catalog_ref = remapped_ref.bump();
        let mut catalog = pdf.catalog(catalog_ref);

        if let Some(pt) = &self.page_tree {
            catalog.pages(remap(pt.0)?);
        }

        if let Some(meta_ref) = meta_ref {
            catalog.metadata(meta_ref);
        }

        if let Some(pl) = &self.page_label_tree {
            catalog.pair(Name(b"PageLabels"), remap(pl.0)?);
        }

        if let Some(oi) = &self.destination_profiles {
            catalog.pair(Name(b"OutputIntents"), remap(oi.0)?);
        }

        if let Some(lang) = self.metadata.as_ref().and_then(|m| m.language.as_ref()) {
            catalog.lang(TextStr(lang));
        }

        if let Some(st) = &self.struct_tree_root {
            catalog.pair(Name(b"StructTreeRoot"), remap(st.0)?);
            catalog.mark_info().marked(true);
        }

        if let Some(ol) = &self.outline {
            catalog.outlines(remap(ol.0)?);
        }

        if !self.optional_content_groups.is_empty() {
            let groups = self
                .optional_content_groups
                .iter()
                .map(|r| remap(*r))
                .collect::<CapyResult<Vec<_>>>()?;

            let mut oc_properties = catalog.insert(Name(b"OCProperties")).dict();
            oc_properties
                .insert(Name(b"OCGs"))
                .array()
                .items(groups.iter().copied());
            let mut default_config = oc_properties.insert(Name(b"D")).dict();
            default_config.insert(Name(b"ON")).array().items(groups);
            default_config.finish();
            oc_properties.finish();
        }

        if !self.embedded_file_names.is_empty() {
            let mut sorted = self
                .embedded_file_names
                .iter()
                .map(|(name, r)| remap(*r).map(|r| (name.as_str(), r)))
                .collect::<CapyResult<Vec<_>>>()?;
            // Name trees must be sorted by key.
            sorted.sort_by(|a, b| a.0.cmp(b.0));

            let mut names = catalog.names();
            let mut embedded_files_name_tree = names.embedded_files();
            let mut embedded_name_entries = embedded_files_name_tree.names();

            for (name, file_ref) in &sorted {
                embedded_name_entries.insert(Str(name.as_bytes()), *file_ref);
            }

            embedded_name_entries.finish();
            embedded_files_name_tree.finish();
            names.finish();

            let mut associated_files = catalog.insert(Name(b"AF")).array();
            for (_, file_ref) in &sorted {
                associated_files.item(*file_ref);
            }
            associated_files.finish();
        }

        catalog.finish();

        log::debug!(
            "wrote {} pages in {} objects",
            self.pages.len(),
            catalog_ref.get()
        );

        Ok(pdf)
    }
}

/// Visits all chunks in a type.
trait Visit {
    fn visit(&self, f: &mut impl FnMut(&Chunk));
}

impl Visit for ChunkContainer {
    fn visit(&self, f: &mut impl FnMut(&Chunk)) {
        self.page_tree.visit(f);
        self.outline.visit(f);
        self.page_label_tree.visit(f);
        self.destination_profiles.visit(f);
        self.struct_tree_root.visit(f);
        self.pages.visit(f);
        self.struct_elements.visit(f);
        self.outline_items.visit(f);
        self.annotations.visit(f);
        self.fonts.visit(f);
        self.color_spaces.visit(f);
        self.functions.visit(f);
        self.ext_g_states.visit(f);
        self.optional_content.visit(f);
        self.x_objects.visit(f);
        self.shadings.visit(f);
        self.patterns.visit(f);
        self.images.visit(f);
        self.embedded_files.visit(f);
    }
}

impl Visit for Chunk {
    fn visit(&self, f: &mut impl FnMut(&Chunk)) {
        f(self);
    }
}

impl Visit for Option<(Ref, Chunk)> {
    fn visit(&self, f: &mut impl FnMut(&Chunk)) {
        if let Some((_, chunk)) = self {
            chunk.visit(f);
        }
    }
}

impl<T: Visit> Visit for Vec<T> {
    fn visit(&self, f: &mut impl FnMut(&Chunk)) {
        for field in self {
            field.visit(f);
        }
    }
}
