//! Turning registered objects into PDF chunks.
//!
//! Serialization happens in one pass over a document that has already been checked
//! for consistency. Before anything is written, every registered object gets its
//! root reference, in registration order and kind by kind, starting with the pages.
//! Since all references are known upfront, objects can refer to each other no
//! matter in which order they are serialized.

use std::marker::PhantomData;

use pdf_writer::{Chunk, Ref};

use crate::chunk_container::{ChunkContainer, ChunkContainerFn};
use crate::configure::SerializeSettings;
use crate::error::CapyResult;
use crate::handle::{
    AnnotationId, EmbeddedFileId, FontId, FormXObjectId, FunctionId, GraphicsStateId, Handle,
    IccColorSpaceId, ImageId, LabColorSpaceId, OptionalContentGroupId, OutlineId, PatternId,
    SeparationId, ShadingId, StructureItemId, TransparencyGroupId,
};

/// An object that can be serialized into its own chunk.
pub(crate) trait Serialize {
    /// The field of the chunk container the chunk belongs to.
    fn chunk_container(&self) -> ChunkContainerFn;

    /// Serialize the object, with `root_ref` as the reference of its main object.
    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk>;
}

/// The root references of all objects of one kind.
#[derive(Debug)]
pub(crate) struct RefList<H> {
    refs: Vec<Ref>,
    phantom: PhantomData<H>,
}

impl<H> Default for RefList<H> {
    fn default() -> Self {
        Self {
            refs: vec![],
            phantom: PhantomData,
        }
    }
}

impl<H: Handle> RefList<H> {
    pub(crate) fn get(&self, handle: H) -> CapyResult<Ref> {
        self.refs
            .get(handle.index() as usize)
            .copied()
            .ok_or_else(|| handle.unknown())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Ref> + '_ {
        self.refs.iter().copied()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RefTable {
    pub(crate) pages: Vec<Ref>,
    pub(crate) fonts: RefList<FontId>,
    pub(crate) images: RefList<ImageId>,
    pub(crate) icc_color_spaces: RefList<IccColorSpaceId>,
    pub(crate) lab_color_spaces: RefList<LabColorSpaceId>,
    pub(crate) functions: RefList<FunctionId>,
    pub(crate) separations: RefList<SeparationId>,
    pub(crate) shadings: RefList<ShadingId>,
    pub(crate) patterns: RefList<PatternId>,
    pub(crate) graphics_states: RefList<GraphicsStateId>,
    pub(crate) optional_content_groups: RefList<OptionalContentGroupId>,
    pub(crate) form_xobjects: RefList<FormXObjectId>,
    pub(crate) transparency_groups: RefList<TransparencyGroupId>,
    pub(crate) embedded_files: RefList<EmbeddedFileId>,
    pub(crate) annotations: RefList<AnnotationId>,
    pub(crate) outlines: RefList<OutlineId>,
    pub(crate) structure_items: RefList<StructureItemId>,
}

/// The number of objects of each kind.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ObjectCounts {
    pub(crate) pages: usize,
    pub(crate) fonts: usize,
    pub(crate) images: usize,
    pub(crate) icc_color_spaces: usize,
    pub(crate) lab_color_spaces: usize,
    pub(crate) functions: usize,
    pub(crate) separations: usize,
    pub(crate) shadings: usize,
    pub(crate) patterns: usize,
    pub(crate) graphics_states: usize,
    pub(crate) optional_content_groups: usize,
    pub(crate) form_xobjects: usize,
    pub(crate) transparency_groups: usize,
    pub(crate) embedded_files: usize,
    pub(crate) annotations: usize,
    pub(crate) outlines: usize,
    pub(crate) structure_items: usize,
}

pub(crate) struct SerializeContext {
    cur_ref: Ref,
    serialize_settings: SerializeSettings,
    page_tree_ref: Ref,
    pub(crate) refs: RefTable,
    pub(crate) chunk_container: ChunkContainer,
}

impl SerializeContext {
    /// Create a new context and assign the root references of all objects.
    pub(crate) fn new(serialize_settings: SerializeSettings, counts: ObjectCounts) -> Self {
        let mut sc = Self {
            cur_ref: Ref::new(1),
            serialize_settings,
            page_tree_ref: Ref::new(1),
            refs: RefTable::default(),
            chunk_container: ChunkContainer::new(),
        };

        sc.page_tree_ref = sc.new_ref();
        sc.refs.pages = (0..counts.pages).map(|_| sc.new_ref()).collect();
        sc.refs.fonts = sc.allocate(counts.fonts);
        sc.refs.images = sc.allocate(counts.images);
        sc.refs.icc_color_spaces = sc.allocate(counts.icc_color_spaces);
        sc.refs.lab_color_spaces = sc.allocate(counts.lab_color_spaces);
        sc.refs.functions = sc.allocate(counts.functions);
        sc.refs.separations = sc.allocate(counts.separations);
        sc.refs.shadings = sc.allocate(counts.shadings);
        sc.refs.patterns = sc.allocate(counts.patterns);
        sc.refs.graphics_states = sc.allocate(counts.graphics_states);
        sc.refs.optional_content_groups = sc.allocate(counts.optional_content_groups);
        sc.refs.form_xobjects = sc.allocate(counts.form_xobjects);
        sc.refs.transparency_groups = sc.allocate(counts.transparency_groups);
        sc.refs.embedded_files = sc.allocate(counts.embedded_files);
        sc.refs.annotations = sc.allocate(counts.annotations);
        sc.refs.outlines = sc.allocate(counts.outlines);
        sc.refs.structure_items = sc.allocate(counts.structure_items);

        sc
    }

    fn allocate<H>(&mut self, count: usize) -> RefList<H> {
        RefList {
            refs: (0..count).map(|_| self.new_ref()).collect(),
            phantom: PhantomData,
        }
    }

    pub(crate) fn new_ref(&mut self) -> Ref {
        self.cur_ref.bump()
    }

    pub(crate) fn serialize_settings(&self) -> &SerializeSettings {
        &self.serialize_settings
    }

    pub(crate) fn page_tree_ref(&self) -> Ref {
        self.page_tree_ref
    }

    /// Serialize an object and store its chunk in the right place.
    pub(crate) fn push<T: Serialize>(&mut self, object: &T, root_ref: Ref) -> CapyResult<()> {
        let chunk = object.serialize(self, root_ref)?;
        (object.chunk_container())(&mut self.chunk_container).push(chunk);
        Ok(())
    }

    /// Serialize all objects of one kind, in registration order.
    pub(crate) fn push_all<'a, T, I>(&mut self, objects: I, refs: Vec<Ref>) -> CapyResult<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for (object, root_ref) in objects.into_iter().zip(refs) {
            self.push(object, root_ref)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::DocumentId;

    #[test]
    fn refs_are_assigned_kind_by_kind() {
        let counts = ObjectCounts {
            pages: 2,
            fonts: 1,
            functions: 2,
            ..ObjectCounts::default()
        };
        let mut sc = SerializeContext::new(SerializeSettings::default(), counts);

        assert_eq!(sc.page_tree_ref(), Ref::new(1));
        assert_eq!(sc.refs.pages, vec![Ref::new(2), Ref::new(3)]);

        let doc = DocumentId::fresh();
        assert_eq!(sc.refs.fonts.get(FontId::new(doc, 0)), Ok(Ref::new(4)));
        assert_eq!(sc.refs.functions.get(FunctionId::new(doc, 1)), Ok(Ref::new(6)));
        assert!(sc.refs.functions.get(FunctionId::new(doc, 2)).is_err());

        assert_eq!(sc.new_ref(), Ref::new(7));
    }
}
