//! Typed handles for objects registered with a document.
//!
//! Every object that ends up as an indirect object in the PDF is owned by the
//! [`Document`] it was registered with. Calling code only ever holds a small,
//! copyable handle that consists of the id of the owning document and an index
//! into a per-kind arena. Handles are never reused and never invalidated while the
//! document is alive, but they are meaningless for any other document: passing a
//! handle to a document that didn't create it results in an error.
//!
//! [`Document`]: crate::document::Document

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{CapyError, CapyResult};

static NEXT_DOCUMENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies one document instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct DocumentId(u32);

impl DocumentId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) trait Handle: Copy + Eq + Hash + Debug {
    const KIND: &'static str;

    fn new(document: DocumentId, index: u32) -> Self;
    fn document(&self) -> DocumentId;
    fn index(&self) -> u32;

    fn unknown(&self) -> CapyError {
        CapyError::UnknownHandle {
            kind: Self::KIND,
            index: self.index(),
        }
    }

    /// Check that the handle was created by the given document.
    fn check(&self, document: DocumentId) -> CapyResult<()> {
        if self.document() == document {
            Ok(())
        } else {
            Err(self.unknown())
        }
    }
}

macro_rules! handle {
    ($(#[$attr:meta])* $name:ident, $kind:literal) => {
        $(#[$attr])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            document: DocumentId,
            index: u32,
        }

        impl $name {
            /// The index of the object within its kind, in registration order.
            pub fn index(&self) -> u32 {
                self.index
            }
        }

        impl Handle for $name {
            const KIND: &'static str = $kind;

            fn new(document: DocumentId, index: u32) -> Self {
                Self { document, index }
            }

            fn document(&self) -> DocumentId {
                self.document
            }

            fn index(&self) -> u32 {
                self.index
            }
        }
    };
}

handle!(
    /// A loaded font.
    FontId,
    "font"
);
handle!(
    /// A raster image.
    ImageId,
    "image"
);
handle!(
    /// A shading.
    ShadingId,
    "shading"
);
handle!(
    /// A tiling or shading pattern.
    PatternId,
    "pattern"
);
handle!(
    /// An extended graphics state.
    GraphicsStateId,
    "graphics state"
);
handle!(
    /// An optional content group.
    OptionalContentGroupId,
    "optional content group"
);
handle!(
    /// A separation colorspace.
    SeparationId,
    "separation"
);
handle!(
    /// A function.
    FunctionId,
    "function"
);
handle!(
    /// An ICC-based colorspace.
    IccColorSpaceId,
    "ICC colorspace"
);
handle!(
    /// A Lab colorspace.
    LabColorSpaceId,
    "Lab colorspace"
);
handle!(
    /// An embedded file.
    EmbeddedFileId,
    "embedded file"
);
handle!(
    /// A form XObject.
    FormXObjectId,
    "form XObject"
);
handle!(
    /// A transparency group.
    TransparencyGroupId,
    "transparency group"
);
handle!(
    /// A node in the structure tree.
    StructureItemId,
    "structure item"
);
handle!(
    /// A custom structure role.
    RoleId,
    "role"
);
handle!(
    /// An outline item.
    OutlineId,
    "outline"
);
handle!(
    /// An annotation.
    AnnotationId,
    "annotation"
);

/// A handle of any kind.
///
/// Used by operations that accept more than one kind of object and need to
/// check at runtime that they received the right one.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AnyHandle {
    Font(FontId),
    Image(ImageId),
    Shading(ShadingId),
    Pattern(PatternId),
    GraphicsState(GraphicsStateId),
    OptionalContentGroup(OptionalContentGroupId),
    Separation(SeparationId),
    Function(FunctionId),
    IccColorSpace(IccColorSpaceId),
    LabColorSpace(LabColorSpaceId),
    EmbeddedFile(EmbeddedFileId),
    FormXObject(FormXObjectId),
    TransparencyGroup(TransparencyGroupId),
    StructureItem(StructureItemId),
    Role(RoleId),
    Outline(OutlineId),
    Annotation(AnnotationId),
}

macro_rules! any_handle {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        impl AnyHandle {
            pub(crate) fn kind(&self) -> &'static str {
                match self {
                    $(AnyHandle::$variant(_) => <$ty as Handle>::KIND,)*
                }
            }
        }

        $(
            impl From<$ty> for AnyHandle {
                fn from(value: $ty) -> Self {
                    AnyHandle::$variant(value)
                }
            }
        )*
    };
}

any_handle!(
    Font(FontId),
    Image(ImageId),
    Shading(ShadingId),
    Pattern(PatternId),
    GraphicsState(GraphicsStateId),
    OptionalContentGroup(OptionalContentGroupId),
    Separation(SeparationId),
    Function(FunctionId),
    IccColorSpace(IccColorSpaceId),
    LabColorSpace(LabColorSpaceId),
    EmbeddedFile(EmbeddedFileId),
    FormXObject(FormXObjectId),
    TransparencyGroup(TransparencyGroupId),
    StructureItem(StructureItemId),
    Role(RoleId),
    Outline(OutlineId),
    Annotation(AnnotationId),
);

/// Owns all objects of one kind that were registered with a document.
#[derive(Debug)]
pub(crate) struct Arena<H, T> {
    document: DocumentId,
    items: Vec<T>,
    phantom: PhantomData<H>,
}

impl<H: Handle, T> Arena<H, T> {
    pub(crate) fn new(document: DocumentId) -> Self {
        Self {
            document,
            items: Vec::new(),
            phantom: PhantomData,
        }
    }

    pub(crate) fn push(&mut self, item: T) -> H {
        let handle = H::new(self.document, self.items.len() as u32);
        log::trace!("registered {} {}", H::KIND, handle.index());
        self.items.push(item);
        handle
    }

    pub(crate) fn contains(&self, handle: H) -> bool {
        handle.document() == self.document && (handle.index() as usize) < self.items.len()
    }

    pub(crate) fn get(&self, handle: H) -> CapyResult<&T> {
        if !self.contains(handle) {
            return Err(handle.unknown());
        }

        self.items
            .get(handle.index() as usize)
            .ok_or_else(|| handle.unknown())
    }

    pub(crate) fn get_mut(&mut self, handle: H) -> CapyResult<&mut T> {
        if !self.contains(handle) {
            return Err(handle.unknown());
        }

        self.items
            .get_mut(handle.index() as usize)
            .ok_or_else(|| handle.unknown())
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        let document = self.document;
        self.items
            .iter()
            .enumerate()
            .map(move |(i, item)| (H::new(document, i as u32), item))
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_dense_per_kind() {
        let doc = DocumentId::fresh();
        let mut fonts: Arena<FontId, &str> = Arena::new(doc);
        let mut images: Arena<ImageId, &str> = Arena::new(doc);

        let f0 = fonts.push("a");
        let i0 = images.push("b");
        let f1 = fonts.push("c");

        assert_eq!(f0.index(), 0);
        assert_eq!(f1.index(), 1);
        assert_eq!(i0.index(), 0);
        assert_ne!(f0, f1);
        assert_eq!(*fonts.get(f1).unwrap(), "c");
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut first: Arena<FunctionId, u8> = Arena::new(DocumentId::fresh());
        let second: Arena<FunctionId, u8> = Arena::new(DocumentId::fresh());

        let handle = first.push(1);
        assert!(first.get(handle).is_ok());
        assert_eq!(
            second.get(handle),
            Err(CapyError::UnknownHandle {
                kind: "function",
                index: 0
            })
        );
    }

    #[test]
    fn any_handle_reports_kind() {
        let doc = DocumentId::fresh();
        let handle: AnyHandle = ShadingId::new(doc, 3).into();
        assert_eq!(handle.kind(), "shading");
    }
}
