//! The logical structure of a document.
//!
//! Structure items form a forest: every item either has no parent, in which case it
//! is a child of the structure tree root, or a parent that was registered before it.
//! Content is tied to items with marked content sequences on pages, each of which
//! gets a marked content identifier (MCID) that is unique within its page.

use std::collections::HashMap;

use pdf_writer::writers::{NumberTree, StructElement};
use pdf_writer::{Chunk, Finish, Name, Ref, TextStr};

use crate::error::{CapyError, CapyResult};
use crate::handle::{Arena, DocumentId, Handle, RoleId, StructureItemId};
use crate::serialize::SerializeContext;
use crate::util::check_pdf_name;

macro_rules! structure_types {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// The standard structure types.
        #[allow(missing_docs)]
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum StructureType {
            $($variant,)*
        }

        impl StructureType {
            /// The name of the type as written to the PDF.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(StructureType::$variant => $name,)*
                }
            }
        }
    };
}

structure_types!(
    Document => "Document",
    Part => "Part",
    Art => "Art",
    Sect => "Sect",
    Div => "Div",
    BlockQuote => "BlockQuote",
    Caption => "Caption",
    Toc => "TOC",
    Toci => "TOCI",
    Index => "Index",
    NonStruct => "NonStruct",
    Private => "Private",
    P => "P",
    H => "H",
    H1 => "H1",
    H2 => "H2",
    H3 => "H3",
    H4 => "H4",
    H5 => "H5",
    H6 => "H6",
    L => "L",
    Li => "LI",
    Lbl => "Lbl",
    LBody => "LBody",
    Table => "Table",
    Tr => "TR",
    Th => "TH",
    Td => "TD",
    THead => "THead",
    TBody => "TBody",
    TFoot => "TFoot",
    Span => "Span",
    Quote => "Quote",
    Note => "Note",
    Reference => "Reference",
    BibEntry => "BibEntry",
    Code => "Code",
    Link => "Link",
    Annot => "Annot",
    Ruby => "Ruby",
    Rb => "RB",
    Rt => "RT",
    Rp => "RP",
    Warichu => "Warichu",
    Wt => "WT",
    Wp => "WP",
    Figure => "Figure",
    Formula => "Formula",
    Form => "Form",
);

/// The type of a structure item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StructureKind {
    /// A standard type.
    Builtin(StructureType),
    /// A custom role from the role map.
    Custom(RoleId),
}

impl From<StructureType> for StructureKind {
    fn from(value: StructureType) -> Self {
        StructureKind::Builtin(value)
    }
}

impl From<RoleId> for StructureKind {
    fn from(value: RoleId) -> Self {
        StructureKind::Custom(value)
    }
}

/// Optional accessibility metadata of a structure item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructItemExtraData {
    /// `T`
    pub title: Option<String>,
    /// `Lang`
    pub lang: Option<String>,
    /// `Alt`
    pub alt: Option<String>,
    /// `ActualText`
    pub actual_text: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct StructureItem {
    pub(crate) kind: StructureKind,
    pub(crate) parent: Option<StructureItemId>,
    pub(crate) extra: StructItemExtraData,
}

#[derive(Debug, Clone)]
pub(crate) struct Role {
    pub(crate) name: String,
    pub(crate) builtin: StructureType,
}

/// Where the content of a structure item lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct ContentLocation {
    pub(crate) page: usize,
    pub(crate) mcid: i32,
}

#[derive(Debug)]
pub(crate) struct StructureTree {
    document: DocumentId,
    pub(crate) items: Arena<StructureItemId, StructureItem>,
    pub(crate) roles: Arena<RoleId, Role>,
}

impl StructureTree {
    pub(crate) fn new(document: DocumentId) -> Self {
        Self {
            document,
            items: Arena::new(document),
            roles: Arena::new(document),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn add_item(
        &mut self,
        kind: StructureKind,
        parent: Option<StructureItemId>,
        extra: StructItemExtraData,
    ) -> CapyResult<StructureItemId> {
        if let Some(parent) = parent {
            if !self.items.contains(parent) {
                return Err(CapyError::UnknownParent {
                    kind: StructureItemId::KIND,
                    index: parent.index(),
                });
            }
        }

        if let StructureKind::Custom(role) = kind {
            self.roles.get(role)?;
        }

        Ok(self.items.push(StructureItem {
            kind,
            parent,
            extra,
        }))
    }

    pub(crate) fn add_role(&mut self, name: &str, builtin: StructureType) -> CapyResult<RoleId> {
        check_pdf_name(name, "Role name")?;

        if self.roles.values().any(|r| r.name == name) {
            return Err(CapyError::DuplicateName(name.to_string()));
        }

        Ok(self.roles.push(Role {
            name: name.to_string(),
            builtin,
        }))
    }

    /// The tag that marked content of the item is written with.
    pub(crate) fn tag_name(&self, item: StructureItemId) -> CapyResult<String> {
        let item = self.items.get(item)?;

        match item.kind {
            StructureKind::Builtin(t) => Ok(t.as_str().to_string()),
            StructureKind::Custom(role) => Ok(self.roles.get(role)?.name.clone()),
        }
    }

    pub(crate) fn check_item(&self, item: StructureItemId) -> CapyResult<()> {
        item.check(self.document)?;
        self.items.get(item).map(|_| ())
    }

    /// Check that following the parents always terminates.
    pub(crate) fn check_forest(&self) -> CapyResult<()> {
        for (id, item) in self.items.iter() {
            if let Some(parent) = item.parent {
                if parent.index() >= id.index() {
                    return Err(CapyError::UnknownParent {
                        kind: StructureItemId::KIND,
                        index: parent.index(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Write the structure tree root, the parent tree and all structure elements.
    ///
    /// `page_contents` lists, for every page, the items in MCID order.
    pub(crate) fn serialize(
        &self,
        sc: &mut SerializeContext,
        page_contents: &[Vec<StructureItemId>],
    ) -> CapyResult<()> {
        let root_ref = sc.new_ref();

        let mut locations: HashMap<StructureItemId, ContentLocation> = HashMap::new();
        for (page, items) in page_contents.iter().enumerate() {
            for (mcid, item) in items.iter().enumerate() {
                if locations
                    .insert(
                        *item,
                        ContentLocation {
                            page,
                            mcid: mcid as i32,
                        },
                    )
                    .is_some()
                {
                    return Err(CapyError::StructureReuse(item.index()));
                }
            }
        }

        let mut children: HashMap<Option<StructureItemId>, Vec<StructureItemId>> = HashMap::new();
        for (id, item) in self.items.iter() {
            children.entry(item.parent).or_default().push(id);
        }

        for (id, item) in self.items.iter() {
            let item_ref = sc.refs.structure_items.get(id)?;
            let parent_ref = match item.parent {
                Some(parent) => sc.refs.structure_items.get(parent)?,
                None => root_ref,
            };
            let kids = children
                .get(&Some(id))
                .map(|kids| {
                    kids.iter()
                        .map(|k| sc.refs.structure_items.get(*k))
                        .collect::<CapyResult<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();
            let location = locations.get(&id).copied();
            let page_ref = location.map(|l| sc.refs.pages[l.page]);

            let mut chunk = Chunk::new();
            let mut struct_elem = chunk.indirect(item_ref).start::<StructElement>();
            let tag = self.tag_name(id)?;
            struct_elem.pair(Name(b"S"), Name(tag.as_bytes()));
            struct_elem.parent(parent_ref);

            if let Some(page_ref) = page_ref {
                struct_elem.page(page_ref);
            }

            if let Some(title) = &item.extra.title {
                struct_elem.title(TextStr(title));
            }

            if let Some(lang) = &item.extra.lang {
                struct_elem.lang(TextStr(lang));
            }

            if let Some(alt) = &item.extra.alt {
                struct_elem.alt(TextStr(alt));
            }

            if let Some(actual_text) = &item.extra.actual_text {
                struct_elem.actual_text(TextStr(actual_text));
            }

            // Items without content and children still get an empty `K`.
            let mut struct_children = struct_elem.children();
            if let Some(location) = location {
                struct_children.marked_content_id(location.mcid);
            }
            for kid in kids {
                struct_children.struct_element(kid);
            }
            struct_children.finish();

            struct_elem.finish();
            sc.chunk_container.struct_elements.push(chunk);
        }

        let mut chunk = Chunk::new();
        let mut sub_chunks = vec![];
        let mut tree = chunk.indirect(root_ref).dict();
        tree.pair(Name(b"Type"), Name(b"StructTreeRoot"));

        let top_level = children
            .get(&None)
            .map(|kids| {
                kids.iter()
                    .map(|k| sc.refs.structure_items.get(*k))
                    .collect::<CapyResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();
        tree.insert(Name(b"K")).array().items(top_level);

        if !self.roles.is_empty() {
            let mut role_map = tree.insert(Name(b"RoleMap")).dict();
            for role in self.roles.values() {
                role_map.pair(Name(role.name.as_bytes()), Name(role.builtin.as_str().as_bytes()));
            }
            role_map.finish();
        }

        let mut parent_tree = tree.insert(Name(b"ParentTree")).start::<NumberTree<Ref>>();
        let mut tree_nums = parent_tree.nums();

        for (page, items) in page_contents.iter().enumerate() {
            if items.is_empty() {
                continue;
            }

            let list_ref = sc.new_ref();
            let mut list_chunk = Chunk::new();
            let mut refs = list_chunk.indirect(list_ref).array();
            for item in items {
                refs.item(sc.refs.structure_items.get(*item)?);
            }
            refs.finish();

            sub_chunks.push(list_chunk);
            tree_nums.insert(page as i32, list_ref);
        }

        tree_nums.finish();
        parent_tree.finish();

        tree.pair(Name(b"ParentTreeNextKey"), page_contents.len() as i32);
        tree.finish();

        for sub_chunk in sub_chunks {
            chunk.extend(&sub_chunk);
        }

        sc.chunk_container.struct_tree_root = Some((root_ref, chunk));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_must_exist() {
        let mut tree = StructureTree::new(DocumentId::fresh());
        let mut other = StructureTree::new(DocumentId::fresh());

        let document = tree
            .add_item(StructureType::Document.into(), None, StructItemExtraData::default())
            .unwrap();
        assert!(tree
            .add_item(StructureType::P.into(), Some(document), StructItemExtraData::default())
            .is_ok());

        assert_eq!(
            other
                .add_item(StructureType::P.into(), Some(document), StructItemExtraData::default())
                .unwrap_err(),
            CapyError::UnknownParent {
                kind: "structure item",
                index: 0
            }
        );
    }

    #[test]
    fn roles_are_unique_and_named() {
        let mut tree = StructureTree::new(DocumentId::fresh());

        let chapter = tree.add_role("Chapter", StructureType::Sect).unwrap();
        assert_eq!(
            tree.add_role("Chapter", StructureType::Part),
            Err(CapyError::DuplicateName("Chapter".to_string()))
        );
        assert!(tree.add_role("/Chapter", StructureType::Part).is_err());
        assert!(tree.add_role("", StructureType::Part).is_err());

        let item = tree
            .add_item(chapter.into(), None, StructItemExtraData::default())
            .unwrap();
        assert_eq!(tree.tag_name(item).unwrap(), "Chapter");
    }
}
