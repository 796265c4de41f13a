//! The document outline, also known as bookmarks.
//!
//! Outline items form a forest of their own, independent of the structure tree. An
//! item's parent has to be added before the item itself, so following parents
//! always terminates.

use pdf_writer::{Chunk, Finish, Name, TextStr};

use crate::destination::{Destination, DestinationKey, DestinationTable};
use crate::error::{CapyError, CapyResult};
use crate::handle::{Arena, DocumentId, Handle, OutlineId};
use crate::serialize::SerializeContext;
use crate::util::{check_finite, check_unit_range};

/// An item of the outline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outline {
    /// The text shown for the item. Must not be empty.
    pub title: String,
    /// Where clicking the item leads.
    pub destination: Option<Destination>,
    /// The RGB color of the title.
    pub color: Option<(f32, f32, f32)>,
    /// Whether the title is shown in italics.
    pub italic: bool,
    /// Whether the title is shown in bold.
    pub bold: bool,
    /// Whether the children are hidden initially.
    pub closed: bool,
    /// The parent item, or `None` for a top-level item.
    pub parent: Option<OutlineId>,
}

#[derive(Debug, Clone)]
pub(crate) struct OutlineRecord {
    title: String,
    destination: Option<DestinationKey>,
    color: Option<(f32, f32, f32)>,
    flags: i32,
    closed: bool,
    parent: Option<OutlineId>,
}

#[derive(Debug)]
pub(crate) struct OutlineTree {
    document: DocumentId,
    items: Arena<OutlineId, OutlineRecord>,
}

impl OutlineTree {
    pub(crate) fn new(document: DocumentId) -> Self {
        Self {
            document,
            items: Arena::new(document),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn add(
        &mut self,
        outline: Outline,
        destinations: &mut DestinationTable,
    ) -> CapyResult<OutlineId> {
        if outline.title.is_empty() {
            return Err(CapyError::EmptyTitle);
        }

        if let Some(parent) = outline.parent {
            if parent.document() != self.document || !self.items.contains(parent) {
                return Err(CapyError::UnknownParent {
                    kind: OutlineId::KIND,
                    index: parent.index(),
                });
            }
        }

        if let Some((r, g, b)) = outline.color {
            check_finite(&[r, g, b], "outline color")?;
            check_unit_range(&[r, g, b], "Outline color components")?;
        }

        let destination = outline
            .destination
            .map(|d| destinations.register(d))
            .transpose()?;

        let mut flags = 0;
        if outline.italic {
            flags |= 1;
        }
        if outline.bold {
            flags |= 2;
        }

        Ok(self.items.push(OutlineRecord {
            title: outline.title,
            destination,
            color: outline.color,
            flags,
            closed: outline.closed,
            parent: outline.parent,
        }))
    }

    /// Check that following the parents always terminates.
    pub(crate) fn check_forest(&self) -> CapyResult<()> {
        for (id, item) in self.items.iter() {
            if let Some(parent) = item.parent {
                if parent.index() >= id.index() {
                    return Err(CapyError::UnknownParent {
                        kind: OutlineId::KIND,
                        index: parent.index(),
                    });
                }
            }
        }

        Ok(())
    }

    /// The children of every item, and the top-level items last.
    fn children(&self) -> (Vec<Vec<OutlineId>>, Vec<OutlineId>) {
        let mut children = vec![vec![]; self.items.len()];
        let mut top_level = vec![];

        for (id, item) in self.items.iter() {
            match item.parent {
                Some(parent) => children[parent.index() as usize].push(id),
                None => top_level.push(id),
            }
        }

        (children, top_level)
    }

    /// The number of descendants that are visible when the item itself is open.
    fn visible_descendants(&self) -> Vec<i32> {
        let mut visible = vec![0; self.items.len()];
        let records = self.items.values().collect::<Vec<_>>();

        // Children always come after their parent.
        for index in (0..records.len()).rev() {
            if let Some(parent) = records[index].parent {
                let own = if records[index].closed { 0 } else { visible[index] };
                visible[parent.index() as usize] += 1 + own;
            }
        }

        visible
    }

    /// Write the outline root and all items.
    pub(crate) fn serialize(
        &self,
        sc: &mut SerializeContext,
        destinations: &DestinationTable,
    ) -> CapyResult<()> {
        if self.items.is_empty() {
            return Ok(());
        }

        let root_ref = sc.new_ref();
        let (children, top_level) = self.children();
        let visible = self.visible_descendants();
        let pages = sc.refs.pages.clone();
        let refs = sc.refs.outlines.iter().collect::<Vec<_>>();
        let item_ref = |id: OutlineId| {
            refs.get(id.index() as usize)
                .copied()
                .ok_or_else(|| id.unknown())
        };

        for (id, item) in self.items.iter() {
            let own_ref = item_ref(id)?;
            let siblings = match item.parent {
                Some(parent) => &children[parent.index() as usize],
                None => &top_level,
            };
            let position = siblings.iter().position(|s| *s == id).unwrap_or(0);

            let mut chunk = Chunk::new();
            let mut outline_item = chunk.outline_item(own_ref);
            outline_item.title(TextStr(&item.title));

            match item.parent {
                Some(parent) => outline_item.parent(item_ref(parent)?),
                None => outline_item.parent(root_ref),
            };

            if position > 0 {
                outline_item.prev(item_ref(siblings[position - 1])?);
            }

            if let Some(next) = siblings.get(position + 1) {
                outline_item.next(item_ref(*next)?);
            }

            let own_children = &children[id.index() as usize];
            if let (Some(first), Some(last)) = (own_children.first(), own_children.last()) {
                outline_item.first(item_ref(*first)?);
                outline_item.last(item_ref(*last)?);

                let count = visible[id.index() as usize];
                outline_item.count(if item.closed { -count } else { count });
            }

            if let Some(key) = item.destination {
                destinations.write(key, &pages, outline_item.insert(Name(b"Dest")))?;
            }

            if let Some((r, g, b)) = item.color {
                outline_item.insert(Name(b"C")).array().items([r, g, b]);
            }

            if item.flags != 0 {
                outline_item.pair(Name(b"F"), item.flags);
            }

            outline_item.finish();
            sc.chunk_container.outline_items.push(chunk);
        }

        let mut chunk = Chunk::new();
        let mut outline = chunk.outline(root_ref);

        if let (Some(first), Some(last)) = (top_level.first(), top_level.last()) {
            outline.first(item_ref(*first)?);
            outline.last(item_ref(*last)?);
        }

        let count = top_level
            .iter()
            .map(|id| match self.items.get(*id) {
                Ok(item) if item.closed => 1,
                _ => 1 + visible[id.index() as usize],
            })
            .sum::<i32>();
        outline.count(count);
        outline.finish();

        sc.chunk_container.outline = Some((root_ref, chunk));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(title: &str, parent: Option<OutlineId>) -> Outline {
        Outline {
            title: title.to_string(),
            parent,
            ..Outline::default()
        }
    }

    #[test]
    fn empty_title_is_rejected() {
        let doc = DocumentId::fresh();
        let mut tree = OutlineTree::new(doc);
        let mut destinations = DestinationTable::new();

        assert_eq!(
            tree.add(outline("", None), &mut destinations),
            Err(CapyError::EmptyTitle)
        );
    }

    #[test]
    fn foreign_parent_is_rejected() {
        let mut tree = OutlineTree::new(DocumentId::fresh());
        let mut destinations = DestinationTable::new();
        let foreign = OutlineId::new(DocumentId::fresh(), 0);

        assert_eq!(
            tree.add(outline("Chapter", Some(foreign)), &mut destinations),
            Err(CapyError::UnknownParent {
                kind: "outline",
                index: 0
            })
        );
    }

    #[test]
    fn closed_items_count_their_hidden_descendants() {
        let doc = DocumentId::fresh();
        let mut tree = OutlineTree::new(doc);
        let mut destinations = DestinationTable::new();

        let part = tree
            .add(
                Outline {
                    closed: true,
                    ..outline("Part", None)
                },
                &mut destinations,
            )
            .unwrap();
        let chapter = tree
            .add(outline("Chapter", Some(part)), &mut destinations)
            .unwrap();
        tree.add(outline("Section", Some(chapter)), &mut destinations)
            .unwrap();
        tree.add(outline("Appendix", None), &mut destinations)
            .unwrap();

        assert_eq!(tree.visible_descendants(), vec![2, 1, 0, 0]);
        assert!(tree.check_forest().is_ok());
    }
}
