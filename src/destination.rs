//! Destinations within the document.
//!
//! A destination names a page by its index. The page doesn't need to exist yet when
//! the destination is created, for example when an outline entry is added before the
//! page it points to. All destinations are collected in a [`DestinationTable`] while
//! the document is built and resolved against the final page list once it is written.

use pdf_writer::{Obj, Ref};

use crate::error::{CapyError, CapyResult};
use crate::util::check_finite;

/// How the target page is displayed.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DestinationView {
    /// Fit the whole page into the window.
    Fit,
    /// Put the point at the top-left corner of the window, optionally with a zoom factor.
    Xyz {
        /// The horizontal coordinate.
        x: f32,
        /// The vertical coordinate.
        y: f32,
        /// The zoom factor, or `None` to keep the current one.
        zoom: Option<f32>,
    },
}

/// A location in the document.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Destination {
    /// The zero-based index of the target page.
    pub page: usize,
    /// How the page is displayed.
    pub view: DestinationView,
}

impl Destination {
    /// A destination that shows the whole page.
    pub fn fit(page: usize) -> Self {
        Self {
            page,
            view: DestinationView::Fit,
        }
    }

    /// A destination that scrolls to a point on the page.
    pub fn xyz(page: usize, x: f32, y: f32, zoom: Option<f32>) -> Self {
        Self {
            page,
            view: DestinationView::Xyz { x, y, zoom },
        }
    }

    pub(crate) fn validate(&self) -> CapyResult<()> {
        if let DestinationView::Xyz { x, y, zoom } = self.view {
            check_finite(&[x, y], "destination coordinate")?;

            if let Some(zoom) = zoom {
                check_finite(&[zoom], "zoom factor")?;

                if zoom < 0.0 {
                    return Err(CapyError::invalid("Zoom factor must not be negative."));
                }
            }
        }

        Ok(())
    }
}

/// An entry in the destination table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DestinationKey(usize);

/// All destinations of a document, unresolved until the document is written.
#[derive(Debug, Default)]
pub(crate) struct DestinationTable {
    entries: Vec<Destination>,
}

impl DestinationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, destination: Destination) -> CapyResult<DestinationKey> {
        destination.validate()?;
        self.entries.push(destination);
        Ok(DestinationKey(self.entries.len() - 1))
    }

    /// Check that every destination points to an existing page.
    pub(crate) fn check(&self, page_count: usize) -> CapyResult<()> {
        match self.entries.iter().find(|d| d.page >= page_count) {
            Some(destination) => Err(CapyError::UnresolvedDestination {
                page: destination.page,
                page_count,
            }),
            None => Ok(()),
        }
    }

    /// Write a destination as a direct array, given the references of all pages.
    pub(crate) fn write(&self, key: DestinationKey, pages: &[Ref], obj: Obj) -> CapyResult<()> {
        let destination = self.entries.get(key.0).ok_or_else(|| {
            CapyError::SerializationFailure(format!("unknown destination {}", key.0))
        })?;

        let page_ref = pages
            .get(destination.page)
            .copied()
            .ok_or(CapyError::UnresolvedDestination {
                page: destination.page,
                page_count: pages.len(),
            })?;

        let target = obj.start::<pdf_writer::writers::Destination>().page(page_ref);

        match destination.view {
            DestinationView::Fit => target.fit(),
            DestinationView::Xyz { x, y, zoom } => target.xyz(x, y, zoom),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pdf_writer::Chunk;

    use super::*;

    #[test]
    fn destinations_resolve_against_final_page_count() {
        let mut table = DestinationTable::new();
        let key = table.register(Destination::fit(2)).unwrap();

        assert_eq!(
            table.check(1),
            Err(CapyError::UnresolvedDestination {
                page: 2,
                page_count: 1
            })
        );
        assert!(table.check(3).is_ok());

        let pages = [Ref::new(2), Ref::new(3), Ref::new(4)];
        let mut chunk = Chunk::new();
        table
            .write(key, &pages, chunk.indirect(Ref::new(10)))
            .unwrap();

        let written = String::from_utf8_lossy(chunk.as_bytes()).into_owned();
        assert!(written.contains("[4 0 R /Fit]"));
    }

    #[test]
    fn negative_zoom_is_rejected() {
        let mut table = DestinationTable::new();
        assert!(table
            .register(Destination::xyz(0, 10.0, 20.0, Some(-1.0)))
            .is_err());
        assert!(table
            .register(Destination::xyz(0, 10.0, 20.0, None))
            .is_ok());
    }
}
