//! Pages and page labels.

use std::ops::DerefMut;

use pdf_writer::{Chunk, Dict, Finish, Name, Ref, TextStr};

use crate::chunk_container::ChunkContainerFn;
use crate::error::{CapyError, CapyResult};
use crate::geom::{Rect, RectExt};
use crate::graphics_state::TransparencyGroupProperties;
use crate::handle::{AnnotationId, DocumentId};
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::{FilterStreamBuilder, Stream};
use crate::util::check_finite;

/// The geometry and group of a page.
///
/// Every field that is `None` falls back to the default page properties of the
/// document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageProperties {
    /// The boundaries of the physical medium.
    pub media_box: Option<Rect>,
    /// The visible region of the page.
    pub crop_box: Option<Rect>,
    /// The region to which the page is clipped in production.
    pub bleed_box: Option<Rect>,
    /// The intended dimensions of the finished page.
    pub trim_box: Option<Rect>,
    /// The extent of meaningful content.
    pub art_box: Option<Rect>,
    /// The size of one user space unit, in multiples of 1/72 inch.
    pub user_unit: Option<f32>,
    /// The transparency group the page is composited as.
    pub transparency_group: Option<TransparencyGroupProperties>,
}

impl PageProperties {
    /// Properties with an A4 media box and nothing else.
    pub fn a4() -> Self {
        Self {
            media_box: Rect::from_xywh(0.0, 0.0, 595.28, 841.89),
            ..Self::default()
        }
    }

    /// Fill every unset field with the value in `defaults`.
    pub fn merge_with(&self, defaults: &PageProperties) -> PageProperties {
        PageProperties {
            media_box: self.media_box.or(defaults.media_box),
            crop_box: self.crop_box.or(defaults.crop_box),
            bleed_box: self.bleed_box.or(defaults.bleed_box),
            trim_box: self.trim_box.or(defaults.trim_box),
            art_box: self.art_box.or(defaults.art_box),
            user_unit: self.user_unit.or(defaults.user_unit),
            transparency_group: self
                .transparency_group
                .clone()
                .or_else(|| defaults.transparency_group.clone()),
        }
    }

    pub(crate) fn validate(&self, document: DocumentId) -> CapyResult<()> {
        if let Some(user_unit) = self.user_unit {
            check_finite(&[user_unit], "user unit")?;

            if user_unit <= 0.0 {
                return Err(CapyError::invalid("User unit must be positive."));
            }
        }

        if let Some(group) = &self.transparency_group {
            group.validate(document)?;
        }

        Ok(())
    }
}

/// The visual effect of a presentation viewer moving to a page.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransitionStyle {
    Split,
    Blinds,
    Box,
    Wipe,
    Dissolve,
    Glitter,
    Replace,
    Fly,
    Push,
    Cover,
    Uncover,
    Fade,
}

impl TransitionStyle {
    fn to_pdf_name(self) -> Name<'static> {
        let name: &'static [u8] = match self {
            TransitionStyle::Split => b"Split",
            TransitionStyle::Blinds => b"Blinds",
            TransitionStyle::Box => b"Box",
            TransitionStyle::Wipe => b"Wipe",
            TransitionStyle::Dissolve => b"Dissolve",
            TransitionStyle::Glitter => b"Glitter",
            TransitionStyle::Replace => b"R",
            TransitionStyle::Fly => b"Fly",
            TransitionStyle::Push => b"Push",
            TransitionStyle::Cover => b"Cover",
            TransitionStyle::Uncover => b"Uncover",
            TransitionStyle::Fade => b"Fade",
        };

        Name(name)
    }
}

/// A page transition. Unset fields are left to the viewer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transition {
    /// The effect.
    pub style: Option<TransitionStyle>,
    /// The duration in seconds.
    pub duration: Option<f32>,
    /// Whether `Split` and `Blinds` move vertically instead of horizontally.
    pub vertical: Option<bool>,
    /// Whether `Split` and `Box` move inward instead of outward.
    pub inward: Option<bool>,
    /// The direction of the effect in degrees, counterclockwise from left to right.
    pub direction: Option<u16>,
    /// The starting scale of `Fly`.
    pub scale: Option<f32>,
    /// Whether the area flown in by `Fly` is opaque.
    pub opaque: Option<bool>,
}

impl Transition {
    pub(crate) fn validate(&self) -> CapyResult<()> {
        if let Some(duration) = self.duration {
            check_finite(&[duration], "transition duration")?;

            if duration < 0.0 {
                return Err(CapyError::invalid("Negative transition duration."));
            }
        }

        if let Some(direction) = self.direction {
            if ![0, 90, 180, 270, 315].contains(&direction) {
                return Err(CapyError::invalid(format!(
                    "Invalid transition direction {direction}."
                )));
            }
        }

        if let Some(scale) = self.scale {
            check_finite(&[scale], "transition scale")?;

            if scale <= 0.0 {
                return Err(CapyError::invalid("Transition scale must be positive."));
            }
        }

        Ok(())
    }

    fn write(&self, mut dict: Dict) {
        dict.pair(Name(b"Type"), Name(b"Trans"));

        if let Some(style) = self.style {
            dict.pair(Name(b"S"), style.to_pdf_name());
        }

        if let Some(duration) = self.duration {
            dict.pair(Name(b"D"), duration);
        }

        if let Some(vertical) = self.vertical {
            dict.pair(Name(b"Dm"), Name(if vertical { b"V" } else { b"H" }));
        }

        if let Some(inward) = self.inward {
            dict.pair(Name(b"M"), Name(if inward { b"I" } else { b"O" }));
        }

        if let Some(direction) = self.direction {
            dict.pair(Name(b"Di"), direction as i32);
        }

        if let Some(scale) = self.scale {
            dict.pair(Name(b"SS"), scale);
        }

        if let Some(opaque) = self.opaque {
            dict.pair(Name(b"B"), opaque);
        }
    }
}

/// A finished page.
#[derive(Debug)]
pub(crate) struct PageRecord {
    pub(crate) stream: Stream,
    /// Already merged with the document defaults.
    pub(crate) properties: PageProperties,
    pub(crate) annotations: Vec<AnnotationId>,
    pub(crate) struct_parents: Option<i32>,
    /// PDF/X requires every page to have a trim box.
    pub(crate) require_trim_box: bool,
    pub(crate) transition: Option<Transition>,
}

impl Serialize for PageRecord {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.pages
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();
        let stream_ref = sc.new_ref();

        let annotation_refs = self
            .annotations
            .iter()
            .map(|a| sc.refs.annotations.get(*a))
            .collect::<CapyResult<Vec<_>>>()?;

        let media_box = self.properties.media_box.unwrap_or(self.stream.bbox);

        let mut page = chunk.page(root_ref);
        page.parent(sc.page_tree_ref());
        page.media_box(media_box.to_pdf_rect());

        if let Some(crop_box) = self.properties.crop_box {
            page.crop_box(crop_box.to_pdf_rect());
        }

        if let Some(bleed_box) = self.properties.bleed_box {
            page.bleed_box(bleed_box.to_pdf_rect());
        }

        match self.properties.trim_box {
            Some(trim_box) => {
                page.trim_box(trim_box.to_pdf_rect());
            }
            None if self.require_trim_box => {
                page.trim_box(media_box.to_pdf_rect());
            }
            None => {}
        }

        if let Some(art_box) = self.properties.art_box {
            page.art_box(art_box.to_pdf_rect());
        }

        if let Some(user_unit) = self.properties.user_unit {
            page.pair(Name(b"UserUnit"), user_unit);
        }

        self.stream
            .resource_dictionary
            .to_pdf_resources(sc, &mut page)?;

        if let Some(group) = &self.properties.transparency_group {
            group.write(sc, page.insert(Name(b"Group")).dict())?;
        }

        if let Some(struct_parents) = self.struct_parents {
            page.struct_parents(struct_parents);
        }

        if let Some(transition) = &self.transition {
            transition.write(page.insert(Name(b"Trans")).dict());
        }

        if !annotation_refs.is_empty() {
            page.annotations(annotation_refs);
        }

        page.contents(stream_ref);
        page.finish();

        let page_stream =
            FilterStreamBuilder::new_from_content_stream(&self.stream.content, sc.serialize_settings())
                .finish(sc.serialize_settings());
        let mut stream = chunk.stream(stream_ref, page_stream.encoded_data());
        page_stream.write_filters(stream.deref_mut());
        stream.finish();

        Ok(chunk)
    }
}

/// The numbering style of a page label.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NumberingStyle {
    /// Arabic numerals.
    Arabic,
    /// Lowercase Roman numerals.
    LowerRoman,
    /// Uppercase Roman numerals.
    UpperRoman,
    /// Lowercase letters (a-z, then aa-zz, ...).
    LowerAlpha,
    /// Uppercase letters (A-Z, then AA-ZZ, ...).
    UpperAlpha,
}

impl NumberingStyle {
    fn to_pdf(self) -> pdf_writer::types::NumberingStyle {
        match self {
            NumberingStyle::Arabic => pdf_writer::types::NumberingStyle::Arabic,
            NumberingStyle::LowerRoman => pdf_writer::types::NumberingStyle::LowerRoman,
            NumberingStyle::UpperRoman => pdf_writer::types::NumberingStyle::UpperRoman,
            NumberingStyle::LowerAlpha => pdf_writer::types::NumberingStyle::LowerAlpha,
            NumberingStyle::UpperAlpha => pdf_writer::types::NumberingStyle::UpperAlpha,
        }
    }
}

/// The labeling of a range of pages, starting at `start_page`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PageLabel {
    pub(crate) start_page: u32,
    pub(crate) style: Option<NumberingStyle>,
    pub(crate) prefix: Option<String>,
    pub(crate) start_num: Option<u32>,
}

impl PageLabel {
    pub(crate) fn validate(&self) -> CapyResult<()> {
        if self.start_num == Some(0) {
            return Err(CapyError::invalid("Page label numbering starts at 1."));
        }

        Ok(())
    }
}

/// Write the `PageLabels` number tree.
///
/// Labels that start beyond the last page are dropped.
pub(crate) fn serialize_page_labels(
    labels: &[PageLabel],
    page_count: usize,
    root_ref: Ref,
) -> CapyResult<Option<Chunk>> {
    let mut labels = labels
        .iter()
        .filter(|label| {
            let in_range = (label.start_page as usize) < page_count;
            if !in_range {
                log::warn!(
                    "dropping page label for page {}, the document only has {} pages",
                    label.start_page,
                    page_count
                );
            }
            in_range
        })
        .collect::<Vec<_>>();

    if labels.is_empty() {
        return Ok(None);
    }

    // Number trees must be sorted by key.
    labels.sort_by_key(|label| label.start_page);

    // Labels are direct dictionaries, so the tree is written untyped.
    let mut chunk = Chunk::new();
    let mut tree = chunk.indirect(root_ref).dict();
    let mut nums = tree.insert(Name(b"Nums")).array();

    for label in labels {
        nums.item(label.start_page as i32);
        let mut dict = nums.push().start::<pdf_writer::writers::PageLabel>();

        if let Some(style) = label.style {
            dict.style(style.to_pdf());
        }

        if let Some(prefix) = &label.prefix {
            dict.prefix(TextStr(prefix));
        }

        if let Some(start_num) = label.start_num {
            let offset = i32::try_from(start_num)
                .map_err(|_| CapyError::invalid("Page label number is too large."))?;
            dict.offset(offset);
        }

        dict.finish();
    }

    nums.finish();
    tree.finish();

    Ok(Some(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_validated() {
        let fly = Transition {
            style: Some(TransitionStyle::Fly),
            direction: Some(315),
            scale: Some(0.5),
            ..Transition::default()
        };
        assert!(fly.validate().is_ok());

        let sideways = Transition {
            direction: Some(45),
            ..Transition::default()
        };
        assert!(matches!(
            sideways.validate(),
            Err(CapyError::InvalidArgument(_))
        ));

        let backwards = Transition {
            duration: Some(-1.0),
            ..Transition::default()
        };
        assert!(backwards.validate().is_err());
    }

    #[test]
    fn transition_dict_uses_short_keys() {
        let transition = Transition {
            style: Some(TransitionStyle::Split),
            duration: Some(2.0),
            vertical: Some(true),
            inward: Some(false),
            ..Transition::default()
        };

        let mut chunk = Chunk::new();
        transition.write(chunk.indirect(Ref::new(1)).dict());
        let written = String::from_utf8_lossy(chunk.as_bytes()).into_owned();
        assert!(written.contains("/Type /Trans"));
        assert!(written.contains("/S /Split"));
        assert!(written.contains("/D 2"));
        assert!(written.contains("/Dm /V"));
        assert!(written.contains("/M /O"));
        assert!(!written.contains("/Di"));
    }

    #[test]
    fn page_properties_merge_over_defaults() {
        let defaults = PageProperties {
            trim_box: Rect::from_xywh(10.0, 10.0, 100.0, 100.0),
            ..PageProperties::a4()
        };
        let custom = PageProperties {
            media_box: Rect::from_xywh(0.0, 0.0, 200.0, 200.0),
            ..PageProperties::default()
        };

        let merged = custom.merge_with(&defaults);
        assert_eq!(merged.media_box, Rect::from_xywh(0.0, 0.0, 200.0, 200.0));
        assert_eq!(merged.trim_box, defaults.trim_box);
        assert_eq!(merged.art_box, None);
    }

    #[test]
    fn user_unit_must_be_positive() {
        let doc = DocumentId::fresh();
        let properties = PageProperties {
            user_unit: Some(0.0),
            ..PageProperties::default()
        };
        assert!(properties.validate(doc).is_err());

        let properties = PageProperties {
            user_unit: Some(2.0),
            ..PageProperties::default()
        };
        assert!(properties.validate(doc).is_ok());
    }

    #[test]
    fn labels_beyond_the_last_page_are_dropped() {
        let label = PageLabel {
            start_page: 5,
            style: Some(NumberingStyle::LowerRoman),
            prefix: None,
            start_num: None,
        };

        assert!(serialize_page_labels(&[label], 3, Ref::new(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn labels_are_written_in_page_order() {
        let labels = [
            PageLabel {
                start_page: 2,
                style: Some(NumberingStyle::Arabic),
                prefix: None,
                start_num: Some(1),
            },
            PageLabel {
                start_page: 0,
                style: Some(NumberingStyle::LowerRoman),
                prefix: Some("p".to_string()),
                start_num: None,
            },
        ];

        let chunk = serialize_page_labels(&labels, 4, Ref::new(1))
            .unwrap()
            .unwrap();
        let written = String::from_utf8_lossy(chunk.as_bytes()).into_owned();
        let roman = written.find("/S /r").unwrap();
        let arabic = written.find("/S /D").unwrap();
        assert!(roman < arabic);
        assert!(written.contains("/St 1"));
    }
}
