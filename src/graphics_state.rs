//! Extended graphics states, transparency groups and optional content.

use pdf_writer::{Chunk, Dict, Finish, Name, Ref, TextStr};

use crate::chunk_container::ChunkContainerFn;
use crate::color::ColorSpace;
use crate::error::{CapyError, CapyResult};
use crate::handle::{DocumentId, Handle, TransparencyGroupId};
use crate::serialize::{Serialize, SerializeContext};
use crate::util::{check_finite, check_unit_range};

/// The shape at the end of open stroked paths.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LineCap {
    /// Square cap at the end point.
    Butt,
    /// Round cap around the end point.
    Round,
    /// Square cap projecting half the line width beyond the end point.
    ProjectingSquare,
}

impl LineCap {
    pub(crate) fn to_pdf(self) -> pdf_writer::types::LineCapStyle {
        match self {
            LineCap::Butt => pdf_writer::types::LineCapStyle::ButtCap,
            LineCap::Round => pdf_writer::types::LineCapStyle::RoundCap,
            LineCap::ProjectingSquare => pdf_writer::types::LineCapStyle::ProjectingSquareCap,
        }
    }
}

/// The shape at the corners of stroked paths.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LineJoin {
    /// Sharp corner, limited by the miter limit.
    Miter,
    /// Rounded corner.
    Round,
    /// Cut-off corner.
    Bevel,
}

impl LineJoin {
    pub(crate) fn to_pdf(self) -> pdf_writer::types::LineJoinStyle {
        match self {
            LineJoin::Miter => pdf_writer::types::LineJoinStyle::MiterJoin,
            LineJoin::Round => pdf_writer::types::LineJoinStyle::RoundJoin,
            LineJoin::Bevel => pdf_writer::types::LineJoinStyle::BevelJoin,
        }
    }
}

/// How colors are mapped to the gamut of the output device.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderingIntent {
    AbsoluteColorimetric,
    RelativeColorimetric,
    Saturation,
    Perceptual,
}

impl RenderingIntent {
    pub(crate) fn to_pdf_name(self) -> Name<'static> {
        match self {
            RenderingIntent::AbsoluteColorimetric => Name(b"AbsoluteColorimetric"),
            RenderingIntent::RelativeColorimetric => Name(b"RelativeColorimetric"),
            RenderingIntent::Saturation => Name(b"Saturation"),
            RenderingIntent::Perceptual => Name(b"Perceptual"),
        }
    }
}

/// A blend mode.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub(crate) fn to_pdf(self) -> pdf_writer::types::BlendMode {
        match self {
            BlendMode::Normal => pdf_writer::types::BlendMode::Normal,
            BlendMode::Multiply => pdf_writer::types::BlendMode::Multiply,
            BlendMode::Screen => pdf_writer::types::BlendMode::Screen,
            BlendMode::Overlay => pdf_writer::types::BlendMode::Overlay,
            BlendMode::Darken => pdf_writer::types::BlendMode::Darken,
            BlendMode::Lighten => pdf_writer::types::BlendMode::Lighten,
            BlendMode::ColorDodge => pdf_writer::types::BlendMode::ColorDodge,
            BlendMode::ColorBurn => pdf_writer::types::BlendMode::ColorBurn,
            BlendMode::HardLight => pdf_writer::types::BlendMode::HardLight,
            BlendMode::SoftLight => pdf_writer::types::BlendMode::SoftLight,
            BlendMode::Difference => pdf_writer::types::BlendMode::Difference,
            BlendMode::Exclusion => pdf_writer::types::BlendMode::Exclusion,
            BlendMode::Hue => pdf_writer::types::BlendMode::Hue,
            BlendMode::Saturation => pdf_writer::types::BlendMode::Saturation,
            BlendMode::Color => pdf_writer::types::BlendMode::Color,
            BlendMode::Luminosity => pdf_writer::types::BlendMode::Luminosity,
        }
    }
}

/// How the values of a soft mask are derived from its group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SoftMaskSubtype {
    /// The alpha channel of the group.
    Alpha,
    /// The luminosity of the group.
    Luminosity,
}

/// A soft mask, which makes the content it is applied to partially transparent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SoftMask {
    /// How to compute the mask values.
    pub subtype: SoftMaskSubtype,
    /// The transparency group that defines the mask.
    pub group: TransparencyGroupId,
}

/// An extended graphics state, applied with the `gs` operator.
///
/// Every field that is `None` is left untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphicsState {
    /// `LW`
    pub line_width: Option<f32>,
    /// `LC`
    pub line_cap: Option<LineCap>,
    /// `LJ`
    pub line_join: Option<LineJoin>,
    /// `ML`
    pub miter_limit: Option<f32>,
    /// `RI`
    pub rendering_intent: Option<RenderingIntent>,
    /// `OP`, overprint for stroking.
    pub stroke_overprint: Option<bool>,
    /// `op`, overprint for everything else.
    pub fill_overprint: Option<bool>,
    /// `OPM`, either 0 or 1.
    pub overprint_mode: Option<i32>,
    /// `FL`
    pub flatness: Option<f32>,
    /// `SM`
    pub smoothness: Option<f32>,
    /// `BM`
    pub blend_mode: Option<BlendMode>,
    /// `SMask`
    pub soft_mask: Option<SoftMask>,
    /// `CA`
    pub stroke_alpha: Option<f32>,
    /// `ca`
    pub fill_alpha: Option<f32>,
    /// `AIS`
    pub alpha_is_shape: Option<bool>,
    /// `TK`
    pub text_knockout: Option<bool>,
}

impl GraphicsState {
    pub(crate) fn validate(&self, document: DocumentId) -> CapyResult<()> {
        let numbers = [
            self.line_width,
            self.miter_limit,
            self.flatness,
            self.smoothness,
            self.stroke_alpha,
            self.fill_alpha,
        ];
        check_finite(&numbers.iter().flatten().copied().collect::<Vec<_>>(), "graphics state value")?;

        if self.line_width.is_some_and(|w| w < 0.0) {
            return Err(CapyError::invalid("Negative line width."));
        }

        if self.miter_limit.is_some_and(|m| m < 0.0) {
            return Err(CapyError::invalid("Negative miter limit."));
        }

        if self.flatness.is_some_and(|f| !(0.0..=100.0).contains(&f)) {
            return Err(CapyError::invalid("Flatness must be in the range [0, 100]."));
        }

        if let Some(smoothness) = self.smoothness {
            check_unit_range(&[smoothness], "Smoothness")?;
        }

        if let Some(alpha) = self.stroke_alpha {
            check_unit_range(&[alpha], "Stroke alpha")?;
        }

        if let Some(alpha) = self.fill_alpha {
            check_unit_range(&[alpha], "Fill alpha")?;
        }

        if self.overprint_mode.is_some_and(|m| m != 0 && m != 1) {
            return Err(CapyError::invalid("Overprint mode must be 0 or 1."));
        }

        if let Some(soft_mask) = &self.soft_mask {
            soft_mask.group.check(document)?;
        }

        Ok(())
    }
}

impl Serialize for GraphicsState {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.ext_g_states
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();
        let soft_mask = self
            .soft_mask
            .map(|m| sc.refs.transparency_groups.get(m.group).map(|r| (m.subtype, r)))
            .transpose()?;

        let mut ext_st = chunk.ext_graphics(root_ref);

        if let Some(width) = self.line_width {
            ext_st.line_width(width);
        }

        if let Some(cap) = self.line_cap {
            ext_st.line_cap(cap.to_pdf());
        }

        if let Some(join) = self.line_join {
            ext_st.line_join(join.to_pdf());
        }

        if let Some(limit) = self.miter_limit {
            ext_st.miter_limit(limit);
        }

        if let Some(intent) = self.rendering_intent {
            ext_st.pair(Name(b"RI"), intent.to_pdf_name());
        }

        if let Some(overprint) = self.stroke_overprint {
            ext_st.pair(Name(b"OP"), overprint);
        }

        if let Some(overprint) = self.fill_overprint {
            ext_st.pair(Name(b"op"), overprint);
        }

        if let Some(mode) = self.overprint_mode {
            ext_st.pair(Name(b"OPM"), mode);
        }

        if let Some(flatness) = self.flatness {
            ext_st.pair(Name(b"FL"), flatness);
        }

        if let Some(smoothness) = self.smoothness {
            ext_st.pair(Name(b"SM"), smoothness);
        }

        if let Some(bm) = self.blend_mode {
            ext_st.blend_mode(bm.to_pdf());
        }

        if let Some((subtype, group_ref)) = soft_mask {
            let mut mask = ext_st.insert(Name(b"SMask")).dict();
            mask.pair(Name(b"Type"), Name(b"Mask"));
            mask.pair(
                Name(b"S"),
                match subtype {
                    SoftMaskSubtype::Alpha => Name(b"Alpha"),
                    SoftMaskSubtype::Luminosity => Name(b"Luminosity"),
                },
            );
            mask.pair(Name(b"G"), group_ref);
            mask.finish();
        }

        if let Some(alpha) = self.stroke_alpha {
            ext_st.stroking_alpha(alpha);
        }

        if let Some(alpha) = self.fill_alpha {
            ext_st.non_stroking_alpha(alpha);
        }

        if let Some(ais) = self.alpha_is_shape {
            ext_st.pair(Name(b"AIS"), ais);
        }

        if let Some(tk) = self.text_knockout {
            ext_st.pair(Name(b"TK"), tk);
        }

        ext_st.finish();

        Ok(chunk)
    }
}

/// The properties of a transparency group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TransparencyGroupProperties {
    /// The blending colorspace of the group.
    pub color_space: Option<ColorSpace>,
    /// Whether the group is composited against a fully transparent backdrop.
    pub isolated: bool,
    /// Whether objects of the group knock out earlier objects of the same group.
    pub knockout: bool,
}

impl TransparencyGroupProperties {
    pub(crate) fn validate(&self, document: DocumentId) -> CapyResult<()> {
        match self.color_space {
            Some(ColorSpace::Pattern) | Some(ColorSpace::Separation(_)) => {
                Err(CapyError::TypeMismatch {
                    expected: "a device, ICC or Lab colorspace",
                    found: self.color_space.map(|c| c.kind()).unwrap_or_default(),
                })
            }
            Some(cs) => cs.check_document(document),
            None => Ok(()),
        }
    }

    /// Write the `/Group` dictionary.
    pub(crate) fn write(&self, sc: &SerializeContext, mut group: Dict) -> CapyResult<()> {
        group.pair(Name(b"Type"), Name(b"Group"));
        group.pair(Name(b"S"), Name(b"Transparency"));

        if let Some(color_space) = self.color_space {
            color_space.write(sc, group.insert(Name(b"CS")))?;
        }

        if self.isolated {
            group.pair(Name(b"I"), true);
        }

        if self.knockout {
            group.pair(Name(b"K"), true);
        }

        group.finish();

        Ok(())
    }
}

/// An optional content group, i.e. a layer that viewers can toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OptionalContentGroup {
    pub(crate) name: String,
}

impl Serialize for OptionalContentGroup {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.optional_content
    }

    fn serialize(&self, _: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();
        let mut ocg = chunk.indirect(root_ref).dict();
        ocg.pair(Name(b"Type"), Name(b"OCG"));
        ocg.pair(Name(b"Name"), TextStr(&self.name));
        ocg.finish();

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure::SerializeSettings;
    use crate::serialize::ObjectCounts;

    #[test]
    fn graphics_state_values_are_validated() {
        let doc = DocumentId::fresh();

        let state = GraphicsState {
            fill_alpha: Some(0.5),
            blend_mode: Some(BlendMode::Multiply),
            ..GraphicsState::default()
        };
        assert!(state.validate(doc).is_ok());

        let state = GraphicsState {
            line_width: Some(-1.0),
            ..GraphicsState::default()
        };
        assert_eq!(
            state.validate(doc),
            Err(CapyError::invalid("Negative line width."))
        );

        let state = GraphicsState {
            stroke_alpha: Some(1.5),
            ..GraphicsState::default()
        };
        assert!(state.validate(doc).is_err());

        let state = GraphicsState {
            overprint_mode: Some(2),
            ..GraphicsState::default()
        };
        assert!(state.validate(doc).is_err());
    }

    #[test]
    fn soft_mask_group_must_belong_to_document() {
        let state = GraphicsState {
            soft_mask: Some(SoftMask {
                subtype: SoftMaskSubtype::Luminosity,
                group: TransparencyGroupId::new(DocumentId::fresh(), 0),
            }),
            ..GraphicsState::default()
        };

        assert!(matches!(
            state.validate(DocumentId::fresh()),
            Err(CapyError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn graphics_state_is_serialized() {
        let mut sc = SerializeContext::new(SerializeSettings::default(), ObjectCounts::default());
        let state = GraphicsState {
            stroke_overprint: Some(true),
            fill_overprint: Some(true),
            overprint_mode: Some(1),
            fill_alpha: Some(0.25),
            ..GraphicsState::default()
        };

        let root_ref = sc.new_ref();
        let chunk = state.serialize(&mut sc, root_ref).unwrap();
        let data = String::from_utf8_lossy(chunk.as_bytes()).into_owned();

        assert!(data.contains("/Type /ExtGState"));
        assert!(data.contains("/OP true"));
        assert!(data.contains("/op true"));
        assert!(data.contains("/OPM 1"));
        assert!(data.contains("/ca 0.25"));
    }
}
