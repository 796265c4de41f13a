//! Text objects.
//!
//! A [`Text`] records the operators of one `BT`/`ET` bracket. It doesn't belong to a
//! draw context until it is rendered with [`DrawContext::render_text_obj`], which
//! is also when it is checked against the document and its text is encoded.
//!
//! [`DrawContext::render_text_obj`]: crate::draw::DrawContext::render_text_obj

use crate::color::Color;
use crate::draw::{check_dash_pattern, check_line_width, check_miter_limit};
use crate::error::{CapyError, CapyResult};
use crate::geom::Transform;
use crate::graphics_state::{LineCap, LineJoin};
use crate::handle::{FontId, GraphicsStateId, StructureItemId};
use crate::util::check_finite;

/// How glyphs are painted.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TextRenderingMode {
    #[default]
    Fill,
    Stroke,
    FillStroke,
    Invisible,
    FillClip,
    StrokeClip,
    FillStrokeClip,
    Clip,
}

impl TextRenderingMode {
    pub(crate) fn to_pdf(self) -> pdf_writer::types::TextRenderingMode {
        use pdf_writer::types::TextRenderingMode as Mode;

        match self {
            TextRenderingMode::Fill => Mode::Fill,
            TextRenderingMode::Stroke => Mode::Stroke,
            TextRenderingMode::FillStroke => Mode::FillStroke,
            TextRenderingMode::Invisible => Mode::Invisible,
            TextRenderingMode::FillClip => Mode::FillClip,
            TextRenderingMode::StrokeClip => Mode::StrokeClip,
            TextRenderingMode::FillStrokeClip => Mode::FillStrokeClip,
            TextRenderingMode::Clip => Mode::Clip,
        }
    }
}

/// One of the 14 standard fonts every PDF reader provides.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BuiltinFont {
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
    Symbol,
    ZapfDingbats,
}

impl BuiltinFont {
    /// The PostScript name of the font.
    pub fn base_font(self) -> &'static str {
        match self {
            BuiltinFont::TimesRoman => "Times-Roman",
            BuiltinFont::TimesBold => "Times-Bold",
            BuiltinFont::TimesItalic => "Times-Italic",
            BuiltinFont::TimesBoldItalic => "Times-BoldItalic",
            BuiltinFont::Helvetica => "Helvetica",
            BuiltinFont::HelveticaBold => "Helvetica-Bold",
            BuiltinFont::HelveticaOblique => "Helvetica-Oblique",
            BuiltinFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            BuiltinFont::Courier => "Courier",
            BuiltinFont::CourierBold => "Courier-Bold",
            BuiltinFont::CourierOblique => "Courier-Oblique",
            BuiltinFont::CourierBoldOblique => "Courier-BoldOblique",
            BuiltinFont::Symbol => "Symbol",
            BuiltinFont::ZapfDingbats => "ZapfDingbats",
        }
    }

    /// Symbolic fonts use their built-in encoding.
    pub(crate) fn is_symbolic(self) -> bool {
        matches!(self, BuiltinFont::Symbol | BuiltinFont::ZapfDingbats)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SequenceItem {
    /// A position adjustment in thousandths of text space units.
    Kerning(f32),
    Char(char),
    /// A glyph and the character it stands for.
    Glyph { glyph_id: u32, codepoint: char },
    /// A glyph that stands for more than one character, like a ligature.
    GlyphText { glyph_id: u32, text: String },
    ActualTextStart(String),
    ActualTextEnd,
}

/// The units shown by one `TJ` operator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextSequence {
    pub(crate) items: Vec<SequenceItem>,
    actual_text_open: bool,
}

impl TextSequence {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the next glyph by `kerning` thousandths of a text space unit. Positive
    /// values move it to the left.
    pub fn append_kerning(&mut self, kerning: f32) -> CapyResult<()> {
        check_finite(&[kerning], "kerning")?;
        self.items.push(SequenceItem::Kerning(kerning));
        Ok(())
    }

    /// Show a character with the glyph the font maps it to.
    pub fn append_unicode(&mut self, c: char) {
        self.items.push(SequenceItem::Char(c));
    }

    /// Show a specific glyph that stands for `codepoint`.
    pub fn append_glyph(&mut self, glyph_id: u32, codepoint: char) {
        self.items.push(SequenceItem::Glyph {
            glyph_id,
            codepoint,
        });
    }

    /// Show a glyph that stands for several characters, like the `fi` ligature.
    pub fn append_ligature_glyph(&mut self, glyph_id: u32, text: &str) -> CapyResult<()> {
        if text.is_empty() {
            return Err(CapyError::invalid("Ligature text must not be empty."));
        }

        self.items.push(SequenceItem::GlyphText {
            glyph_id,
            text: text.to_string(),
        });
        Ok(())
    }

    /// Start a span whose actual text replaces the text of the glyphs in it.
    pub fn append_actual_text_start(&mut self, actual_text: &str) -> CapyResult<()> {
        if self.actual_text_open {
            return Err(CapyError::unbalanced("Actual text spans can't be nested."));
        }

        self.actual_text_open = true;
        self.items
            .push(SequenceItem::ActualTextStart(actual_text.to_string()));
        Ok(())
    }

    /// End the current actual text span.
    pub fn append_actual_text_end(&mut self) -> CapyResult<()> {
        if !self.actual_text_open {
            return Err(CapyError::unbalanced("No actual text span to end."));
        }

        self.actual_text_open = false;
        self.items.push(SequenceItem::ActualTextEnd);
        Ok(())
    }

    /// The number of units in the sequence.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the sequence has no units.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn is_balanced(&self) -> bool {
        !self.actual_text_open
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TextOp {
    Font(FontId, f32),
    Leading(f32),
    CharSpacing(f32),
    WordSpacing(f32),
    HorizontalScaling(f32),
    RenderingMode(TextRenderingMode),
    Rise(f32),
    NextLine(f32, f32),
    NextLineSetLeading(f32, f32),
    NextLineUsingLeading,
    Matrix(Transform),
    Show(String),
    ShowSequence(TextSequence),
    StrokeColor(Color),
    FillColor(Color),
    LineWidth(f32),
    MiterLimit(f32),
    LineJoin(LineJoin),
    LineCap(LineCap),
    DashPattern(Vec<f32>, f32),
    GraphicsState(GraphicsStateId),
    BeginStructure(StructureItemId),
    EndMarkedContent,
}

/// A text object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Text {
    pub(crate) ops: Vec<TextOp>,
    marked_depth: u32,
    has_font: bool,
}

impl Text {
    /// Create an empty text object.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn marked_depth(&self) -> u32 {
        self.marked_depth
    }

    fn push_checked(&mut self, values: &[f32], what: &str, op: TextOp) -> CapyResult<()> {
        check_finite(values, what)?;
        self.ops.push(op);
        Ok(())
    }

    /// `Tf`
    pub fn set_font(&mut self, font: FontId, size: f32) -> CapyResult<()> {
        self.push_checked(&[size], "font size", TextOp::Font(font, size))?;
        self.has_font = true;
        Ok(())
    }

    /// `TL`
    pub fn set_leading(&mut self, leading: f32) -> CapyResult<()> {
        self.push_checked(&[leading], "leading", TextOp::Leading(leading))
    }

    /// `Tc`
    pub fn set_char_spacing(&mut self, spacing: f32) -> CapyResult<()> {
        self.push_checked(&[spacing], "character spacing", TextOp::CharSpacing(spacing))
    }

    /// `Tw`
    pub fn set_word_spacing(&mut self, spacing: f32) -> CapyResult<()> {
        self.push_checked(&[spacing], "word spacing", TextOp::WordSpacing(spacing))
    }

    /// `Tz`, in percent.
    pub fn set_horizontal_scaling(&mut self, scaling: f32) -> CapyResult<()> {
        self.push_checked(
            &[scaling],
            "horizontal scaling",
            TextOp::HorizontalScaling(scaling),
        )
    }

    /// `Tr`
    pub fn set_rendering_mode(&mut self, mode: TextRenderingMode) {
        self.ops.push(TextOp::RenderingMode(mode));
    }

    /// `Ts`
    pub fn set_rise(&mut self, rise: f32) -> CapyResult<()> {
        self.push_checked(&[rise], "text rise", TextOp::Rise(rise))
    }

    /// `Td`
    pub fn next_line(&mut self, tx: f32, ty: f32) -> CapyResult<()> {
        self.push_checked(&[tx, ty], "text offset", TextOp::NextLine(tx, ty))
    }

    /// `TD`
    pub fn next_line_and_set_leading(&mut self, tx: f32, ty: f32) -> CapyResult<()> {
        self.push_checked(&[tx, ty], "text offset", TextOp::NextLineSetLeading(tx, ty))
    }

    /// `T*`
    pub fn next_line_using_leading(&mut self) {
        self.ops.push(TextOp::NextLineUsingLeading);
    }

    /// `Tm`
    pub fn set_text_matrix(&mut self, matrix: Transform) -> CapyResult<()> {
        self.push_checked(
            &[matrix.sx, matrix.ky, matrix.kx, matrix.sy, matrix.tx, matrix.ty],
            "text matrix",
            TextOp::Matrix(matrix),
        )
    }

    fn check_font(&self) -> CapyResult<()> {
        if self.has_font {
            Ok(())
        } else {
            Err(CapyError::invalid("No font set for text."))
        }
    }

    /// `Tj`
    pub fn render_text(&mut self, text: &str) -> CapyResult<()> {
        self.check_font()?;
        self.ops.push(TextOp::Show(text.to_string()));
        Ok(())
    }

    /// `TJ`
    pub fn render_sequence(&mut self, sequence: TextSequence) -> CapyResult<()> {
        self.check_font()?;

        if !sequence.is_balanced() {
            return Err(CapyError::unbalanced(
                "Text sequence has an unterminated actual text span.",
            ));
        }

        self.ops.push(TextOp::ShowSequence(sequence));
        Ok(())
    }

    /// Set the color used for stroking glyphs.
    pub fn set_stroke_color(&mut self, color: Color) -> CapyResult<()> {
        color.validate_values()?;
        self.ops.push(TextOp::StrokeColor(color));
        Ok(())
    }

    /// Set the color used for filling glyphs.
    pub fn set_fill_color(&mut self, color: Color) -> CapyResult<()> {
        color.validate_values()?;
        self.ops.push(TextOp::FillColor(color));
        Ok(())
    }

    /// `w`
    pub fn set_line_width(&mut self, width: f32) -> CapyResult<()> {
        check_line_width(width)?;
        self.ops.push(TextOp::LineWidth(width));
        Ok(())
    }

    /// `M`
    pub fn set_miter_limit(&mut self, limit: f32) -> CapyResult<()> {
        check_miter_limit(limit)?;
        self.ops.push(TextOp::MiterLimit(limit));
        Ok(())
    }

    /// `j`
    pub fn set_line_join(&mut self, join: LineJoin) {
        self.ops.push(TextOp::LineJoin(join));
    }

    /// `J`
    pub fn set_line_cap(&mut self, cap: LineCap) {
        self.ops.push(TextOp::LineCap(cap));
    }

    /// `d`
    pub fn set_dash_pattern(&mut self, array: &[f32], phase: f32) -> CapyResult<()> {
        check_dash_pattern(array, phase)?;
        self.ops.push(TextOp::DashPattern(array.to_vec(), phase));
        Ok(())
    }

    /// `gs`
    pub fn set_graphics_state(&mut self, state: GraphicsStateId) {
        self.ops.push(TextOp::GraphicsState(state));
    }

    /// `BDC` with the tag of a structure item.
    pub fn begin_marked_structure(&mut self, item: StructureItemId) {
        self.marked_depth += 1;
        self.ops.push(TextOp::BeginStructure(item));
    }

    /// `EMC`
    pub fn end_marked_content(&mut self) -> CapyResult<()> {
        if self.marked_depth == 0 {
            return Err(CapyError::unbalanced("EMC without matching BDC."));
        }

        self.marked_depth -= 1;
        self.ops.push(TextOp::EndMarkedContent);
        Ok(())
    }
}
