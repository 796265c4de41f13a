//! Draw contexts.
//!
//! A [`DrawContext`] records the content stream of a page, a form XObject, a tiling
//! pattern or a transparency group. Operators are appended in call order. Invalid
//! arguments are rejected before anything is written, so a failed call never leaves
//! a partial operator behind.
//!
//! The graphics state stack (`q`/`Q`) and the marked content stack (`BMC`/`BDC`
//! and `EMC`) are tracked, and a context can only be added to its document once
//! both are empty again. The guards returned by [`DrawContext::push_state`] and the
//! `marked_*` methods close their scope when they are dropped.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use pdf_writer::types::ColorSpaceOperand;
use pdf_writer::{Content, Name, Str, TextStr};

use crate::color::{Color, ColorSpace, DeviceColorSpace};
use crate::document::Shared;
use crate::error::{CapyError, CapyResult};
use crate::font::FontRecord;
use crate::geom::{Rect, Transform, TransformExt};
use crate::graphics_state::{LineCap, LineJoin, RenderingIntent, TransparencyGroupProperties};
use crate::handle::{
    AnnotationId, AnyHandle, DocumentId, FontId, FormXObjectId, GraphicsStateId, Handle, ImageId,
    OptionalContentGroupId, ShadingId, StructureItemId, TransparencyGroupId,
};
use crate::page::{PageProperties, Transition};
use crate::resource::{self, ResourceDictionaryBuilder, XObjectKey};
use crate::stream::Stream;
use crate::text::{SequenceItem, Text, TextOp, TextSequence};
use crate::util::{check_finite, NameExt};

/// What a draw context draws.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DrawContextKind {
    /// The content of a page.
    Page,
    /// A reusable form XObject.
    FormXObject,
    /// The cell of a colored tiling pattern.
    ColorTiling,
    /// A transparency group, e.g. for soft masks.
    TransparencyGroup,
}

impl DrawContextKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            DrawContextKind::Page => "page context",
            DrawContextKind::FormXObject => "form XObject context",
            DrawContextKind::ColorTiling => "tiling pattern context",
            DrawContextKind::TransparencyGroup => "transparency group context",
        }
    }
}

pub(crate) fn check_line_width(width: f32) -> CapyResult<()> {
    check_finite(&[width], "line width")?;

    if width < 0.0 {
        return Err(CapyError::invalid("Negative line width."));
    }

    Ok(())
}

pub(crate) fn check_miter_limit(limit: f32) -> CapyResult<()> {
    check_finite(&[limit], "miter limit")?;

    if limit < 0.0 {
        return Err(CapyError::invalid("Negative miter limit."));
    }

    Ok(())
}

pub(crate) fn check_dash_pattern(array: &[f32], phase: f32) -> CapyResult<()> {
    check_finite(array, "dash array entry")?;
    check_finite(&[phase], "dash phase")?;

    if array.iter().any(|v| *v < 0.0) {
        return Err(CapyError::invalid("Dash array entries must not be negative."));
    }

    if !array.is_empty() && array.iter().all(|v| *v == 0.0) {
        return Err(CapyError::invalid("Dash array must not be all zeros."));
    }

    Ok(())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MarkedContent {
    Tag,
    Structure,
    OptionalContent,
}

/// Records drawing operators.
pub struct DrawContext {
    document: DocumentId,
    kind: DrawContextKind,
    bbox: Rect,
    content: Vec<u8>,
    resources: ResourceDictionaryBuilder,
    state_depth: u32,
    marked: Vec<MarkedContent>,
    /// Structure items in MCID order.
    structure_uses: Vec<StructureItemId>,
    annotations: Vec<AnnotationId>,
    page_properties: Option<PageProperties>,
    transition: Option<Transition>,
    shared: Rc<RefCell<Shared>>,
}

/// The parts of a draw context that outlive it once it is added to a document.
#[derive(Debug)]
pub(crate) struct FinishedContext {
    pub(crate) stream: Stream,
    pub(crate) structure_uses: Vec<StructureItemId>,
    pub(crate) annotations: Vec<AnnotationId>,
    pub(crate) page_properties: Option<PageProperties>,
    pub(crate) transition: Option<Transition>,
}

impl DrawContext {
    pub(crate) fn new(
        document: DocumentId,
        kind: DrawContextKind,
        bbox: Rect,
        shared: Rc<RefCell<Shared>>,
    ) -> Self {
        Self {
            document,
            kind,
            bbox,
            content: vec![],
            resources: ResourceDictionaryBuilder::new(),
            state_depth: 0,
            marked: vec![],
            structure_uses: vec![],
            annotations: vec![],
            page_properties: None,
            transition: None,
            shared,
        }
    }

    /// What the context draws.
    pub fn kind(&self) -> DrawContextKind {
        self.kind
    }

    /// The bounding box of the content.
    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    /// The current depth of the graphics state stack.
    pub fn state_depth(&self) -> u32 {
        self.state_depth
    }

    /// The current depth of the marked content stack.
    pub fn marked_content_depth(&self) -> usize {
        self.marked.len()
    }

    fn emit(&mut self, f: impl FnOnce(&mut Content)) {
        let mut content = Content::new();
        f(&mut content);
        self.append(content);
    }

    // `Content::finish` strips the final newline.
    fn append(&mut self, content: Content) {
        self.content.extend(content.finish().to_vec());
        self.content.push(b'\n');
    }

    fn check<H: Handle>(&self, handle: H) -> CapyResult<()> {
        handle.check(self.document)
    }

    fn require_kind(&self, kind: DrawContextKind, what: &str) -> CapyResult<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(CapyError::invalid(format!(
                "{what} is only possible in page contexts."
            )))
        }
    }

    /// `q`
    pub fn save_state(&mut self) {
        self.state_depth += 1;
        self.emit(|c| {
            c.save_state();
        });
    }

    /// `Q`
    pub fn restore_state(&mut self) -> CapyResult<()> {
        if self.state_depth == 0 {
            return Err(CapyError::unbalanced("Q without matching q."));
        }

        self.state_depth -= 1;
        self.emit(|c| {
            c.restore_state();
        });
        Ok(())
    }

    /// Save the graphics state and restore it when the guard is dropped.
    pub fn push_state(&mut self) -> StateGuard<'_> {
        self.save_state();
        let depth = self.state_depth;
        StateGuard { ctx: self, depth }
    }

    /// `cm`
    pub fn transform(&mut self, transform: Transform) -> CapyResult<()> {
        let matrix = transform.to_pdf_transform();
        check_finite(&matrix, "transformation matrix")?;
        self.emit(|c| {
            c.transform(matrix);
        });
        Ok(())
    }

    /// `w`
    pub fn set_line_width(&mut self, width: f32) -> CapyResult<()> {
        check_line_width(width)?;
        self.emit(|c| {
            c.set_line_width(width);
        });
        Ok(())
    }

    /// `J`
    pub fn set_line_cap(&mut self, cap: LineCap) {
        self.emit(|c| {
            c.set_line_cap(cap.to_pdf());
        });
    }

    /// `j`
    pub fn set_line_join(&mut self, join: LineJoin) {
        self.emit(|c| {
            c.set_line_join(join.to_pdf());
        });
    }

    /// `M`
    pub fn set_miter_limit(&mut self, limit: f32) -> CapyResult<()> {
        check_miter_limit(limit)?;
        self.emit(|c| {
            c.set_miter_limit(limit);
        });
        Ok(())
    }

    /// `d`
    pub fn set_dash_pattern(&mut self, array: &[f32], phase: f32) -> CapyResult<()> {
        check_dash_pattern(array, phase)?;
        self.emit(|c| {
            c.set_dash_pattern(array.iter().copied(), phase);
        });
        Ok(())
    }

    /// `i`
    pub fn set_flatness(&mut self, flatness: f32) -> CapyResult<()> {
        check_finite(&[flatness], "flatness")?;

        if !(0.0..=100.0).contains(&flatness) {
            return Err(CapyError::invalid("Flatness must be in the range [0, 100]."));
        }

        self.emit(|c| {
            c.op("i").operand(flatness);
        });
        Ok(())
    }

    /// `ri`
    pub fn set_rendering_intent(&mut self, intent: RenderingIntent) {
        self.emit(|c| {
            c.op("ri").operand(intent.to_pdf_name());
        });
    }

    /// `gs`
    pub fn set_graphics_state(&mut self, state: GraphicsStateId) -> CapyResult<()> {
        self.check(state)?;
        let name = self.resources.register_resource::<resource::ExtGState>(state);
        self.emit(|c| {
            c.set_parameters(name.to_pdf_name());
        });
        Ok(())
    }

    /// `m`
    pub fn move_to(&mut self, x: f32, y: f32) -> CapyResult<()> {
        check_finite(&[x, y], "path coordinate")?;
        self.emit(|c| {
            c.move_to(x, y);
        });
        Ok(())
    }

    /// `l`
    pub fn line_to(&mut self, x: f32, y: f32) -> CapyResult<()> {
        check_finite(&[x, y], "path coordinate")?;
        self.emit(|c| {
            c.line_to(x, y);
        });
        Ok(())
    }

    /// `c`
    pub fn cubic_to(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        x3: f32,
        y3: f32,
    ) -> CapyResult<()> {
        check_finite(&[x1, y1, x2, y2, x3, y3], "path coordinate")?;
        self.emit(|c| {
            c.cubic_to(x1, y1, x2, y2, x3, y3);
        });
        Ok(())
    }

    /// `v`, using the current point as the first control point.
    pub fn cubic_to_initial(&mut self, x2: f32, y2: f32, x3: f32, y3: f32) -> CapyResult<()> {
        check_finite(&[x2, y2, x3, y3], "path coordinate")?;
        self.emit(|c| {
            c.cubic_to_initial(x2, y2, x3, y3);
        });
        Ok(())
    }

    /// `y`, using the end point as the second control point.
    pub fn cubic_to_final(&mut self, x1: f32, y1: f32, x3: f32, y3: f32) -> CapyResult<()> {
        check_finite(&[x1, y1, x3, y3], "path coordinate")?;
        self.emit(|c| {
            c.cubic_to_final(x1, y1, x3, y3);
        });
        Ok(())
    }

    /// `h`
    pub fn close_path(&mut self) {
        self.emit(|c| {
            c.close_path();
        });
    }

    /// `re`
    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> CapyResult<()> {
        check_finite(&[x, y, width, height], "rectangle coordinate")?;
        self.emit(|c| {
            c.rect(x, y, width, height);
        });
        Ok(())
    }

    /// `S`
    pub fn stroke(&mut self) {
        self.emit(|c| {
            c.stroke();
        });
    }

    /// `s`
    pub fn close_and_stroke(&mut self) {
        self.emit(|c| {
            c.close_and_stroke();
        });
    }

    /// `f`
    pub fn fill(&mut self) {
        self.emit(|c| {
            c.fill_nonzero();
        });
    }

    /// `f*`
    pub fn fill_even_odd(&mut self) {
        self.emit(|c| {
            c.fill_even_odd();
        });
    }

    /// `B`
    pub fn fill_and_stroke(&mut self) {
        self.emit(|c| {
            c.fill_nonzero_and_stroke();
        });
    }

    /// `B*`
    pub fn fill_even_odd_and_stroke(&mut self) {
        self.emit(|c| {
            c.fill_even_odd_and_stroke();
        });
    }

    /// `b`
    pub fn close_fill_and_stroke(&mut self) {
        self.emit(|c| {
            c.close_fill_nonzero_and_stroke();
        });
    }

    /// `b*`
    pub fn close_fill_even_odd_and_stroke(&mut self) {
        self.emit(|c| {
            c.close_fill_even_odd_and_stroke();
        });
    }

    /// `n`
    pub fn end_path(&mut self) {
        self.emit(|c| {
            c.end_path();
        });
    }

    /// `W`
    pub fn clip(&mut self) {
        self.emit(|c| {
            c.clip_nonzero();
        });
    }

    /// `W*`
    pub fn clip_even_odd(&mut self) {
        self.emit(|c| {
            c.clip_even_odd();
        });
    }

    /// Set the color for stroking operations.
    pub fn set_stroke_color(&mut self, color: &Color) -> CapyResult<()> {
        color.validate(self.document)?;
        let output = self.shared.borrow().output_color_space;
        let mut content = Content::new();
        write_color(&mut content, &mut self.resources, color, output, true);
        self.append(content);
        Ok(())
    }

    /// Set the color for all other painting operations.
    pub fn set_fill_color(&mut self, color: &Color) -> CapyResult<()> {
        color.validate(self.document)?;
        let output = self.shared.borrow().output_color_space;
        let mut content = Content::new();
        write_color(&mut content, &mut self.resources, color, output, false);
        self.append(content);
        Ok(())
    }

    fn invoke_xobject(&mut self, key: XObjectKey) {
        let name = self.resources.register_resource::<resource::XObject>(key);
        self.emit(|c| {
            c.x_object(name.to_pdf_name());
        });
    }

    /// Draw an image into the unit square of the current coordinate system.
    pub fn draw_image(&mut self, image: ImageId) -> CapyResult<()> {
        self.check(image)?;
        self.invoke_xobject(XObjectKey::Image(image));
        Ok(())
    }

    /// `Do` with a form XObject.
    pub fn draw_form_xobject(&mut self, form: FormXObjectId) -> CapyResult<()> {
        self.check(form)?;
        self.invoke_xobject(XObjectKey::Form(form));
        Ok(())
    }

    /// `Do` with a transparency group.
    pub fn draw_transparency_group(&mut self, group: TransparencyGroupId) -> CapyResult<()> {
        self.check(group)?;
        self.invoke_xobject(XObjectKey::Group(group));
        Ok(())
    }

    /// `Do` with any kind of XObject.
    pub fn draw_xobject(&mut self, handle: impl Into<AnyHandle>) -> CapyResult<()> {
        match handle.into() {
            AnyHandle::Image(image) => self.draw_image(image),
            AnyHandle::FormXObject(form) => self.draw_form_xobject(form),
            AnyHandle::TransparencyGroup(group) => self.draw_transparency_group(group),
            other => Err(CapyError::TypeMismatch {
                expected: "an image, form XObject or transparency group",
                found: other.kind(),
            }),
        }
    }

    /// `sh`
    pub fn paint_shading(&mut self, shading: ShadingId) -> CapyResult<()> {
        self.check(shading)?;
        let name = self.resources.register_resource::<resource::Shading>(shading);
        self.emit(|c| {
            c.shading(name.to_pdf_name());
        });
        Ok(())
    }

    /// `BMC` with a plain tag.
    pub fn begin_marked_content(&mut self, tag: &str) -> CapyResult<()> {
        crate::util::check_pdf_name(tag, "Marked content tag")?;
        self.marked.push(MarkedContent::Tag);
        self.emit(|c| {
            c.begin_marked_content(Name(tag.as_bytes()));
        });
        Ok(())
    }

    /// Check that the item can start a marked content sequence and return its tag.
    fn prepare_structure(
        &self,
        item: StructureItemId,
        pending: &[StructureItemId],
    ) -> CapyResult<String> {
        self.require_kind(DrawContextKind::Page, "Structure marked content")?;
        self.check(item)?;

        if self.structure_uses.contains(&item) || pending.contains(&item) {
            return Err(CapyError::StructureReuse(item.index()));
        }

        let shared = self.shared.borrow();
        shared.structure.check_item(item)?;
        shared.structure.tag_name(item)
    }

    /// `BDC` with the tag and the next MCID of a structure item.
    pub fn begin_marked_structure(&mut self, item: StructureItemId) -> CapyResult<()> {
        let tag = self.prepare_structure(item, &[])?;
        let mcid = self.structure_uses.len() as i32;

        self.structure_uses.push(item);
        self.marked.push(MarkedContent::Structure);
        self.emit(|c| {
            c.begin_marked_content_with_properties(Name(tag.as_bytes()))
                .properties()
                .pairs([(Name(b"MCID"), mcid)]);
        });
        Ok(())
    }

    /// `/OC /ocN BDC`
    pub fn begin_marked_optional_content(
        &mut self,
        group: OptionalContentGroupId,
    ) -> CapyResult<()> {
        self.check(group)?;
        let name = self.resources.register_resource::<resource::Properties>(group);

        self.marked.push(MarkedContent::OptionalContent);
        self.emit(|c| {
            c.op("BDC")
                .operand(Name(b"OC"))
                .operand(name.to_pdf_name());
        });
        Ok(())
    }

    /// `EMC`
    pub fn end_marked_content(&mut self) -> CapyResult<()> {
        if self.marked.pop().is_none() {
            return Err(CapyError::unbalanced("EMC without matching BMC or BDC."));
        }

        self.emit(|c| {
            c.end_marked_content();
        });
        Ok(())
    }

    /// A plain marked content sequence that ends when the guard is dropped.
    pub fn marked_content(&mut self, tag: &str) -> CapyResult<MarkedContentGuard<'_>> {
        self.begin_marked_content(tag)?;
        let depth = self.marked.len();
        Ok(MarkedContentGuard { ctx: self, depth })
    }

    /// A structure marked content sequence that ends when the guard is dropped.
    pub fn marked_structure(
        &mut self,
        item: StructureItemId,
    ) -> CapyResult<MarkedContentGuard<'_>> {
        self.begin_marked_structure(item)?;
        let depth = self.marked.len();
        Ok(MarkedContentGuard { ctx: self, depth })
    }

    /// An optional content sequence that ends when the guard is dropped.
    pub fn marked_optional_content(
        &mut self,
        group: OptionalContentGroupId,
    ) -> CapyResult<MarkedContentGuard<'_>> {
        self.begin_marked_optional_content(group)?;
        let depth = self.marked.len();
        Ok(MarkedContentGuard { ctx: self, depth })
    }

    /// Attach an annotation to the page.
    pub fn annotate(&mut self, annotation: AnnotationId) -> CapyResult<()> {
        self.require_kind(DrawContextKind::Page, "Annotating")?;
        self.check(annotation)?;

        if !self.annotations.contains(&annotation) {
            self.annotations.push(annotation);
        }

        Ok(())
    }

    /// Override the document's default page properties for this page.
    pub fn set_page_properties(&mut self, properties: PageProperties) -> CapyResult<()> {
        self.require_kind(DrawContextKind::Page, "Setting page properties")?;
        properties.validate(self.document)?;
        self.page_properties = Some(properties);
        Ok(())
    }

    /// Set the transparency group of the page.
    pub fn set_page_transparency_group(
        &mut self,
        group: TransparencyGroupProperties,
    ) -> CapyResult<()> {
        self.require_kind(DrawContextKind::Page, "Setting a page group")?;
        group.validate(self.document)?;
        self.page_properties
            .get_or_insert_with(PageProperties::default)
            .transparency_group = Some(group);
        Ok(())
    }

    /// Set the transition a presentation viewer shows when moving to the page.
    pub fn set_transition(&mut self, transition: Transition) -> CapyResult<()> {
        self.require_kind(DrawContextKind::Page, "Setting a transition")?;
        transition.validate()?;
        self.transition = Some(transition);
        Ok(())
    }

    /// Append a text object, wrapped in `BT` and `ET`.
    pub fn render_text_obj(&mut self, text: &Text) -> CapyResult<()> {
        if text.marked_depth() != 0 {
            return Err(CapyError::unbalanced(
                "Text object has unclosed marked content.",
            ));
        }

        // Check everything before writing anything or adding glyphs to a font.
        let mut tags = vec![];
        let mut pending = vec![];
        let mut current_font: Option<FontId> = None;
        {
            let shared = self.shared.borrow();

            for op in &text.ops {
                match op {
                    TextOp::Font(font, _) => {
                        self.check(*font)?;
                        current_font = Some(*font);
                    }
                    TextOp::Show(string) => text_font(&shared, current_font)?.check_text(string)?,
                    TextOp::ShowSequence(sequence) => {
                        text_font(&shared, current_font)?.check_sequence(sequence)?
                    }
                    TextOp::StrokeColor(color) | TextOp::FillColor(color) => {
                        color.validate(self.document)?
                    }
                    TextOp::GraphicsState(state) => self.check(*state)?,
                    TextOp::BeginStructure(item) => {
                        tags.push(self.prepare_structure(*item, &pending)?);
                        pending.push(*item);
                    }
                    _ => {}
                }
            }
        }

        let output = self.shared.borrow().output_color_space;
        let mut content = Content::new();
        let mut tags = tags.into_iter();
        let mut mcid = self.structure_uses.len() as i32;
        current_font = None;

        content.begin_text();

        for op in &text.ops {
            match op {
                TextOp::Font(font, size) => {
                    let name = self.resources.register_resource::<resource::Font>(*font);
                    content.set_font(name.to_pdf_name(), *size);
                    current_font = Some(*font);
                }
                TextOp::Leading(v) => {
                    content.set_leading(*v);
                }
                TextOp::CharSpacing(v) => {
                    content.set_char_spacing(*v);
                }
                TextOp::WordSpacing(v) => {
                    content.set_word_spacing(*v);
                }
                TextOp::HorizontalScaling(v) => {
                    content.set_horizontal_scaling(*v);
                }
                TextOp::RenderingMode(mode) => {
                    content.set_text_rendering_mode(mode.to_pdf());
                }
                TextOp::Rise(v) => {
                    content.set_rise(*v);
                }
                TextOp::NextLine(x, y) => {
                    content.next_line(*x, *y);
                }
                TextOp::NextLineSetLeading(x, y) => {
                    content.next_line_and_set_leading(*x, *y);
                }
                TextOp::NextLineUsingLeading => {
                    content.next_line_using_leading();
                }
                TextOp::Matrix(matrix) => {
                    content.set_text_matrix(matrix.to_pdf_transform());
                }
                TextOp::Show(string) => {
                    let font = current_font
                        .ok_or_else(|| CapyError::invalid("No font set for text."))?;
                    let encoded = self.shared.borrow_mut().fonts.get_mut(font)?.encode_text(string)?;
                    content.show(Str(&encoded));
                }
                TextOp::ShowSequence(sequence) => {
                    let font = current_font
                        .ok_or_else(|| CapyError::invalid("No font set for text."))?;
                    self.write_sequence(&mut content, font, sequence)?;
                }
                TextOp::StrokeColor(color) => {
                    write_color(&mut content, &mut self.resources, color, output, true)
                }
                TextOp::FillColor(color) => {
                    write_color(&mut content, &mut self.resources, color, output, false)
                }
                TextOp::LineWidth(w) => {
                    content.set_line_width(*w);
                }
                TextOp::MiterLimit(m) => {
                    content.set_miter_limit(*m);
                }
                TextOp::LineJoin(join) => {
                    content.set_line_join(join.to_pdf());
                }
                TextOp::LineCap(cap) => {
                    content.set_line_cap(cap.to_pdf());
                }
                TextOp::DashPattern(array, phase) => {
                    content.set_dash_pattern(array.iter().copied(), *phase);
                }
                TextOp::GraphicsState(state) => {
                    let name = self.resources.register_resource::<resource::ExtGState>(*state);
                    content.set_parameters(name.to_pdf_name());
                }
                TextOp::BeginStructure(_) => {
                    let tag = tags.next().unwrap_or_default();
                    content
                        .begin_marked_content_with_properties(Name(tag.as_bytes()))
                        .properties()
                        .pairs([(Name(b"MCID"), mcid)]);
                    mcid += 1;
                }
                TextOp::EndMarkedContent => {
                    content.end_marked_content();
                }
            }
        }

        content.end_text();

        self.append(content);
        self.structure_uses.extend(pending);

        Ok(())
    }

    /// Write a text sequence as `TJ` operators, split at actual text spans.
    fn write_sequence(
        &mut self,
        content: &mut Content,
        font: FontId,
        sequence: &TextSequence,
    ) -> CapyResult<()> {
        enum Piece {
            Glyphs(Vec<u8>),
            Adjust(f32),
        }

        fn flush(content: &mut Content, pieces: &mut Vec<Piece>) {
            if pieces.is_empty() {
                return;
            }

            let mut positioned = content.show_positioned();
            let mut items = positioned.items();
            for piece in pieces.drain(..) {
                match piece {
                    Piece::Glyphs(bytes) => {
                        items.show(Str(&bytes));
                    }
                    Piece::Adjust(amount) => {
                        items.adjust(amount);
                    }
                }
            }
        }

        let mut shared = self.shared.borrow_mut();
        let font = shared.fonts.get_mut(font)?;
        let mut pieces: Vec<Piece> = vec![];

        let push_glyphs = |pieces: &mut Vec<Piece>, encoded: Vec<u8>| match pieces.last_mut() {
            Some(Piece::Glyphs(bytes)) => bytes.extend(encoded),
            _ => pieces.push(Piece::Glyphs(encoded)),
        };

        for item in &sequence.items {
            match item {
                SequenceItem::Kerning(amount) => pieces.push(Piece::Adjust(*amount)),
                SequenceItem::Char(c) => push_glyphs(&mut pieces, font.encode_char(*c)?),
                SequenceItem::Glyph {
                    glyph_id,
                    codepoint,
                } => {
                    let mut buf = [0; 4];
                    let encoded = font.encode_glyph(*glyph_id, codepoint.encode_utf8(&mut buf))?;
                    push_glyphs(&mut pieces, encoded);
                }
                SequenceItem::GlyphText { glyph_id, text } => {
                    push_glyphs(&mut pieces, font.encode_glyph(*glyph_id, text)?)
                }
                SequenceItem::ActualTextStart(actual_text) => {
                    flush(content, &mut pieces);
                    content
                        .begin_marked_content_with_properties(Name(b"Span"))
                        .properties()
                        .actual_text(TextStr(actual_text));
                }
                SequenceItem::ActualTextEnd => {
                    flush(content, &mut pieces);
                    content.end_marked_content();
                }
            }
        }

        flush(content, &mut pieces);

        Ok(())
    }

    /// Check that all scopes are closed and turn the context into its parts.
    pub(crate) fn finish(self, document: DocumentId) -> CapyResult<FinishedContext> {
        if self.document != document {
            return Err(CapyError::invalid(
                "Draw context belongs to a different document.",
            ));
        }

        if self.state_depth != 0 {
            return Err(CapyError::unbalanced(format!(
                "Draw context has {} unrestored graphics states.",
                self.state_depth
            )));
        }

        if !self.marked.is_empty() {
            return Err(CapyError::unbalanced(format!(
                "Draw context has {} unclosed marked content sequences.",
                self.marked.len()
            )));
        }

        Ok(FinishedContext {
            stream: Stream::new(self.content, self.bbox, self.resources.finish()),
            structure_uses: self.structure_uses,
            annotations: self.annotations,
            page_properties: self.page_properties,
            transition: self.transition,
        })
    }

    #[cfg(test)]
    pub(crate) fn content(&self) -> &[u8] {
        &self.content
    }
}

impl std::fmt::Debug for DrawContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawContext")
            .field("kind", &self.kind)
            .field("bbox", &self.bbox)
            .field("state_depth", &self.state_depth)
            .field("marked_content_depth", &self.marked.len())
            .finish_non_exhaustive()
    }
}

fn text_font(shared: &Shared, font: Option<FontId>) -> CapyResult<&FontRecord> {
    let font = font.ok_or_else(|| CapyError::invalid("No font set for text."))?;
    shared.fonts.get(font)
}

fn write_color(
    content: &mut Content,
    resources: &mut ResourceDictionaryBuilder,
    color: &Color,
    output: DeviceColorSpace,
    stroke: bool,
) {
    let color = &color.to_output(output);
    match color {
        Color::Gray(g) => {
            if stroke {
                content.set_stroke_gray(*g);
            } else {
                content.set_fill_gray(*g);
            }
        }
        Color::Rgb(r, g, b) => {
            if stroke {
                content.set_stroke_rgb(*r, *g, *b);
            } else {
                content.set_fill_rgb(*r, *g, *b);
            }
        }
        Color::Cmyk(c, m, y, k) => {
            if stroke {
                content.set_stroke_cmyk(*c, *m, *y, *k);
            } else {
                content.set_fill_cmyk(*c, *m, *y, *k);
            }
        }
        Color::Pattern(pattern) => {
            let name = resources.register_resource::<resource::Pattern>(*pattern);
            if stroke {
                content.set_stroke_color_space(ColorSpaceOperand::Pattern);
                content.set_stroke_pattern(None, name.to_pdf_name());
            } else {
                content.set_fill_color_space(ColorSpaceOperand::Pattern);
                content.set_fill_pattern(None, name.to_pdf_name());
            }
        }
        Color::Icc(_) | Color::Lab(..) | Color::Separation(..) => {
            let color_space = color.color_space();
            debug_assert!(!matches!(
                color_space,
                ColorSpace::Device(_) | ColorSpace::Pattern
            ));
            let name = resources.register_resource::<resource::ColorSpaceResource>(color_space);
            let components = color.components();

            if stroke {
                content.set_stroke_color_space(ColorSpaceOperand::Named(name.to_pdf_name()));
                content.op("SCN").operands(components);
            } else {
                content.set_fill_color_space(ColorSpaceOperand::Named(name.to_pdf_name()));
                content.op("scn").operands(components);
            }
        }
    }
}

/// Restores the graphics state when dropped.
///
/// States that were saved inside the guard and are still open are restored too.
pub struct StateGuard<'a> {
    ctx: &'a mut DrawContext,
    /// The stack depth including the state saved by the guard.
    depth: u32,
}

impl Deref for StateGuard<'_> {
    type Target = DrawContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if self.ctx.state_depth < self.depth {
            log::warn!("graphics state was already restored");
            return;
        }

        while self.ctx.state_depth >= self.depth {
            if self.ctx.restore_state().is_err() {
                break;
            }
        }
    }
}

/// Ends a marked content sequence when dropped.
///
/// Sequences that were opened inside the guard and are still open are ended too.
pub struct MarkedContentGuard<'a> {
    ctx: &'a mut DrawContext,
    /// The stack depth including the sequence opened by the guard.
    depth: usize,
}

impl Deref for MarkedContentGuard<'_> {
    type Target = DrawContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for MarkedContentGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for MarkedContentGuard<'_> {
    fn drop(&mut self) {
        if self.ctx.marked.len() < self.depth {
            log::warn!("marked content was already closed");
            return;
        }

        while self.ctx.marked.len() >= self.depth {
            if self.ctx.end_marked_content().is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Shared;
    use crate::handle::PatternId;
    use crate::text::BuiltinFont;

    fn context(kind: DrawContextKind) -> (DocumentId, DrawContext) {
        context_with_output(kind, DeviceColorSpace::Rgb)
    }

    fn context_with_output(
        kind: DrawContextKind,
        output: DeviceColorSpace,
    ) -> (DocumentId, DrawContext) {
        let doc = DocumentId::fresh();
        let shared = Rc::new(RefCell::new(Shared::new(doc, output)));
        let bbox = Rect::from_xywh(0.0, 0.0, 100.0, 100.0).unwrap();
        (doc, DrawContext::new(doc, kind, bbox, shared))
    }

    fn system_font() -> Option<Vec<u8>> {
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/Library/Fonts/Arial.ttf",
        ]
        .iter()
        .find_map(|path| std::fs::read(path).ok())
    }

    fn text_with_missing_glyph(font: FontId) -> Text {
        let mut sequence = TextSequence::new();
        sequence.append_unicode('H');
        sequence.append_glyph(60000, 'x');

        let mut text_obj = Text::new();
        text_obj.set_font(font, 12.0).unwrap();
        text_obj.render_text("Hi").unwrap();
        text_obj.render_sequence(sequence).unwrap();
        text_obj
    }

    fn text(ctx: &DrawContext) -> String {
        String::from_utf8_lossy(ctx.content()).into_owned()
    }

    #[test]
    fn negative_line_width_is_rejected_without_output() {
        let (_, mut ctx) = context(DrawContextKind::Page);
        ctx.set_line_width(2.0).unwrap();
        let before = ctx.content().to_vec();

        assert_eq!(
            ctx.set_line_width(-0.1).unwrap_err().to_string(),
            "Negative line width."
        );
        assert_eq!(ctx.content(), before.as_slice());
    }

    #[test]
    fn restore_without_save_fails() {
        let (_, mut ctx) = context(DrawContextKind::Page);
        assert!(matches!(
            ctx.restore_state(),
            Err(CapyError::UnbalancedState(_))
        ));

        ctx.save_state();
        assert!(ctx.restore_state().is_ok());
        assert_eq!(ctx.state_depth(), 0);
    }

    #[test]
    fn guards_close_their_scope() {
        let (doc, mut ctx) = context(DrawContextKind::Page);

        {
            let mut state = ctx.push_state();
            state.rect(10.0, 10.0, 20.0, 20.0).unwrap();
            let mut marked = state.marked_content("Artifact").unwrap();
            marked.fill();
            assert_eq!(marked.marked_content_depth(), 1);
        }

        assert_eq!(ctx.state_depth(), 0);
        assert_eq!(ctx.marked_content_depth(), 0);
        assert_eq!(
            text(&ctx),
            "q\n10 10 20 20 re\n/Artifact BMC\nf\nEMC\nQ\n"
        );
        assert!(ctx.finish(doc).is_ok());
    }

    #[test]
    fn guards_leave_outer_scopes_alone() {
        let (doc, mut ctx) = context(DrawContextKind::Page);
        ctx.save_state();
        {
            let mut state = ctx.push_state();
            state.restore_state().unwrap();
        }
        assert_eq!(ctx.state_depth(), 1);
        ctx.restore_state().unwrap();

        ctx.begin_marked_content("Outer").unwrap();
        {
            let mut marked = ctx.marked_content("Inner").unwrap();
            marked.end_marked_content().unwrap();
        }
        assert_eq!(ctx.marked_content_depth(), 1);
        ctx.end_marked_content().unwrap();

        assert_eq!(
            text(&ctx),
            "q\nq\nQ\nQ\n/Outer BMC\n/Inner BMC\nEMC\nEMC\n"
        );
        assert!(ctx.finish(doc).is_ok());
    }

    #[test]
    fn guards_close_what_was_opened_inside() {
        let (_, mut ctx) = context(DrawContextKind::Page);
        {
            let mut state = ctx.push_state();
            state.save_state();
        }
        assert_eq!(ctx.state_depth(), 0);

        {
            let mut marked = ctx.marked_content("Outer").unwrap();
            marked.begin_marked_content("Inner").unwrap();
        }
        assert_eq!(ctx.marked_content_depth(), 0);
        assert_eq!(
            text(&ctx),
            "q\nq\nQ\nQ\n/Outer BMC\n/Inner BMC\nEMC\nEMC\n"
        );
    }

    #[test]
    fn unbalanced_contexts_cant_be_finished() {
        let (doc, mut ctx) = context(DrawContextKind::FormXObject);
        ctx.save_state();
        assert!(matches!(
            ctx.finish(doc),
            Err(CapyError::UnbalancedState(_))
        ));

        let (doc, mut ctx) = context(DrawContextKind::FormXObject);
        ctx.begin_marked_content("Tag").unwrap();
        assert!(matches!(
            ctx.finish(doc),
            Err(CapyError::UnbalancedState(_))
        ));
    }

    #[test]
    fn dash_patterns_are_validated() {
        let (_, mut ctx) = context(DrawContextKind::Page);
        assert!(ctx.set_dash_pattern(&[3.0, 1.0], 0.0).is_ok());
        assert!(ctx.set_dash_pattern(&[], 0.0).is_ok());
        assert!(ctx.set_dash_pattern(&[0.0, 0.0], 0.0).is_err());
        assert!(ctx.set_dash_pattern(&[-1.0, 2.0], 0.0).is_err());
        assert!(ctx.set_flatness(101.0).is_err());
        assert!(ctx.move_to(f32::NAN, 0.0).is_err());
    }

    #[test]
    fn colors_select_their_operator() {
        let (doc, mut ctx) = context(DrawContextKind::Page);
        ctx.set_fill_color(&Color::Rgb(1.0, 0.0, 0.0)).unwrap();
        ctx.set_stroke_color(&Color::Gray(0.5)).unwrap();
        ctx.set_fill_color(&Color::Pattern(PatternId::new(doc, 0)))
            .unwrap();

        assert_eq!(
            text(&ctx),
            "1 0 0 rg\n0.5 G\n/Pattern cs\n/p0 scn\n"
        );

        assert!(ctx.set_fill_color(&Color::Cmyk(0.0, 0.0, 2.0, 0.0)).is_err());
        assert!(matches!(
            ctx.set_fill_color(&Color::Pattern(PatternId::new(DocumentId::fresh(), 0))),
            Err(CapyError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn non_xobjects_are_not_drawn() {
        let (doc, mut ctx) = context(DrawContextKind::Page);
        assert_eq!(
            ctx.draw_xobject(PatternId::new(doc, 0)),
            Err(CapyError::TypeMismatch {
                expected: "an image, form XObject or transparency group",
                found: "pattern"
            })
        );
        assert!(ctx.draw_xobject(ImageId::new(doc, 0)).is_ok());
        assert_eq!(text(&ctx), "/x0 Do\n");
    }

    #[test]
    fn structure_is_only_used_once() {
        let (doc, mut ctx) = context(DrawContextKind::Page);
        let item = ctx
            .shared
            .borrow_mut()
            .structure
            .add_item(
                crate::structure::StructureType::P.into(),
                None,
                Default::default(),
            )
            .unwrap();

        ctx.begin_marked_structure(item).unwrap();
        ctx.end_marked_content().unwrap();
        assert_eq!(
            ctx.begin_marked_structure(item),
            Err(CapyError::StructureReuse(0))
        );
        let written = text(&ctx);
        assert!(written.starts_with("/P <<"));
        assert!(written.contains("/MCID 0"));
        assert!(written.ends_with("BDC\nEMC\n"));

        let finished = ctx.finish(doc).unwrap();
        assert_eq!(finished.structure_uses, vec![item]);
    }

    #[test]
    fn structure_needs_a_page() {
        let (_, mut ctx) = context(DrawContextKind::FormXObject);
        let item = ctx
            .shared
            .borrow_mut()
            .structure
            .add_item(
                crate::structure::StructureType::P.into(),
                None,
                Default::default(),
            )
            .unwrap();

        assert!(matches!(
            ctx.begin_marked_structure(item),
            Err(CapyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn text_objects_must_be_balanced() {
        let (doc, mut ctx) = context(DrawContextKind::Page);
        let mut text_obj = Text::new();
        text_obj.begin_marked_structure(StructureItemId::new(doc, 0));

        assert!(matches!(
            ctx.render_text_obj(&text_obj),
            Err(CapyError::UnbalancedState(_))
        ));
        assert!(ctx.content().is_empty());
    }

    #[test]
    fn text_without_glyphs() {
        let (_, mut ctx) = context(DrawContextKind::Page);
        let mut text_obj = Text::new();
        text_obj.set_leading(14.0).unwrap();
        text_obj.next_line(10.0, 20.0).unwrap();
        text_obj.set_fill_color(Color::Gray(0.0)).unwrap();

        ctx.render_text_obj(&text_obj).unwrap();
        assert_eq!(text(&ctx), "BT\n14 TL\n10 20 Td\n0 g\nET\n");
    }

    #[test]
    fn failed_text_leaves_the_context_alone() {
        let (doc, mut ctx) = context(DrawContextKind::Page);
        let font = ctx
            .shared
            .borrow_mut()
            .fonts
            .push(FontRecord::Builtin(BuiltinFont::Helvetica));

        assert!(matches!(
            ctx.render_text_obj(&text_with_missing_glyph(font)),
            Err(CapyError::Font(_))
        ));
        assert!(ctx.content().is_empty());

        let finished = ctx.finish(doc).unwrap();
        assert!(finished.stream.resource_dictionary.fonts.is_empty());
    }

    #[test]
    fn failed_text_adds_no_glyphs() {
        let Some(data) = system_font() else {
            // No font available on this machine.
            return;
        };

        let (doc, mut ctx) = context(DrawContextKind::Page);
        let font = ctx
            .shared
            .borrow_mut()
            .fonts
            .push(FontRecord::load(data, 0).unwrap());

        assert!(matches!(
            ctx.render_text_obj(&text_with_missing_glyph(font)),
            Err(CapyError::Font(_))
        ));
        assert!(ctx.content().is_empty());
        assert_eq!(ctx.shared.borrow().fonts.get(font).unwrap().subset_len(), 1);

        let mut text_obj = Text::new();
        text_obj.set_font(font, 12.0).unwrap();
        text_obj.render_text("Hi").unwrap();
        ctx.render_text_obj(&text_obj).unwrap();
        assert_eq!(ctx.shared.borrow().fonts.get(font).unwrap().subset_len(), 3);
        assert_eq!(
            ctx.finish(doc).unwrap().stream.resource_dictionary.fonts.get_entries().count(),
            1
        );
    }

    #[test]
    fn builtin_fonts_show_their_bytes() {
        let (_, mut ctx) = context(DrawContextKind::Page);
        let font = ctx
            .shared
            .borrow_mut()
            .fonts
            .push(FontRecord::Builtin(BuiltinFont::Courier));

        let mut text_obj = Text::new();
        text_obj.set_font(font, 10.0).unwrap();
        text_obj.render_text("Hi").unwrap();
        ctx.render_text_obj(&text_obj).unwrap();

        assert_eq!(text(&ctx), "BT\n/f0 10 Tf\n(Hi) Tj\nET\n");
    }

    #[test]
    fn device_colors_are_converted_to_the_output() {
        let (_, mut ctx) = context_with_output(DrawContextKind::Page, DeviceColorSpace::Cmyk);
        ctx.set_fill_color(&Color::Rgb(1.0, 0.0, 0.0)).unwrap();
        ctx.set_stroke_color(&Color::Gray(0.5)).unwrap();

        let mut text_obj = Text::new();
        text_obj.set_stroke_color(Color::Rgb(0.0, 0.0, 0.0)).unwrap();
        ctx.render_text_obj(&text_obj).unwrap();

        let (_, mut gray) = context_with_output(DrawContextKind::Page, DeviceColorSpace::Gray);
        gray.set_fill_color(&Color::Cmyk(0.0, 0.0, 0.0, 1.0)).unwrap();

        assert_eq!(
            text(&ctx),
            "0 1 1 0 k\n0.5 G\nBT\n0 0 0 1 K\nET\n"
        );
        assert_eq!(text(&gray), "0 g\n");
    }

    #[test]
    fn transitions_belong_to_pages() {
        let (_, mut form) = context(DrawContextKind::FormXObject);
        assert!(matches!(
            form.set_transition(Transition::default()),
            Err(CapyError::InvalidArgument(_))
        ));

        let (doc, mut page) = context(DrawContextKind::Page);
        let fade = Transition {
            style: Some(crate::page::TransitionStyle::Fade),
            duration: Some(1.5),
            ..Transition::default()
        };
        page.set_transition(fade.clone()).unwrap();
        assert_eq!(page.finish(doc).unwrap().transition, Some(fade));
    }

    #[test]
    fn optional_content_is_a_property() {
        let (doc, mut ctx) = context(DrawContextKind::Page);
        let group = OptionalContentGroupId::new(doc, 0);
        {
            let mut marked = ctx.marked_optional_content(group).unwrap();
            marked.set_fill_color(&Color::Gray(1.0)).unwrap();
        }

        assert_eq!(text(&ctx), "/OC /oc0 BDC\n1 g\nEMC\n");
    }

    #[test]
    fn device_color_spaces_are_not_resources() {
        assert!(matches!(
            ColorSpace::from(DeviceColorSpace::Rgb),
            ColorSpace::Device(_)
        ));
    }
}
