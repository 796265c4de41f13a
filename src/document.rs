//! The document, the root of everything that ends up in a PDF.
//!
//! A [`Document`] owns all registered objects and the ordered list of pages. Draw
//! contexts are created by the document, filled independently and then handed back
//! to it, e.g. with [`Document::add_page`]. Nothing is written until
//! [`Document::write`] is called, which consumes the document.
//!
//! ```no_run
//! use capypdf::color::Color;
//! use capypdf::configure::DocumentProperties;
//! use capypdf::document::Document;
//!
//! let mut document = Document::new("out.pdf", DocumentProperties::default()).unwrap();
//! let mut page = document.new_page_context();
//! page.set_fill_color(&Color::Rgb(0.8, 0.1, 0.1)).unwrap();
//! page.rect(100.0, 100.0, 200.0, 150.0).unwrap();
//! page.fill();
//! document.add_page(page).unwrap();
//! document.write().unwrap();
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pdf_writer::{Chunk, Finish, Name, TextStr};

use crate::annotation::{Annotation, AnnotationRecord};
use crate::color::{
    Color, ColorSpace, DeviceColorSpace, IccColor, IccProfile, LabColorSpace, Separation,
};
use crate::configure::{DocumentProperties, OutputIntentSubtype, SerializeSettings};
use crate::destination::DestinationTable;
use crate::draw::{DrawContext, DrawContextKind, FinishedContext};
use crate::embed::EmbeddedFile;
use crate::error::{CapyError, CapyResult};
use crate::font::FontRecord;
use crate::function::{Function, FunctionRecord};
use crate::geom::Rect;
use crate::graphics_state::{GraphicsState, OptionalContentGroup, TransparencyGroupProperties};
use crate::handle::{
    AnnotationId, Arena, DocumentId, EmbeddedFileId, FontId, FormXObjectId, FunctionId,
    GraphicsStateId, IccColorSpaceId, ImageId, LabColorSpaceId, OptionalContentGroupId,
    OutlineId, PatternId, RoleId, SeparationId, ShadingId, StructureItemId, TransparencyGroupId,
};
use crate::image::{ColorConverter, ImageProperties, ImageRecord, RasterImage};
use crate::metadata::Metadata;
use crate::outline::{Outline, OutlineTree};
use crate::page::{serialize_page_labels, NumberingStyle, PageLabel, PageRecord};
use crate::pattern::{PatternRecord, ShadingPattern, TilingPattern, TilingPatternProperties};
use crate::serialize::{ObjectCounts, SerializeContext};
use crate::shading::{Shading, ShadingRecord};
use crate::structure::{StructItemExtraData, StructureKind, StructureTree, StructureType};
use crate::text::BuiltinFont;
use crate::util::check_finite;
use crate::xobject::FormXObjectRecord;

/// The parts of a document that draw contexts need while drawing.
///
/// Fonts record the glyphs used by text, and structure items are looked up when
/// marked content is opened, so both are shared between the document and its
/// contexts. Device colors are converted to the output colorspace as they are set.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) fonts: Arena<FontId, FontRecord>,
    pub(crate) structure: StructureTree,
    pub(crate) output_color_space: DeviceColorSpace,
}

impl Shared {
    pub(crate) fn new(document: DocumentId, output_color_space: DeviceColorSpace) -> Self {
        Self {
            fonts: Arena::new(document),
            structure: StructureTree::new(document),
            output_color_space,
        }
    }
}

/// A PDF document.
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    properties: DocumentProperties,
    serialize_settings: SerializeSettings,
    id: DocumentId,
    page_bbox: Rect,
    output_profile: Option<IccProfile>,
    shared: Rc<RefCell<Shared>>,
    builtin_fonts: HashMap<BuiltinFont, FontId>,

    images: Arena<ImageId, ImageRecord>,
    icc_color_spaces: Arena<IccColorSpaceId, IccProfile>,
    lab_color_spaces: Arena<LabColorSpaceId, LabColorSpace>,
    functions: Arena<FunctionId, FunctionRecord>,
    separations: Arena<SeparationId, Separation>,
    shadings: Arena<ShadingId, ShadingRecord>,
    patterns: Arena<PatternId, PatternRecord>,
    graphics_states: Arena<GraphicsStateId, GraphicsState>,
    optional_content_groups: Arena<OptionalContentGroupId, OptionalContentGroup>,
    form_xobjects: Arena<FormXObjectId, FormXObjectRecord>,
    transparency_groups: Arena<TransparencyGroupId, FormXObjectRecord>,
    embedded_files: Arena<EmbeddedFileId, EmbeddedFile>,
    annotations: Arena<AnnotationId, AnnotationRecord>,

    pages: Vec<PageRecord>,
    /// The structure items of each page, in MCID order.
    page_structure: Vec<Vec<StructureItemId>>,
    used_structure: HashSet<StructureItemId>,
    outlines: OutlineTree,
    destinations: DestinationTable,
    page_labels: Vec<PageLabel>,
}

impl Document {
    /// Create a new document that will be written to `path`.
    pub fn new(path: impl AsRef<Path>, properties: DocumentProperties) -> CapyResult<Self> {
        Self::with_serialize_settings(path, properties, SerializeSettings::default())
    }

    /// Create a new document with custom serialize settings.
    pub fn with_serialize_settings(
        path: impl AsRef<Path>,
        properties: DocumentProperties,
        serialize_settings: SerializeSettings,
    ) -> CapyResult<Self> {
        let id = DocumentId::fresh();

        let page_bbox = properties
            .default_page_properties
            .media_box
            .ok_or_else(|| CapyError::invalid("Default page properties need a media box."))?;
        properties.default_page_properties.validate(id)?;

        let output_profile = properties
            .output_intent
            .as_ref()
            .map(|intent| {
                if intent.identifier.is_empty() {
                    return Err(CapyError::invalid(
                        "Output condition identifier must not be empty.",
                    ));
                }

                IccProfile::new(&intent.profile)
            })
            .transpose()?;
        let output_color_space = properties.output_colorspace;

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            properties,
            serialize_settings,
            id,
            page_bbox,
            output_profile,
            shared: Rc::new(RefCell::new(Shared::new(id, output_color_space))),
            builtin_fonts: HashMap::new(),
            images: Arena::new(id),
            icc_color_spaces: Arena::new(id),
            lab_color_spaces: Arena::new(id),
            functions: Arena::new(id),
            separations: Arena::new(id),
            shadings: Arena::new(id),
            patterns: Arena::new(id),
            graphics_states: Arena::new(id),
            optional_content_groups: Arena::new(id),
            form_xobjects: Arena::new(id),
            transparency_groups: Arena::new(id),
            embedded_files: Arena::new(id),
            annotations: Arena::new(id),
            pages: vec![],
            page_structure: vec![],
            used_structure: HashSet::new(),
            outlines: OutlineTree::new(id),
            destinations: DestinationTable::new(),
            page_labels: vec![],
        })
    }

    /// The properties the document was created with.
    pub fn properties(&self) -> &DocumentProperties {
        &self.properties
    }

    /// The number of pages added so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn new_context(&self, kind: DrawContextKind, bbox: Rect) -> DrawContext {
        DrawContext::new(self.id, kind, bbox, self.shared.clone())
    }

    /// Create a context for a new page, sized like the default media box.
    pub fn new_page_context(&self) -> DrawContext {
        self.new_context(DrawContextKind::Page, self.page_bbox)
    }

    /// Create a context for a form XObject of the given size.
    pub fn new_form_xobject(&self, width: f32, height: f32) -> CapyResult<DrawContext> {
        let bbox = Rect::from_xywh(0.0, 0.0, width, height).ok_or_else(|| {
            CapyError::invalid(format!("Invalid form XObject size {width}x{height}."))
        })?;

        Ok(self.new_context(DrawContextKind::FormXObject, bbox))
    }

    /// Create a context for the cell of a colored tiling pattern.
    pub fn new_tiling_context(&self, bbox: Rect) -> DrawContext {
        self.new_context(DrawContextKind::ColorTiling, bbox)
    }

    /// Create a context for a transparency group.
    pub fn new_transparency_group_context(&self, bbox: Rect) -> DrawContext {
        self.new_context(DrawContextKind::TransparencyGroup, bbox)
    }

    fn finish_context(
        &self,
        ctx: DrawContext,
        kind: DrawContextKind,
    ) -> CapyResult<FinishedContext> {
        if ctx.kind() != kind {
            return Err(CapyError::TypeMismatch {
                expected: kind.name(),
                found: ctx.kind().name(),
            });
        }

        ctx.finish(self.id)
    }

    /// Append a page.
    pub fn add_page(&mut self, ctx: DrawContext) -> CapyResult<()> {
        let finished = self.finish_context(ctx, DrawContextKind::Page)?;
        let page_index = self.pages.len();

        if let Some(item) = finished
            .structure_uses
            .iter()
            .find(|item| self.used_structure.contains(item))
        {
            return Err(CapyError::StructureReuse(item.index()));
        }

        for annotation in &finished.annotations {
            if let Some(page) = self.annotations.get(*annotation)?.page {
                return Err(CapyError::invalid(format!(
                    "Annotation {} is already attached to page {page}.",
                    annotation.index()
                )));
            }
        }

        for annotation in &finished.annotations {
            self.annotations.get_mut(*annotation)?.page = Some(page_index);
        }

        let properties = finished
            .page_properties
            .unwrap_or_default()
            .merge_with(&self.properties.default_page_properties);

        let struct_parents = if finished.structure_uses.is_empty() {
            None
        } else {
            Some(i32::try_from(page_index).map_err(|_| {
                CapyError::invalid("Too many pages with structured content.")
            })?)
        };

        let require_trim_box = self
            .properties
            .output_intent
            .as_ref()
            .is_some_and(|intent| intent.subtype == OutputIntentSubtype::PdfX);

        self.used_structure
            .extend(finished.structure_uses.iter().copied());
        self.page_structure.push(finished.structure_uses);
        self.pages.push(PageRecord {
            stream: finished.stream,
            properties,
            annotations: finished.annotations,
            struct_parents,
            require_trim_box,
            transition: finished.transition,
        });

        log::trace!("added page {page_index}");

        Ok(())
    }

    /// Register a form XObject.
    pub fn add_form_xobject(&mut self, ctx: DrawContext) -> CapyResult<FormXObjectId> {
        let finished = self.finish_context(ctx, DrawContextKind::FormXObject)?;
        Ok(self
            .form_xobjects
            .push(FormXObjectRecord::form(finished.stream)))
    }

    /// Register a colored tiling pattern.
    pub fn add_tiling_pattern(
        &mut self,
        ctx: DrawContext,
        properties: TilingPatternProperties,
    ) -> CapyResult<PatternId> {
        properties.validate()?;
        let finished = self.finish_context(ctx, DrawContextKind::ColorTiling)?;

        Ok(self.patterns.push(PatternRecord::Tiling(TilingPattern {
            stream: finished.stream,
            properties,
        })))
    }

    /// Register a pattern that paints a shading.
    pub fn add_shading_pattern(&mut self, pattern: ShadingPattern) -> CapyResult<PatternId> {
        pattern.validate(self.id)?;

        if pattern.matrix.is_some_and(|m| !m.is_finite()) {
            return Err(CapyError::invalid("Non-finite pattern matrix."));
        }

        self.shadings.get(pattern.shading)?;
        Ok(self.patterns.push(PatternRecord::Shading(pattern)))
    }

    /// Register a transparency group.
    pub fn add_transparency_group(
        &mut self,
        ctx: DrawContext,
        properties: TransparencyGroupProperties,
    ) -> CapyResult<TransparencyGroupId> {
        properties.validate(self.id)?;

        if let Some(color_space) = properties.color_space {
            self.color_space_components(color_space)?;
        }

        let finished = self.finish_context(ctx, DrawContextKind::TransparencyGroup)?;

        Ok(self
            .transparency_groups
            .push(FormXObjectRecord::transparency_group(
                finished.stream,
                properties,
            )))
    }

    /// Load a TrueType or OpenType font from a file.
    pub fn load_font(&mut self, path: impl AsRef<Path>) -> CapyResult<FontId> {
        let data = std::fs::read(path.as_ref())?;
        log::debug!("loading font {}", path.as_ref().display());
        self.load_font_data(data)
    }

    /// Load a TrueType or OpenType font from its bytes.
    ///
    /// Every call registers a new font, even for the same data.
    pub fn load_font_data(&mut self, data: Vec<u8>) -> CapyResult<FontId> {
        let font = FontRecord::load(data, 0)?;
        Ok(self.shared.borrow_mut().fonts.push(font))
    }

    /// The handle of one of the standard 14 fonts.
    ///
    /// Asking for the same font again returns the same handle. Builtin fonts are
    /// not embedded, so they can't be used with an output intent.
    pub fn builtin_font(&mut self, font: BuiltinFont) -> CapyResult<FontId> {
        if self.properties.output_intent.is_some() {
            return Err(CapyError::invalid(
                "Builtin fonts can't be used with an output intent.",
            ));
        }

        if let Some(id) = self.builtin_fonts.get(&font) {
            return Ok(*id);
        }

        let id = self
            .shared
            .borrow_mut()
            .fonts
            .push(FontRecord::Builtin(font));
        self.builtin_fonts.insert(font, id);
        Ok(id)
    }

    /// The width of a text in the font, in user space units.
    pub fn text_width(&self, font: FontId, size: f32, text: &str) -> CapyResult<f32> {
        check_finite(&[size], "font size")?;
        let shared = self.shared.borrow();
        shared.fonts.get(font)?.text_width(size, text)
    }

    /// The glyph the font uses for the character, if it has one.
    pub fn glyph_id(&self, font: FontId, c: char) -> CapyResult<Option<u32>> {
        let shared = self.shared.borrow();
        shared.fonts.get(font)?.glyph_id(c)
    }

    /// Load a PNG or JPEG image from a file.
    #[cfg(feature = "raster-images")]
    pub fn load_image(&self, path: impl AsRef<Path>) -> CapyResult<RasterImage> {
        let data = std::fs::read(path.as_ref())?;
        self.load_image_data(&data)
    }

    /// Decode a PNG or JPEG image.
    #[cfg(feature = "raster-images")]
    pub fn load_image_data(&self, data: &[u8]) -> CapyResult<RasterImage> {
        RasterImage::from_data(data)
    }

    /// Convert an image into another device colorspace.
    pub fn convert_image(
        &self,
        image: &RasterImage,
        target: DeviceColorSpace,
        converter: &dyn ColorConverter,
    ) -> CapyResult<RasterImage> {
        image.convert(target, converter)
    }

    /// Register an image.
    pub fn add_image(
        &mut self,
        image: RasterImage,
        properties: ImageProperties,
    ) -> CapyResult<ImageId> {
        let record = ImageRecord::new(image, properties)?;
        Ok(self.images.push(record))
    }

    /// Load an ICC profile from a file and register it as a colorspace.
    pub fn load_icc_profile(&mut self, path: impl AsRef<Path>) -> CapyResult<IccColorSpaceId> {
        let data = std::fs::read(path.as_ref())?;
        self.add_icc_profile(&data)
    }

    /// Register an ICC profile as a colorspace.
    pub fn add_icc_profile(&mut self, data: &[u8]) -> CapyResult<IccColorSpaceId> {
        let profile = IccProfile::new(data)?;
        Ok(self.icc_color_spaces.push(profile))
    }

    /// The number of components of an ICC-based colorspace.
    pub fn icc_components(&self, color_space: IccColorSpaceId) -> CapyResult<usize> {
        Ok(self.icc_color_spaces.get(color_space)?.num_components())
    }

    /// Create a color in an ICC-based colorspace.
    pub fn icc_color(
        &self,
        color_space: IccColorSpaceId,
        components: &[f32],
    ) -> CapyResult<Color> {
        let expected = self.icc_components(color_space)?;

        if components.len() != expected {
            return Err(CapyError::ColorComponentMismatch {
                expected,
                found: components.len(),
            });
        }

        check_finite(components, "color component")?;

        Ok(Color::Icc(IccColor {
            color_space,
            components: components.to_vec(),
        }))
    }

    /// Register a Lab colorspace.
    pub fn add_lab_colorspace(&mut self, lab: LabColorSpace) -> CapyResult<LabColorSpaceId> {
        lab.validate()?;
        Ok(self.lab_color_spaces.push(lab))
    }

    /// Register a function.
    pub fn add_function(&mut self, function: impl Into<Function>) -> CapyResult<FunctionId> {
        let record = FunctionRecord::new(function.into(), self.id, &self.functions)?;
        Ok(self.functions.push(record))
    }

    /// Register a separation colorspace.
    ///
    /// The tint transform maps a single tint value to the components of the
    /// alternate colorspace.
    pub fn add_separation(
        &mut self,
        name: &str,
        alternate: DeviceColorSpace,
        tint_transform: FunctionId,
    ) -> CapyResult<SeparationId> {
        crate::util::check_pdf_name(name, "Separation name")?;

        let function = self.functions.get(tint_transform)?;
        if function.inputs != 1 {
            return Err(CapyError::invalid(format!(
                "Tint transform must take one input, it takes {}.",
                function.inputs
            )));
        }

        if function.outputs != alternate.num_components() {
            return Err(CapyError::ColorComponentMismatch {
                expected: alternate.num_components(),
                found: function.outputs,
            });
        }

        Ok(self.separations.push(Separation {
            name: name.to_string(),
            alternate,
            tint_transform,
        }))
    }

    fn color_space_components(&self, color_space: ColorSpace) -> CapyResult<usize> {
        color_space.check_document(self.id)?;

        match color_space {
            ColorSpace::Device(device) => Ok(device.num_components()),
            ColorSpace::Icc(id) => self.icc_components(id),
            ColorSpace::Lab(id) => self.lab_color_spaces.get(id).map(|_| 3),
            ColorSpace::Separation(id) => self.separations.get(id).map(|_| 1),
            ColorSpace::Pattern => Err(CapyError::TypeMismatch {
                expected: "a colorspace with components",
                found: "Pattern",
            }),
        }
    }

    /// Register a shading.
    pub fn add_shading(&mut self, shading: impl Into<Shading>) -> CapyResult<ShadingId> {
        let shading = shading.into();
        let color_space = shading.color_space();
        let components = self.color_space_components(color_space)?;

        shading.validate_geometry()?;

        if let Some((function, inputs)) = shading.function() {
            let function = self.functions.get(function)?;

            if function.inputs != inputs {
                return Err(CapyError::invalid(format!(
                    "Shading function must take {inputs} inputs, it takes {}.",
                    function.inputs
                )));
            }

            if function.outputs != components {
                return Err(CapyError::ColorComponentMismatch {
                    expected: components,
                    found: function.outputs,
                });
            }
        }

        for color in shading.mesh_colors() {
            if color.color_space() != color_space {
                return Err(CapyError::ColorSpaceMismatch(format!(
                    "Mesh is in {} but a vertex color is in {}.",
                    color_space.kind(),
                    color.color_space().kind()
                )));
            }

            color.validate(self.id)?;
        }

        let component_ranges = match color_space {
            ColorSpace::Lab(id) => {
                let lab = self.lab_color_spaces.get(id)?;
                vec![[0.0, 100.0], [lab.amin, lab.amax], [lab.bmin, lab.bmax]]
            }
            _ => vec![[0.0, 1.0]; components],
        };

        Ok(self.shadings.push(ShadingRecord {
            shading,
            component_ranges,
        }))
    }

    /// Register an extended graphics state.
    pub fn add_graphics_state(&mut self, state: GraphicsState) -> CapyResult<GraphicsStateId> {
        state.validate(self.id)?;

        if let Some(soft_mask) = &state.soft_mask {
            self.transparency_groups.get(soft_mask.group)?;
        }

        Ok(self.graphics_states.push(state))
    }

    /// Register an optional content group, which is turned on by default.
    pub fn add_optional_content_group(
        &mut self,
        name: &str,
    ) -> CapyResult<OptionalContentGroupId> {
        if name.is_empty() {
            return Err(CapyError::invalid(
                "Optional content group name must not be empty.",
            ));
        }

        Ok(self.optional_content_groups.push(OptionalContentGroup {
            name: name.to_string(),
        }))
    }

    /// Embed a file. The name must be unique within the document.
    pub fn add_embedded_file(
        &mut self,
        name: &str,
        data: Vec<u8>,
        mime_type: Option<&str>,
    ) -> CapyResult<EmbeddedFileId> {
        if self.embedded_files.values().any(|f| f.name == name) {
            return Err(CapyError::DuplicateName(name.to_string()));
        }

        let file = EmbeddedFile::new(name, data, mime_type, self.properties.pdf_version)?;
        Ok(self.embedded_files.push(file))
    }

    /// Add a node to the structure tree.
    pub fn add_structure_item(
        &mut self,
        kind: impl Into<StructureKind>,
        parent: Option<StructureItemId>,
        extra: Option<StructItemExtraData>,
    ) -> CapyResult<StructureItemId> {
        self.shared
            .borrow_mut()
            .structure
            .add_item(kind.into(), parent, extra.unwrap_or_default())
    }

    /// Add a custom structure role that maps to a builtin type.
    pub fn add_rolemap_entry(&mut self, name: &str, builtin: StructureType) -> CapyResult<RoleId> {
        self.shared.borrow_mut().structure.add_role(name, builtin)
    }

    /// Add an outline item.
    pub fn add_outline(&mut self, outline: Outline) -> CapyResult<OutlineId> {
        self.outlines.add(outline, &mut self.destinations)
    }

    /// Register an annotation. It is attached to a page with
    /// [`DrawContext::annotate`].
    pub fn add_annotation(&mut self, annotation: Annotation) -> CapyResult<AnnotationId> {
        let record = AnnotationRecord::new(annotation, self.id, &mut self.destinations)?;
        Ok(self.annotations.push(record))
    }

    /// Label the pages from `start_page` on.
    pub fn add_page_labeling(
        &mut self,
        start_page: u32,
        style: Option<NumberingStyle>,
        prefix: Option<&str>,
        start_num: Option<u32>,
    ) -> CapyResult<()> {
        let label = PageLabel {
            start_page,
            style,
            prefix: prefix.map(str::to_string),
            start_num,
        };
        label.validate()?;

        if self.page_labels.iter().any(|l| l.start_page == start_page) {
            return Err(CapyError::invalid(format!(
                "Page {start_page} already has a label."
            )));
        }

        self.page_labels.push(label);

        Ok(())
    }

    fn object_counts(&self, shared: &Shared) -> ObjectCounts {
        ObjectCounts {
            pages: self.pages.len(),
            fonts: shared.fonts.len(),
            images: self.images.len(),
            icc_color_spaces: self.icc_color_spaces.len(),
            lab_color_spaces: self.lab_color_spaces.len(),
            functions: self.functions.len(),
            separations: self.separations.len(),
            shadings: self.shadings.len(),
            patterns: self.patterns.len(),
            graphics_states: self.graphics_states.len(),
            optional_content_groups: self.optional_content_groups.len(),
            form_xobjects: self.form_xobjects.len(),
            transparency_groups: self.transparency_groups.len(),
            embedded_files: self.embedded_files.len(),
            annotations: self.annotations.len(),
            outlines: self.outlines.len(),
            structure_items: shared.structure.items.len(),
        }
    }

    fn write_output_intent(&self, sc: &mut SerializeContext) {
        let (Some(intent), Some(profile)) = (&self.properties.output_intent, &self.output_profile)
        else {
            return;
        };

        let mut chunk = Chunk::new();
        let profile_ref = profile.write_stream(sc, &mut chunk);
        let intents_ref = sc.new_ref();

        let mut intents = chunk.indirect(intents_ref).array();
        let mut dict = intents.push().dict();
        dict.pair(Name(b"Type"), Name(b"OutputIntent"));
        dict.pair(Name(b"S"), intent.subtype.to_pdf());
        dict.pair(
            Name(b"OutputConditionIdentifier"),
            TextStr(&intent.identifier),
        );
        dict.pair(Name(b"Info"), TextStr(&intent.identifier));
        dict.pair(Name(b"DestOutputProfile"), profile_ref);
        dict.finish();
        intents.finish();

        sc.chunk_container.destination_profiles = Some((intents_ref, chunk));
    }

    /// Serialize the document into the bytes of a PDF file.
    pub fn finish(self) -> CapyResult<Vec<u8>> {
        if self.pages.is_empty() {
            return Err(CapyError::NoPagesDefined);
        }

        let shared = self.shared.borrow();

        shared.structure.check_forest()?;
        self.outlines.check_forest()?;
        self.destinations.check(self.pages.len())?;

        let mut sc =
            SerializeContext::new(self.serialize_settings.clone(), self.object_counts(&shared));

        let page_tree_ref = sc.page_tree_ref();
        let mut page_tree = Chunk::new();
        page_tree
            .pages(page_tree_ref)
            .kids(sc.refs.pages.iter().copied())
            .count(self.pages.len() as i32);
        sc.chunk_container.page_tree = Some((page_tree_ref, page_tree));

        let refs = sc.refs.pages.clone();
        sc.push_all(self.pages.iter(), refs)?;

        let refs = sc.refs.fonts.iter().collect();
        sc.push_all(shared.fonts.values(), refs)?;
        let refs = sc.refs.images.iter().collect();
        sc.push_all(self.images.values(), refs)?;
        let refs = sc.refs.icc_color_spaces.iter().collect();
        sc.push_all(self.icc_color_spaces.values(), refs)?;
        let refs = sc.refs.lab_color_spaces.iter().collect();
        sc.push_all(self.lab_color_spaces.values(), refs)?;
        let refs = sc.refs.functions.iter().collect();
        sc.push_all(self.functions.values(), refs)?;
        let refs = sc.refs.separations.iter().collect();
        sc.push_all(self.separations.values(), refs)?;
        let refs = sc.refs.shadings.iter().collect();
        sc.push_all(self.shadings.values(), refs)?;
        let refs = sc.refs.patterns.iter().collect();
        sc.push_all(self.patterns.values(), refs)?;
        let refs = sc.refs.graphics_states.iter().collect();
        sc.push_all(self.graphics_states.values(), refs)?;

        let refs: Vec<_> = sc.refs.optional_content_groups.iter().collect();
        sc.chunk_container.optional_content_groups = refs.clone();
        sc.push_all(self.optional_content_groups.values(), refs)?;

        let refs = sc.refs.form_xobjects.iter().collect();
        sc.push_all(self.form_xobjects.values(), refs)?;
        let refs = sc.refs.transparency_groups.iter().collect();
        sc.push_all(self.transparency_groups.values(), refs)?;
        let refs = sc.refs.embedded_files.iter().collect();
        sc.push_all(self.embedded_files.values(), refs)?;

        let refs: Vec<_> = sc.refs.annotations.iter().collect();
        for (annotation, root_ref) in self.annotations.values().zip(refs) {
            let chunk = annotation.serialize(&sc, &self.destinations, root_ref)?;
            sc.chunk_container.annotations.push(chunk);
        }

        if self.properties.tagged || !shared.structure.is_empty() {
            shared.structure.serialize(&mut sc, &self.page_structure)?;
        }

        self.outlines.serialize(&mut sc, &self.destinations)?;

        if !self.page_labels.is_empty() {
            let labels_ref = sc.new_ref();
            if let Some(chunk) =
                serialize_page_labels(&self.page_labels, self.pages.len(), labels_ref)?
            {
                sc.chunk_container.page_label_tree = Some((labels_ref, chunk));
            }
        }

        self.write_output_intent(&mut sc);
        sc.chunk_container.metadata = Some(Metadata::new(&self.properties));

        let chunk_container = std::mem::take(&mut sc.chunk_container);
        let pdf = chunk_container.finish(&mut sc)?;

        Ok(pdf.finish())
    }

    /// Serialize the document and write it to its path.
    ///
    /// The file is only created once the whole document has been serialized, so a
    /// failed write leaves nothing behind.
    pub fn write(self) -> CapyResult<()> {
        let path = self.path.clone();
        let page_count = self.pages.len();
        let data = self.finish()?;

        std::fs::write(&path, &data)?;

        log::debug!(
            "wrote {} bytes with {} pages to {}",
            data.len(),
            page_count,
            path.display()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::DeviceColorSpace;
    use crate::destination::Destination;
    use crate::function::{ExponentialFunction, StitchingFunction};
    use crate::shading::AxialShading;

    fn document() -> Document {
        let settings = SerializeSettings {
            compress_content_streams: false,
            xmp_metadata: false,
            ..SerializeSettings::default()
        };
        Document::with_serialize_settings("unused.pdf", DocumentProperties::default(), settings)
            .unwrap()
    }

    fn output(document: Document) -> String {
        String::from_utf8_lossy(&document.finish().unwrap()).into_owned()
    }

    fn red_to_blue(document: &mut Document) -> FunctionId {
        document
            .add_function(ExponentialFunction {
                domain: [0.0, 1.0],
                c0: Color::Rgb(1.0, 0.0, 0.0),
                c1: Color::Rgb(0.0, 0.0, 1.0),
                n: 1.0,
            })
            .unwrap()
    }

    #[test]
    fn empty_documents_are_rejected() {
        assert_eq!(document().finish(), Err(CapyError::NoPagesDefined));
    }

    #[test]
    fn single_page() {
        let mut document = document();
        let mut page = document.new_page_context();
        page.rect(10.0, 10.0, 20.0, 20.0).unwrap();
        page.fill();
        document.add_page(page).unwrap();

        let data = output(document);
        assert!(data.starts_with("%PDF-1.7"));
        assert!(data.contains("/Type /Pages"));
        assert!(data.contains("/Count 1"));
        assert!(data.contains("10 10 20 20 re\nf"));
        assert!(data.contains("/MediaBox [0 0 595"));
    }

    #[test]
    fn contexts_must_match_their_use() {
        let mut document = document();
        let form = document.new_form_xobject(10.0, 10.0).unwrap();

        assert_eq!(
            document.add_page(form),
            Err(CapyError::TypeMismatch {
                expected: "page context",
                found: "form XObject context"
            })
        );
    }

    #[test]
    fn contexts_of_other_documents_are_rejected() {
        let mut first = document();
        let second = document();

        assert!(matches!(
            first.add_page(second.new_page_context()),
            Err(CapyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn structure_items_are_not_shared_between_pages() {
        let mut document = document();
        let item = document
            .add_structure_item(StructureType::P, None, None)
            .unwrap();

        let mut page = document.new_page_context();
        page.begin_marked_structure(item).unwrap();
        page.end_marked_content().unwrap();
        document.add_page(page).unwrap();

        let mut page = document.new_page_context();
        page.begin_marked_structure(item).unwrap();
        page.end_marked_content().unwrap();
        assert_eq!(document.add_page(page), Err(CapyError::StructureReuse(0)));
    }

    #[test]
    fn structure_tree_is_written() {
        let mut document = document();
        let section = document
            .add_structure_item(StructureType::Sect, None, None)
            .unwrap();
        let paragraph = document
            .add_structure_item(StructureType::P, Some(section), None)
            .unwrap();

        let mut page = document.new_page_context();
        page.begin_marked_structure(paragraph).unwrap();
        page.end_marked_content().unwrap();
        document.add_page(page).unwrap();

        let data = output(document);
        assert!(data.contains("/StructTreeRoot"));
        assert!(data.contains("/StructParents 0"));
        assert!(data.contains("/Marked true"));
        assert!(data.contains("/ParentTreeNextKey 1"));
    }

    #[test]
    fn annotations_belong_to_one_page() {
        let mut document = document();
        let annotation = document
            .add_annotation(Annotation::new(
                crate::annotation::AnnotationKind::Text("Note".to_string()),
                Rect::from_xywh(0.0, 0.0, 10.0, 10.0).unwrap(),
            ))
            .unwrap();

        let mut page = document.new_page_context();
        page.annotate(annotation).unwrap();
        document.add_page(page).unwrap();

        let mut page = document.new_page_context();
        page.annotate(annotation).unwrap();
        assert!(document.add_page(page).is_err());
        assert_eq!(document.page_count(), 1);
    }

    #[test]
    fn destinations_resolve_at_write() {
        let mut document = document();
        document
            .add_outline(Outline {
                title: "Second page".to_string(),
                destination: Some(Destination::fit(1)),
                ..Outline::default()
            })
            .unwrap();

        document.add_page(document.new_page_context()).unwrap();
        document.add_page(document.new_page_context()).unwrap();

        let data = output(document);
        assert!(data.contains("/Type /Outlines"));
        assert!(data.contains("/Fit]"));
    }

    #[test]
    fn destinations_beyond_the_last_page_fail() {
        let mut document = document();
        document
            .add_outline(Outline {
                title: "Nowhere".to_string(),
                destination: Some(Destination::fit(3)),
                ..Outline::default()
            })
            .unwrap();
        document.add_page(document.new_page_context()).unwrap();

        assert_eq!(
            document.finish(),
            Err(CapyError::UnresolvedDestination {
                page: 3,
                page_count: 1
            })
        );
    }

    #[test]
    fn shading_function_must_match_colorspace() {
        let mut document = document();
        let function = red_to_blue(&mut document);

        let gray = AxialShading::new(DeviceColorSpace::Gray, [0.0, 0.0, 1.0, 0.0], function);
        assert_eq!(
            document.add_shading(gray),
            Err(CapyError::ColorComponentMismatch {
                expected: 1,
                found: 3
            })
        );

        let rgb = AxialShading::new(DeviceColorSpace::Rgb, [0.0, 0.0, 1.0, 0.0], function);
        assert!(document.add_shading(rgb).is_ok());
    }

    #[test]
    fn separation_tint_transform_must_fit_alternate() {
        let mut document = document();
        let function = red_to_blue(&mut document);

        assert!(document
            .add_separation("Gold", DeviceColorSpace::Cmyk, function)
            .is_err());
        assert!(document
            .add_separation("Gold", DeviceColorSpace::Rgb, function)
            .is_ok());
        assert!(document
            .add_separation("", DeviceColorSpace::Rgb, function)
            .is_err());
    }

    #[test]
    fn stitching_needs_registered_functions() {
        let mut document = document();
        let first = red_to_blue(&mut document);
        let second = red_to_blue(&mut document);

        let stitched = document.add_function(StitchingFunction {
            domain: [0.0, 1.0],
            functions: vec![first, second],
            bounds: vec![0.5],
            encode: vec![0.0, 1.0, 0.0, 1.0],
        });
        assert!(stitched.is_ok());
    }

    #[test]
    fn embedded_files_need_unique_names() {
        let mut document = document();
        document
            .add_embedded_file("data.csv", b"a,b".to_vec(), Some("text/csv"))
            .unwrap();

        assert_eq!(
            document.add_embedded_file("data.csv", vec![], None),
            Err(CapyError::DuplicateName("data.csv".to_string()))
        );

        document.add_page(document.new_page_context()).unwrap();
        let data = output(document);
        assert!(data.contains("/EmbeddedFiles"));
        assert!(data.contains("(data.csv)"));
    }

    #[test]
    fn optional_content_is_on_by_default() {
        let mut document = document();
        let group = document.add_optional_content_group("Overlay").unwrap();

        let mut page = document.new_page_context();
        page.begin_marked_optional_content(group).unwrap();
        page.end_marked_content().unwrap();
        document.add_page(page).unwrap();

        let data = output(document);
        assert!(data.contains("/OCProperties"));
        assert!(data.contains("/Type /OCG"));
    }

    #[test]
    fn duplicate_page_labels_are_rejected() {
        let mut document = document();
        document
            .add_page_labeling(0, Some(NumberingStyle::LowerRoman), None, None)
            .unwrap();
        assert!(document
            .add_page_labeling(0, Some(NumberingStyle::Arabic), None, None)
            .is_err());
    }

    #[test]
    fn icc_colors_need_matching_components() {
        let mut document = document();
        let mut header = vec![0; 128];
        header[8] = 4;
        header[16..20].copy_from_slice(b"CMYK");
        let cmyk = document.add_icc_profile(&header).unwrap();

        assert_eq!(
            document.icc_color(cmyk, &[0.0, 0.5, 1.0]),
            Err(CapyError::ColorComponentMismatch {
                expected: 4,
                found: 3
            })
        );
        assert!(document.icc_color(cmyk, &[0.0, 0.5, 1.0, 0.2]).is_ok());
    }
}
