//! Fonts.
//!
//! Loaded fonts are embedded as CID-keyed `Type0` fonts with the `Identity-H`
//! encoding. Glyphs are assigned CIDs in the order they are first used, and the font
//! is subset to exactly those glyphs when the document is written. The text each
//! glyph was used for ends up in the `ToUnicode` CMap so that viewers can extract
//! the text again.
//!
//! The standard 14 fonts are written as unembedded `Type1` fonts and can only show
//! ASCII text.

use std::collections::BTreeMap;
use std::ops::DerefMut;

use pdf_writer::types::{CidFontType, FontFlags, SystemInfo, UnicodeCmap};
use pdf_writer::writers::WMode;
use pdf_writer::{Chunk, Finish, Name, Ref, Str};
use skrifa::instance::{LocationRef, Size};
use skrifa::raw::tables::cff::Cff;
use skrifa::raw::types::NameId;
use skrifa::raw::{TableProvider, TopLevelTable};
use skrifa::{FontRef, GlyphId, MetadataProvider};
use subsetter::GlyphRemapper;

use crate::chunk_container::ChunkContainerFn;
use crate::error::{CapyError, CapyResult};
use crate::geom::{Rect, RectExt};
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::FilterStreamBuilder;
use crate::text::{BuiltinFont, SequenceItem, TextSequence};
use crate::util::hash128;

const SUBSET_TAG_LEN: usize = 6;
const IDENTITY_H: &str = "Identity-H";
const CMAP_NAME: Name = Name(b"Custom");
const SYSTEM_INFO: SystemInfo = SystemInfo {
    registry: Str(b"Adobe"),
    ordering: Str(b"Identity"),
    supplement: 0,
};

/// A character identifier, i.e. the glyph id in the subset font.
pub(crate) type Cid = u16;

/// Global metrics of a font, read once when the font is loaded.
#[derive(Debug, Clone)]
struct FontInfo {
    units_per_em: f32,
    postscript_name: Option<String>,
    ascent: f32,
    descent: f32,
    cap_height: Option<f32>,
    italic_angle: f32,
    weight: f32,
    is_monospaced: bool,
    bbox: Rect,
    is_cff: bool,
}

impl FontInfo {
    fn new(font_ref: &FontRef) -> CapyResult<Self> {
        let is_glyf = font_ref.glyf().is_ok();
        let is_cff = font_ref.cff().is_ok();

        if !is_glyf && !is_cff {
            return Err(CapyError::Font(if font_ref.cff2().is_ok() {
                "CFF2 fonts are not supported".to_string()
            } else {
                "font is missing `glyf` or `CFF` table".to_string()
            }));
        }

        let metrics = font_ref.metrics(Size::unscaled(), LocationRef::default());
        let units_per_em = metrics.units_per_em as f32;

        if units_per_em <= 0.0 {
            return Err(CapyError::Font("font has no units per em".to_string()));
        }

        let bbox = metrics
            .bounds
            .and_then(|b| Rect::from_ltrb(b.x_min, b.y_min, b.x_max, b.y_max))
            .or_else(|| Rect::from_xywh(0.0, 0.0, units_per_em, units_per_em))
            .ok_or_else(|| CapyError::Font("font has an invalid bounding box".to_string()))?;

        let postscript_name = font_ref.name().ok().and_then(|name| {
            name.name_record().iter().find_map(|n| {
                if n.name_id.get() == NameId::POSTSCRIPT_NAME {
                    if let Ok(string) = n.string(name.string_data()) {
                        return Some(string.to_string());
                    }
                }

                None
            })
        });

        Ok(Self {
            units_per_em,
            postscript_name,
            ascent: metrics.ascent,
            descent: metrics.descent,
            cap_height: metrics.cap_height,
            italic_angle: metrics.italic_angle,
            weight: font_ref.attributes().weight.value(),
            is_monospaced: metrics.is_monospace,
            bbox,
            is_cff,
        })
    }
}

/// A font of the document.
#[derive(Debug, Clone)]
pub(crate) enum FontRecord {
    Embedded(EmbeddedFont),
    Builtin(BuiltinFont),
}

impl FontRecord {
    pub(crate) fn load(data: Vec<u8>, index: u32) -> CapyResult<Self> {
        Ok(Self::Embedded(EmbeddedFont::new(data, index)?))
    }

    fn embedded(&self, what: &str) -> CapyResult<&EmbeddedFont> {
        match self {
            FontRecord::Embedded(font) => Ok(font),
            FontRecord::Builtin(font) => Err(CapyError::Font(format!(
                "builtin font {} has no {what}",
                font.base_font()
            ))),
        }
    }

    /// The glyph the font maps the character to, if any.
    pub(crate) fn glyph_id(&self, c: char) -> CapyResult<Option<u32>> {
        Ok(self.embedded("glyph table")?.glyph_id(c))
    }

    /// The width of the text when set in the given size, without kerning.
    pub(crate) fn text_width(&self, size: f32, text: &str) -> CapyResult<f32> {
        Ok(self.embedded("metrics")?.text_width(size, text))
    }

    /// Check that the text can be encoded, without adding anything to the font.
    pub(crate) fn check_text(&self, text: &str) -> CapyResult<()> {
        match self {
            FontRecord::Embedded(font) => text
                .chars()
                .try_for_each(|c| font.check_glyph(font.glyph_id(c).unwrap_or(0)).map(|_| ())),
            FontRecord::Builtin(_) => check_ascii(text),
        }
    }

    /// Check that every glyph of the sequence can be encoded, without adding
    /// anything to the font.
    pub(crate) fn check_sequence(&self, sequence: &TextSequence) -> CapyResult<()> {
        for item in &sequence.items {
            match (self, item) {
                (_, SequenceItem::Char(c)) => {
                    let mut buf = [0; 4];
                    self.check_text(c.encode_utf8(&mut buf))?;
                }
                (FontRecord::Embedded(font), SequenceItem::Glyph { glyph_id, .. })
                | (FontRecord::Embedded(font), SequenceItem::GlyphText { glyph_id, .. }) => {
                    font.check_glyph(*glyph_id)?;
                }
                (FontRecord::Builtin(font), SequenceItem::Glyph { .. })
                | (FontRecord::Builtin(font), SequenceItem::GlyphText { .. }) => {
                    return Err(CapyError::Font(format!(
                        "builtin font {} can't show glyphs by id",
                        font.base_font()
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Encode a string into the character codes of the font.
    pub(crate) fn encode_text(&mut self, text: &str) -> CapyResult<Vec<u8>> {
        match self {
            FontRecord::Embedded(font) => font.encode_text(text),
            FontRecord::Builtin(_) => {
                check_ascii(text)?;
                Ok(text.as_bytes().to_vec())
            }
        }
    }

    /// Encode a single character.
    pub(crate) fn encode_char(&mut self, c: char) -> CapyResult<Vec<u8>> {
        let mut buf = [0; 4];
        self.encode_text(c.encode_utf8(&mut buf))
    }

    /// Encode a glyph that stands for `text`.
    pub(crate) fn encode_glyph(&mut self, glyph_id: u32, text: &str) -> CapyResult<Vec<u8>> {
        match self {
            FontRecord::Embedded(font) => {
                let cid = font.add_glyph(glyph_id)?;
                font.set_codepoints(cid, text);
                Ok(cid.to_be_bytes().to_vec())
            }
            FontRecord::Builtin(font) => Err(CapyError::Font(format!(
                "builtin font {} can't show glyphs by id",
                font.base_font()
            ))),
        }
    }

    /// The number of glyphs in the subset, including `.notdef`.
    #[cfg(test)]
    pub(crate) fn subset_len(&self) -> usize {
        match self {
            FontRecord::Embedded(font) => font.widths.len(),
            FontRecord::Builtin(_) => 0,
        }
    }
}

fn check_ascii(text: &str) -> CapyResult<()> {
    if text.is_ascii() {
        Ok(())
    } else {
        Err(CapyError::Font(
            "builtin fonts only support ASCII text".to_string(),
        ))
    }
}

/// A loaded font, together with the glyphs that have been used so far.
#[derive(Debug, Clone)]
pub(crate) struct EmbeddedFont {
    data: Vec<u8>,
    index: u32,
    info: FontInfo,
    /// Maps glyph ids of the original font to CIDs.
    glyph_remapper: GlyphRemapper,
    /// The text of each CID.
    cmap_entries: BTreeMap<Cid, String>,
    /// The advance widths in font units, indexed by CID.
    widths: Vec<f32>,
}

impl EmbeddedFont {
    fn new(data: Vec<u8>, index: u32) -> CapyResult<Self> {
        let font_ref = FontRef::from_index(&data, index)
            .map_err(|e| CapyError::Font(format!("failed to parse font: {e}")))?;
        let info = FontInfo::new(&font_ref)?;

        log::debug!(
            "loaded font {} with {} units per em",
            info.postscript_name.as_deref().unwrap_or("unknown"),
            info.units_per_em
        );

        let mut font = Self {
            data,
            index,
            info,
            glyph_remapper: GlyphRemapper::new(),
            cmap_entries: BTreeMap::new(),
            widths: vec![],
        };

        // The .notdef glyph is always part of the subset.
        let notdef_width = font.advance_width(0);
        font.widths.push(notdef_width);

        Ok(font)
    }

    fn font_ref(&self) -> CapyResult<FontRef<'_>> {
        FontRef::from_index(&self.data, self.index)
            .map_err(|e| CapyError::Font(format!("failed to parse font: {e}")))
    }

    fn name(&self) -> &str {
        self.info.postscript_name.as_deref().unwrap_or("unknown")
    }

    /// The glyph the font maps the character to, if any.
    fn glyph_id(&self, c: char) -> Option<u32> {
        self.font_ref()
            .ok()?
            .charmap()
            .map(c)
            .map(|g| g.to_u32())
            .filter(|g| *g != 0)
    }

    /// The advance width of a glyph in font units.
    fn advance_width(&self, glyph_id: u32) -> f32 {
        self.font_ref()
            .ok()
            .and_then(|f| {
                f.glyph_metrics(Size::unscaled(), LocationRef::default())
                    .advance_width(GlyphId::new(glyph_id))
            })
            .unwrap_or(0.0)
    }

    /// The width of the text when set in the given size, without kerning.
    fn text_width(&self, size: f32, text: &str) -> f32 {
        let units = text
            .chars()
            .map(|c| self.advance_width(self.glyph_or_notdef(c)))
            .sum::<f32>();

        units / self.info.units_per_em * size
    }

    fn glyph_or_notdef(&self, c: char) -> u32 {
        self.glyph_id(c).unwrap_or_else(|| {
            log::warn!("font {} has no glyph for {:?}", self.name(), c);
            0
        })
    }

    /// The glyph id, if the font has such a glyph.
    fn check_glyph(&self, glyph_id: u32) -> CapyResult<u16> {
        let glyph_id = u16::try_from(glyph_id).map_err(|_| {
            CapyError::Font(format!("glyph id {glyph_id} is out of range"))
        })?;

        if glyph_id as u32 >= self.num_glyphs() {
            return Err(CapyError::Font(format!(
                "font {} has no glyph with id {}",
                self.name(),
                glyph_id
            )));
        }

        Ok(glyph_id)
    }

    /// Add a glyph to the subset and return its CID.
    fn add_glyph(&mut self, glyph_id: u32) -> CapyResult<Cid> {
        let glyph_id = self.check_glyph(glyph_id)?;
        let cid = self.glyph_remapper.remap(glyph_id);

        // A new CID needs its width.
        if cid as usize >= self.widths.len() {
            let width = self.advance_width(glyph_id as u32);
            self.widths.push(width);
        }

        Ok(cid)
    }

    fn num_glyphs(&self) -> u32 {
        self.font_ref()
            .ok()
            .and_then(|f| f.maxp().ok())
            .map(|maxp| maxp.num_glyphs() as u32)
            .unwrap_or(0)
    }

    /// Record the text a CID stands for. The first mapping wins.
    fn set_codepoints(&mut self, cid: Cid, text: &str) {
        if !text.is_empty() && cid != 0 {
            self.cmap_entries
                .entry(cid)
                .or_insert_with(|| text.to_string());
        }
    }

    /// Encode a string into the CIDs of the font.
    fn encode_text(&mut self, text: &str) -> CapyResult<Vec<u8>> {
        let mut encoded = Vec::with_capacity(text.len() * 2);

        for c in text.chars() {
            let cid = self.encode_char(c)?;
            encoded.extend(cid.to_be_bytes());
        }

        Ok(encoded)
    }

    /// Encode a single character and return its CID.
    fn encode_char(&mut self, c: char) -> CapyResult<Cid> {
        let glyph_id = self.glyph_or_notdef(c);
        let cid = self.add_glyph(glyph_id)?;
        let mut buf = [0; 4];
        self.set_codepoints(cid, c.encode_utf8(&mut buf));

        Ok(cid)
    }

    fn base_font_name(&self) -> String {
        const REST_LEN: usize = SUBSET_TAG_LEN + 1 + 1 + IDENTITY_H.len();
        let postscript_name = self.name();
        let max_len = 127 - REST_LEN;

        let mut end = postscript_name.len().min(max_len);
        while !postscript_name.is_char_boundary(end) {
            end -= 1;
        }

        let gids = self.glyph_remapper.remapped_gids().collect::<Vec<_>>();
        let subset_tag = subset_tag(&(postscript_name, gids));

        format!("{subset_tag}+{}", &postscript_name[..end])
    }
}

/// Create a tag for a font subset.
fn subset_tag<T: std::hash::Hash>(data: &T) -> String {
    const BASE: u128 = 26;
    let mut hash = hash128(data);
    let mut tag = String::with_capacity(SUBSET_TAG_LEN);

    for _ in 0..SUBSET_TAG_LEN {
        tag.push((b'A' + (hash % BASE) as u8) as char);
        hash /= BASE;
    }

    tag
}

impl Serialize for FontRecord {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.fonts
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        match self {
            FontRecord::Embedded(font) => font.write_type0(sc, root_ref),
            FontRecord::Builtin(font) => {
                let mut chunk = Chunk::new();
                let mut type1 = chunk.type1_font(root_ref);
                type1.base_font(Name(font.base_font().as_bytes()));
                if !font.is_symbolic() {
                    type1.encoding_predefined(Name(b"WinAnsiEncoding"));
                }
                type1.finish();

                Ok(chunk)
            }
        }
    }
}

impl EmbeddedFont {
    fn write_type0(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();

        let cid_ref = sc.new_ref();
        let descriptor_ref = sc.new_ref();
        let cmap_ref = sc.new_ref();
        let data_ref = sc.new_ref();

        let is_cff = self.info.is_cff;

        let subsetted = subsetter::subset(&self.data, self.index, &self.glyph_remapper)
            .map_err(|e| CapyError::Font(format!("failed to subset font: {e}")))?;

        let font_stream = {
            let mut data = subsetted.as_slice();

            // For CFF fonts, only the bare CFF program is embedded.
            let subsetted_ref = FontRef::new(data)
                .map_err(|_| CapyError::Font("failed to read font subset".to_string()))?;

            if let Some(cff) = subsetted_ref.data_for_tag(Cff::TAG) {
                data = cff.as_bytes();
            }

            FilterStreamBuilder::new_from_binary_data(data).finish(sc.serialize_settings())
        };

        let base_font = self.base_font_name();
        let base_font_type0 = if is_cff {
            format!("{base_font}-{IDENTITY_H}")
        } else {
            base_font.clone()
        };

        chunk
            .type0_font(root_ref)
            .base_font(Name(base_font_type0.as_bytes()))
            .encoding_predefined(Name(IDENTITY_H.as_bytes()))
            .descendant_font(cid_ref)
            .to_unicode(cmap_ref);

        let mut cid = chunk.cid_font(cid_ref);
        cid.subtype(if is_cff {
            CidFontType::Type0
        } else {
            CidFontType::Type2
        });
        cid.base_font(Name(base_font.as_bytes()));
        cid.system_info(SYSTEM_INFO);
        cid.font_descriptor(descriptor_ref);
        cid.default_width(0.0);

        if !is_cff {
            cid.cid_to_gid_map_predefined(Name(b"Identity"));
        }

        // CID fonts always use 1000 units per em.
        let to_pdf_units = |v: f32| v / self.info.units_per_em * 1000.0;

        let mut width_writer = cid.widths();
        let mut first = 0;
        while first < self.widths.len() {
            let width = self.widths[first];
            let mut end = first + 1;
            while end < self.widths.len() && self.widths[end] == width {
                end += 1;
            }

            if width != 0.0 {
                width_writer.same(first as u16, (end - 1) as u16, to_pdf_units(width));
            }

            first = end;
        }

        width_writer.finish();
        cid.finish();

        let mut flags = FontFlags::empty();
        flags.set(FontFlags::SERIF, self.name().contains("Serif"));
        flags.set(FontFlags::FIXED_PITCH, self.info.is_monospaced);
        flags.set(FontFlags::ITALIC, self.info.italic_angle != 0.0);
        flags.insert(FontFlags::SYMBOLIC);

        let ascender = to_pdf_units(self.info.ascent);
        let descender = to_pdf_units(self.info.descent);
        let cap_height = self
            .info
            .cap_height
            .map(to_pdf_units)
            .unwrap_or(ascender);
        let stem_v = 10.0 + 0.244 * (self.info.weight - 50.0);
        let bbox = Rect::from_ltrb(
            to_pdf_units(self.info.bbox.left()),
            to_pdf_units(self.info.bbox.top()),
            to_pdf_units(self.info.bbox.right()),
            to_pdf_units(self.info.bbox.bottom()),
        )
        .unwrap_or(self.info.bbox);

        let mut font_descriptor = chunk.font_descriptor(descriptor_ref);
        font_descriptor
            .name(Name(base_font.as_bytes()))
            .flags(flags)
            .bbox(bbox.to_pdf_rect())
            .italic_angle(self.info.italic_angle)
            .ascent(ascender)
            .descent(descender)
            .cap_height(cap_height)
            .stem_v(stem_v);

        if is_cff {
            font_descriptor.font_file3(data_ref);
        } else {
            font_descriptor.font_file2(data_ref);
        }

        font_descriptor.finish();

        let cmap = {
            let mut cmap = UnicodeCmap::new(CMAP_NAME, SYSTEM_INFO);

            for (cid, text) in &self.cmap_entries {
                cmap.pair_with_multiple(*cid, text.chars());
            }

            cmap
        };

        let cmap_stream = cmap.finish();
        let mut cmap = chunk.cmap(cmap_ref, &cmap_stream);
        cmap.writing_mode(WMode::Horizontal);
        cmap.finish();

        let mut stream = chunk.stream(data_ref, font_stream.encoded_data());
        font_stream.write_filters(stream.deref_mut());
        if is_cff {
            stream.pair(Name(b"Subtype"), Name(b"CIDFontType0C"));
        }

        stream.finish();

        Ok(chunk)
    }
}
