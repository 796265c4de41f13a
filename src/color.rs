//! Colors and colorspaces.
//!
//! Device colors only consist of their components and can be used directly.
//! All other colorspaces are objects of their own that need to be registered with
//! the document first. An [`IccColor`] can only be created through
//! [`Document::icc_color`], which checks that the number of components matches the
//! profile.
//!
//! [`Document::icc_color`]: crate::document::Document::icc_color

use float_cmp::approx_eq;
use pdf_writer::{Chunk, Finish, Name, Obj, Ref};

use crate::chunk_container::ChunkContainerFn;
use crate::error::{CapyError, CapyResult};
use crate::handle::{
    DocumentId, FunctionId, Handle, IccColorSpaceId, LabColorSpaceId, PatternId, SeparationId,
};
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::{deflate_encode, FilterStreamBuilder};
use crate::util::{check_finite, check_unit_range};

pub(crate) const DEVICE_GRAY: &[u8] = b"DeviceGray";
pub(crate) const DEVICE_RGB: &[u8] = b"DeviceRGB";
pub(crate) const DEVICE_CMYK: &[u8] = b"DeviceCMYK";

/// A device-dependent colorspace.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeviceColorSpace {
    /// DeviceGray.
    Gray,
    /// DeviceRGB.
    Rgb,
    /// DeviceCMYK.
    Cmyk,
}

impl DeviceColorSpace {
    /// The number of color components.
    pub fn num_components(&self) -> usize {
        match self {
            DeviceColorSpace::Gray => 1,
            DeviceColorSpace::Rgb => 3,
            DeviceColorSpace::Cmyk => 4,
        }
    }

    pub(crate) fn to_pdf_name(self) -> Name<'static> {
        match self {
            DeviceColorSpace::Gray => Name(DEVICE_GRAY),
            DeviceColorSpace::Rgb => Name(DEVICE_RGB),
            DeviceColorSpace::Cmyk => Name(DEVICE_CMYK),
        }
    }
}

/// Any colorspace a color can be in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// A device colorspace.
    Device(DeviceColorSpace),
    /// An ICC-based colorspace.
    Icc(IccColorSpaceId),
    /// A Lab colorspace.
    Lab(LabColorSpaceId),
    /// A separation.
    Separation(SeparationId),
    /// The pattern colorspace.
    Pattern,
}

impl ColorSpace {
    pub(crate) fn check_document(&self, document: DocumentId) -> CapyResult<()> {
        match self {
            ColorSpace::Device(_) | ColorSpace::Pattern => Ok(()),
            ColorSpace::Icc(id) => id.check(document),
            ColorSpace::Lab(id) => id.check(document),
            ColorSpace::Separation(id) => id.check(document),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            ColorSpace::Device(DeviceColorSpace::Gray) => "DeviceGray",
            ColorSpace::Device(DeviceColorSpace::Rgb) => "DeviceRGB",
            ColorSpace::Device(DeviceColorSpace::Cmyk) => "DeviceCMYK",
            ColorSpace::Icc(_) => "ICCBased",
            ColorSpace::Lab(_) => "Lab",
            ColorSpace::Separation(_) => "Separation",
            ColorSpace::Pattern => "Pattern",
        }
    }

    /// Write the colorspace as a direct name or a reference to the colorspace object.
    pub(crate) fn write(&self, sc: &SerializeContext, obj: Obj) -> CapyResult<()> {
        match self {
            ColorSpace::Device(d) => obj.primitive(d.to_pdf_name()),
            ColorSpace::Icc(id) => obj.primitive(sc.refs.icc_color_spaces.get(*id)?),
            ColorSpace::Lab(id) => obj.primitive(sc.refs.lab_color_spaces.get(*id)?),
            ColorSpace::Separation(id) => obj.primitive(sc.refs.separations.get(*id)?),
            ColorSpace::Pattern => obj.primitive(Name(b"Pattern")),
        }

        Ok(())
    }
}

impl From<DeviceColorSpace> for ColorSpace {
    fn from(value: DeviceColorSpace) -> Self {
        ColorSpace::Device(value)
    }
}

/// A color in an ICC-based colorspace.
#[derive(Debug, Clone, PartialEq)]
pub struct IccColor {
    pub(crate) color_space: IccColorSpaceId,
    pub(crate) components: Vec<f32>,
}

/// A color.
#[derive(Debug, Clone, PartialEq)]
pub enum Color {
    /// A gray value between 0 (black) and 1 (white).
    Gray(f32),
    /// An RGB color.
    Rgb(f32, f32, f32),
    /// A CMYK color.
    Cmyk(f32, f32, f32, f32),
    /// A color in an ICC-based colorspace.
    Icc(IccColor),
    /// A Lab color with L*, a* and b* values.
    Lab(LabColorSpaceId, f32, f32, f32),
    /// A tint of a separation between 0 (no ink) and 1 (full ink).
    Separation(SeparationId, f32),
    /// A tiling or shading pattern.
    Pattern(PatternId),
}

impl Color {
    /// Convert an RGB or CMYK color to the output colorspace with the uncalibrated
    /// formulas of the PDF reference. Gray and non-device colors are kept.
    pub(crate) fn to_output(&self, output: DeviceColorSpace) -> Color {
        let rgb = match *self {
            Color::Rgb(r, g, b) => [r, g, b],
            Color::Cmyk(c, m, y, k) => [c, m, y].map(|v| 1.0 - (v + k).min(1.0)),
            _ => return self.clone(),
        };

        match (self, output) {
            (Color::Rgb(..), DeviceColorSpace::Rgb) | (Color::Cmyk(..), DeviceColorSpace::Cmyk) => {
                self.clone()
            }
            (_, DeviceColorSpace::Rgb) => Color::Rgb(rgb[0], rgb[1], rgb[2]),
            (_, DeviceColorSpace::Gray) => {
                Color::Gray(0.3 * rgb[0] + 0.59 * rgb[1] + 0.11 * rgb[2])
            }
            (_, DeviceColorSpace::Cmyk) => {
                let [c, m, y] = rgb.map(|v| 1.0 - v);
                let k = c.min(m).min(y);
                Color::Cmyk(c - k, m - k, y - k, k)
            }
        }
    }

    /// The colorspace of the color.
    pub fn color_space(&self) -> ColorSpace {
        match self {
            Color::Gray(_) => ColorSpace::Device(DeviceColorSpace::Gray),
            Color::Rgb(..) => ColorSpace::Device(DeviceColorSpace::Rgb),
            Color::Cmyk(..) => ColorSpace::Device(DeviceColorSpace::Cmyk),
            Color::Icc(c) => ColorSpace::Icc(c.color_space),
            Color::Lab(id, ..) => ColorSpace::Lab(*id),
            Color::Separation(id, _) => ColorSpace::Separation(*id),
            Color::Pattern(_) => ColorSpace::Pattern,
        }
    }

    /// The numeric components of the color. Empty for patterns.
    pub fn components(&self) -> Vec<f32> {
        match self {
            Color::Gray(g) => vec![*g],
            Color::Rgb(r, g, b) => vec![*r, *g, *b],
            Color::Cmyk(c, m, y, k) => vec![*c, *m, *y, *k],
            Color::Icc(c) => c.components.clone(),
            Color::Lab(_, l, a, b) => vec![*l, *a, *b],
            Color::Separation(_, t) => vec![*t],
            Color::Pattern(_) => vec![],
        }
    }

    /// Check that the components are in range and that all referenced objects
    /// belong to the given document.
    pub(crate) fn validate(&self, document: DocumentId) -> CapyResult<()> {
        self.validate_values()?;

        match self {
            Color::Gray(_) | Color::Rgb(..) | Color::Cmyk(..) => Ok(()),
            Color::Icc(c) => c.color_space.check(document),
            Color::Lab(id, ..) => id.check(document),
            Color::Separation(id, _) => id.check(document),
            Color::Pattern(id) => id.check(document),
        }
    }

    /// Check the components only, without looking at the handles.
    pub(crate) fn validate_values(&self) -> CapyResult<()> {
        let components = self.components();
        check_finite(&components, "color component")?;

        match self {
            Color::Gray(_) | Color::Rgb(..) | Color::Cmyk(..) => {
                check_unit_range(&components, "Device color components")
            }
            Color::Lab(_, l, ..) if !(0.0..=100.0).contains(l) => {
                Err(CapyError::invalid("Lab L* must be in the range [0, 100]."))
            }
            Color::Separation(..) => check_unit_range(&components, "Separation tint"),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Hash, Debug, Eq, PartialEq)]
pub(crate) enum ICCColorSpace {
    Xyz,
    Lab,
    Luv,
    Ycbr,
    Yxy,
    Rgb,
    Gray,
    Hsv,
    Hls,
    Cmyk,
    Cmy,
}

impl ICCColorSpace {
    pub(crate) fn num_components(&self) -> usize {
        match self {
            ICCColorSpace::Gray => 1,
            ICCColorSpace::Cmyk => 4,
            _ => 3,
        }
    }
}

impl TryFrom<u32> for ICCColorSpace {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x58595A20 => Ok(ICCColorSpace::Xyz),
            0x4C616220 => Ok(ICCColorSpace::Lab),
            0x4C757620 => Ok(ICCColorSpace::Luv),
            0x59436272 => Ok(ICCColorSpace::Ycbr),
            0x59787920 => Ok(ICCColorSpace::Yxy),
            0x52474220 => Ok(ICCColorSpace::Rgb),
            0x47524159 => Ok(ICCColorSpace::Gray),
            0x48535620 => Ok(ICCColorSpace::Hsv),
            0x484C5320 => Ok(ICCColorSpace::Hls),
            0x434D594B => Ok(ICCColorSpace::Cmyk),
            0x434D5920 => Ok(ICCColorSpace::Cmy),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Hash, Debug, Eq, PartialEq)]
pub(crate) struct ICCMetadata {
    pub(crate) major: u8,
    pub(crate) minor: u8,
    pub(crate) color_space: ICCColorSpace,
}

impl ICCMetadata {
    pub(crate) fn from_data(data: &[u8]) -> Option<Self> {
        let major = *data.get(8)?;
        let minor = *data.get(9)? >> 4;
        let color_space = {
            let marker = u32::from_be_bytes(data.get(16..20)?.try_into().ok()?);
            ICCColorSpace::try_from(marker).ok()?
        };
        Some(Self {
            major,
            minor,
            color_space,
        })
    }
}

/// An ICC profile, stored deflated.
#[derive(Debug, Clone)]
pub(crate) struct IccProfile {
    data: Vec<u8>,
    metadata: ICCMetadata,
}

impl IccProfile {
    pub(crate) fn new(data: &[u8]) -> CapyResult<Self> {
        let metadata = ICCMetadata::from_data(data).ok_or_else(|| {
            CapyError::IccProfile("could not read the profile header".to_string())
        })?;

        log::debug!(
            "loaded ICC profile v{}.{} with {} channels",
            metadata.major,
            metadata.minor,
            metadata.color_space.num_components()
        );

        Ok(Self {
            data: deflate_encode(data),
            metadata,
        })
    }

    pub(crate) fn num_components(&self) -> usize {
        self.metadata.color_space.num_components()
    }

    /// Write the profile stream and return its reference.
    pub(crate) fn write_stream(&self, sc: &mut SerializeContext, chunk: &mut Chunk) -> Ref {
        let icc_ref = sc.new_ref();
        let icc_stream =
            FilterStreamBuilder::new_from_deflated(&self.data).finish(sc.serialize_settings());

        let mut icc_profile = chunk.icc_profile(icc_ref, icc_stream.encoded_data());
        icc_profile
            .n(self.num_components() as i32)
            .range([0.0, 1.0].repeat(self.num_components()));
        icc_stream.write_filters(&mut icc_profile);
        icc_profile.finish();

        icc_ref
    }
}

impl Serialize for IccProfile {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.color_spaces
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();
        let icc_ref = self.write_stream(sc, &mut chunk);

        let mut array = chunk.indirect(root_ref).array();
        array.item(Name(b"ICCBased"));
        array.item(icc_ref);
        array.finish();

        Ok(chunk)
    }
}

/// A CIE L*a*b* colorspace.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LabColorSpace {
    /// The X component of the diffuse white point.
    pub xw: f32,
    /// The Y component of the diffuse white point. Must be 1.
    pub yw: f32,
    /// The Z component of the diffuse white point.
    pub zw: f32,
    /// The minimum a* value.
    pub amin: f32,
    /// The maximum a* value.
    pub amax: f32,
    /// The minimum b* value.
    pub bmin: f32,
    /// The maximum b* value.
    pub bmax: f32,
}

impl LabColorSpace {
    /// The Lab colorspace with a D65 white point.
    pub fn d65() -> Self {
        Self {
            xw: 0.9505,
            yw: 1.0,
            zw: 1.089,
            amin: -128.0,
            amax: 127.0,
            bmin: -128.0,
            bmax: 127.0,
        }
    }

    pub(crate) fn validate(&self) -> CapyResult<()> {
        check_finite(
            &[
                self.xw, self.yw, self.zw, self.amin, self.amax, self.bmin, self.bmax,
            ],
            "Lab parameter",
        )?;

        if self.xw <= 0.0 || self.zw <= 0.0 || !approx_eq!(f32, self.yw, 1.0, ulps = 4) {
            return Err(CapyError::invalid(
                "Lab white point must be positive with Y equal to 1.",
            ));
        }

        if self.amin > self.amax || self.bmin > self.bmax {
            return Err(CapyError::invalid("Lab range minimum exceeds maximum."));
        }

        Ok(())
    }
}

impl Serialize for LabColorSpace {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.color_spaces
    }

    fn serialize(&self, _: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();

        let mut array = chunk.indirect(root_ref).array();
        array.item(Name(b"Lab"));
        let mut dict = array.push().dict();
        dict.insert(Name(b"WhitePoint"))
            .array()
            .items([self.xw, self.yw, self.zw]);
        dict.insert(Name(b"Range"))
            .array()
            .items([self.amin, self.amax, self.bmin, self.bmax]);
        dict.finish();
        array.finish();

        Ok(chunk)
    }
}

/// A separation colorspace, i.e. a single colorant like a spot color.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Separation {
    pub(crate) name: String,
    pub(crate) alternate: DeviceColorSpace,
    pub(crate) tint_transform: FunctionId,
}

impl Serialize for Separation {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.color_spaces
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();
        let function_ref = sc.refs.functions.get(self.tint_transform)?;

        let mut array = chunk.indirect(root_ref).array();
        array.item(Name(b"Separation"));
        array.item(Name(self.name.as_bytes()));
        array.item(self.alternate.to_pdf_name());
        array.item(function_ref);
        array.finish();

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_colors_follow_the_output_colorspace() {
        let red = Color::Rgb(1.0, 0.0, 0.0);
        assert_eq!(red.to_output(DeviceColorSpace::Rgb), red);
        assert_eq!(red.to_output(DeviceColorSpace::Gray), Color::Gray(0.3));
        assert_eq!(
            red.to_output(DeviceColorSpace::Cmyk),
            Color::Cmyk(0.0, 1.0, 1.0, 0.0)
        );

        let black = Color::Cmyk(0.0, 0.0, 0.0, 1.0);
        assert_eq!(black.to_output(DeviceColorSpace::Cmyk), black);
        assert_eq!(
            black.to_output(DeviceColorSpace::Rgb),
            Color::Rgb(0.0, 0.0, 0.0)
        );
        assert_eq!(black.to_output(DeviceColorSpace::Gray), Color::Gray(0.0));

        let gray = Color::Gray(0.5);
        assert_eq!(gray.to_output(DeviceColorSpace::Cmyk), gray);
    }

    fn profile_header(signature: &[u8; 4]) -> Vec<u8> {
        let mut data = vec![0; 128];
        data[8] = 4;
        data[9] = 0x30;
        data[16..20].copy_from_slice(signature);
        data
    }

    #[test]
    fn icc_channel_count_comes_from_header() {
        let cmyk = IccProfile::new(&profile_header(b"CMYK")).unwrap();
        assert_eq!(cmyk.num_components(), 4);
        assert_eq!(cmyk.metadata.major, 4);
        assert_eq!(cmyk.metadata.minor, 3);

        let gray = IccProfile::new(&profile_header(b"GRAY")).unwrap();
        assert_eq!(gray.num_components(), 1);
    }

    #[test]
    fn truncated_icc_profile_is_rejected() {
        assert!(matches!(
            IccProfile::new(&[0; 10]),
            Err(CapyError::IccProfile(_))
        ));
    }

    #[test]
    fn device_colors_are_range_checked() {
        let doc = DocumentId::fresh();
        assert!(Color::Rgb(0.0, 0.5, 1.0).validate(doc).is_ok());
        assert!(matches!(
            Color::Cmyk(0.0, 0.0, 1.2, 0.0).validate(doc),
            Err(CapyError::InvalidArgument(_))
        ));
        assert!(Color::Gray(f32::NAN).validate(doc).is_err());
    }

    #[test]
    fn lab_d65_is_valid() {
        assert!(LabColorSpace::d65().validate().is_ok());

        let broken = LabColorSpace {
            amin: 10.0,
            amax: -10.0,
            ..LabColorSpace::d65()
        };
        assert!(broken.validate().is_err());
    }

    #[test]
    fn colors_report_their_colorspace() {
        assert_eq!(
            Color::Cmyk(0.1, 0.2, 0.3, 0.4).color_space(),
            ColorSpace::Device(DeviceColorSpace::Cmyk)
        );
        assert_eq!(Color::Gray(0.5).components(), vec![0.5]);
    }
}
