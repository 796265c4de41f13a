//! Raster images.
//!
//! Images are either given as raw 8-bit samples or loaded from PNG or JPEG data
//! (with the `raster-images` feature). JPEG data is embedded as-is with the
//! `DCTDecode` filter, everything else is stored deflated. An alpha channel is
//! split off and written as a soft mask image.

use std::ops::DerefMut;

use pdf_writer::{Chunk, Finish, Name, Ref};

use crate::chunk_container::ChunkContainerFn;
use crate::color::{DeviceColorSpace, IccProfile};
use crate::error::{CapyError, CapyResult};
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::FilterStreamBuilder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ImageData {
    /// Uncompressed samples, row by row.
    Raw(Vec<u8>),
    /// A complete JPEG file.
    Jpeg(Vec<u8>),
}

/// A decoded or raw raster image that has not been added to a document yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) color_space: DeviceColorSpace,
    pub(crate) bits_per_component: u8,
    pub(crate) data: ImageData,
    pub(crate) alpha: Option<Vec<u8>>,
    pub(crate) icc_profile: Option<Vec<u8>>,
    /// Adobe CMYK JPEGs store inverted values.
    pub(crate) invert_cmyk: bool,
}

fn row_len(width: u32, components: usize, bits_per_component: u8) -> usize {
    (width as usize * components * bits_per_component as usize).div_ceil(8)
}

impl RasterImage {
    /// Create an image from raw 8-bit samples in the given colorspace.
    pub fn new(
        width: u32,
        height: u32,
        color_space: DeviceColorSpace,
        pixels: Vec<u8>,
    ) -> CapyResult<Self> {
        if width == 0 || height == 0 {
            return Err(CapyError::invalid("Image dimensions must be positive."));
        }

        let expected = row_len(width, color_space.num_components(), 8) * height as usize;
        if pixels.len() != expected {
            return Err(CapyError::invalid(format!(
                "Image of size {width}x{height} needs {expected} bytes of pixels, got {}.",
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            color_space,
            bits_per_component: 8,
            data: ImageData::Raw(pixels),
            alpha: None,
            icc_profile: None,
            invert_cmyk: false,
        })
    }

    /// Attach an 8-bit alpha channel with one byte per pixel.
    pub fn with_alpha(mut self, alpha: Vec<u8>) -> CapyResult<Self> {
        let expected = self.width as usize * self.height as usize * self.bits_per_component as usize / 8;
        if alpha.len() != expected {
            return Err(CapyError::invalid(format!(
                "Alpha channel needs {expected} bytes, got {}.",
                alpha.len()
            )));
        }

        self.alpha = Some(alpha);
        Ok(self)
    }

    /// Attach the ICC profile the samples are in.
    pub fn with_icc_profile(mut self, profile: Vec<u8>) -> Self {
        self.icc_profile = Some(profile);
        self
    }

    /// The width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The colorspace of the samples.
    pub fn color_space(&self) -> DeviceColorSpace {
        self.color_space
    }

    /// The embedded ICC profile.
    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    /// Whether the image carries an ICC profile.
    pub fn has_profile(&self) -> bool {
        self.icc_profile.is_some()
    }

    /// Whether the image has an alpha channel.
    pub fn has_alpha(&self) -> bool {
        self.alpha.is_some()
    }

    /// The raw samples, or `None` for JPEG images.
    pub fn pixels(&self) -> Option<&[u8]> {
        match &self.data {
            ImageData::Raw(pixels) => Some(pixels),
            ImageData::Jpeg(_) => None,
        }
    }

    /// Load a PNG or JPEG image.
    #[cfg(feature = "raster-images")]
    pub fn from_data(data: &[u8]) -> CapyResult<Self> {
        const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
        const JPEG_SIGNATURE: &[u8] = b"\xff\xd8\xff";

        if data.starts_with(PNG_SIGNATURE) {
            decode::from_png(data)
        } else if data.starts_with(JPEG_SIGNATURE) {
            decode::from_jpeg(data)
        } else {
            Err(CapyError::Image("unsupported image format".to_string()))
        }
    }

    /// Convert the samples of the image into another colorspace.
    ///
    /// The ICC profile is dropped, since the new samples are no longer in it.
    pub fn convert(
        &self,
        target: DeviceColorSpace,
        converter: &dyn ColorConverter,
    ) -> CapyResult<Self> {
        let pixels = self.pixels().ok_or_else(|| {
            CapyError::invalid("JPEG images can't be converted without decoding them.")
        })?;

        if self.bits_per_component != 8 {
            return Err(CapyError::invalid("Only 8-bit images can be converted."));
        }

        let converted = converter.convert(
            pixels,
            self.color_space,
            self.icc_profile.as_deref(),
            target,
        )?;

        let mut image = RasterImage::new(self.width, self.height, target, converted)?;
        image.alpha = self.alpha.clone();

        Ok(image)
    }
}

/// Converts pixels between colorspaces, e.g. with a color management system.
pub trait ColorConverter {
    /// Convert 8-bit samples. The result must have one sample per component of
    /// `to` for every pixel of the input.
    fn convert(
        &self,
        pixels: &[u8],
        from: DeviceColorSpace,
        profile: Option<&[u8]>,
        to: DeviceColorSpace,
    ) -> CapyResult<Vec<u8>>;
}

/// Converts pixels with the uncalibrated formulas of the PDF reference.
#[derive(Debug, Copy, Clone, Default)]
pub struct DeviceConverter;

impl ColorConverter for DeviceConverter {
    fn convert(
        &self,
        pixels: &[u8],
        from: DeviceColorSpace,
        _: Option<&[u8]>,
        to: DeviceColorSpace,
    ) -> CapyResult<Vec<u8>> {
        let mut out = Vec::with_capacity(pixels.len() / from.num_components() * to.num_components());

        for pixel in pixels.chunks_exact(from.num_components()) {
            let rgb = match from {
                DeviceColorSpace::Gray => [pixel[0]; 3],
                DeviceColorSpace::Rgb => [pixel[0], pixel[1], pixel[2]],
                DeviceColorSpace::Cmyk => {
                    let k = pixel[3] as u16;
                    let channel = |c: u8| (255 - (c as u16 + k).min(255)) as u8;
                    [channel(pixel[0]), channel(pixel[1]), channel(pixel[2])]
                }
            };

            match to {
                DeviceColorSpace::Gray => {
                    let [r, g, b] = rgb.map(|c| c as f32);
                    out.push((0.3 * r + 0.59 * g + 0.11 * b).round() as u8);
                }
                DeviceColorSpace::Rgb => out.extend(rgb),
                DeviceColorSpace::Cmyk => {
                    let [c, m, y] = rgb.map(|v| 255 - v);
                    let k = c.min(m).min(y);
                    out.extend([c - k, m - k, y - k, k]);
                }
            }
        }

        Ok(out)
    }
}

/// How an image is drawn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ImageProperties {
    /// Ask viewers to smooth the image when scaling it up.
    pub interpolate: bool,
    /// Use a grayscale image as a stencil mask, painted with the current fill color
    /// wherever a sample is dark.
    pub as_mask: bool,
}

/// An image that has been added to a document.
#[derive(Debug, Clone)]
pub(crate) struct ImageRecord {
    pub(crate) image: RasterImage,
    pub(crate) properties: ImageProperties,
    pub(crate) icc: Option<IccProfile>,
}

impl ImageRecord {
    pub(crate) fn new(image: RasterImage, properties: ImageProperties) -> CapyResult<Self> {
        if properties.as_mask {
            if image.color_space != DeviceColorSpace::Gray {
                return Err(CapyError::invalid("Only grayscale images can be used as masks."));
            }

            if image.pixels().is_none() {
                return Err(CapyError::invalid("JPEG images can't be used as masks."));
            }
        }

        let icc = image.icc_profile.as_deref().and_then(|data| {
            match IccProfile::new(data) {
                Ok(profile) if profile.num_components() == image.color_space.num_components() => {
                    Some(profile)
                }
                Ok(_) => {
                    log::warn!("ignoring ICC profile of image with a different number of channels");
                    None
                }
                Err(e) => {
                    log::warn!("ignoring ICC profile of image: {e}");
                    None
                }
            }
        });

        Ok(Self {
            image,
            properties,
            icc,
        })
    }

    /// Pack 8-bit gray samples into a 1-bit stencil, row by row.
    fn stencil_data(&self) -> Vec<u8> {
        let width = self.image.width as usize;
        let pixels = self.image.pixels().unwrap_or_default();
        let mut packed = Vec::with_capacity(row_len(self.image.width, 1, 1) * self.image.height as usize);

        for row in pixels.chunks_exact(width) {
            for byte in row.chunks(8) {
                let mut bits = 0u8;
                for (i, sample) in byte.iter().enumerate() {
                    // A zero sample paints, so light pixels set the bit.
                    if *sample >= 128 {
                        bits |= 0x80 >> i;
                    }
                }
                packed.push(bits);
            }
        }

        packed
    }
}

impl Serialize for ImageRecord {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.images
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();
        let image = &self.image;
        let settings = sc.serialize_settings().clone();

        if self.properties.as_mask {
            let data = self.stencil_data();
            let stream = FilterStreamBuilder::new_from_binary_data(&data).finish(&settings);
            let mut mask = chunk.image_xobject(root_ref, stream.encoded_data());
            stream.write_filters(mask.deref_mut().deref_mut());
            mask.width(image.width as i32);
            mask.height(image.height as i32);
            mask.image_mask(true);
            mask.bits_per_component(1);
            if self.properties.interpolate {
                mask.interpolate(true);
            }
            mask.finish();

            return Ok(chunk);
        }

        let soft_mask = match &image.alpha {
            Some(alpha) => {
                let soft_mask_ref = sc.new_ref();
                let mask_stream = FilterStreamBuilder::new_from_binary_data(alpha).finish(&settings);
                let mut s_mask = chunk.image_xobject(soft_mask_ref, mask_stream.encoded_data());
                mask_stream.write_filters(s_mask.deref_mut().deref_mut());
                s_mask.width(image.width as i32);
                s_mask.height(image.height as i32);
                // Soft masks are always in DeviceGray.
                s_mask.pair(Name(b"ColorSpace"), DeviceColorSpace::Gray.to_pdf_name());
                s_mask.bits_per_component(image.bits_per_component as i32);
                s_mask.finish();
                Some(soft_mask_ref)
            }
            None => None,
        };

        let icc_ref = self.icc.as_ref().map(|profile| {
            let color_space_ref = sc.new_ref();
            let stream_ref = profile.write_stream(sc, &mut chunk);
            let mut array = chunk.indirect(color_space_ref).array();
            array.item(Name(b"ICCBased"));
            array.item(stream_ref);
            array.finish();
            color_space_ref
        });

        let image_stream = match &image.data {
            ImageData::Raw(pixels) => FilterStreamBuilder::new_from_binary_data(pixels),
            ImageData::Jpeg(data) => FilterStreamBuilder::new_from_jpeg_data(data),
        }
        .finish(&settings);

        let mut image_x_object = chunk.image_xobject(root_ref, image_stream.encoded_data());
        image_stream.write_filters(image_x_object.deref_mut().deref_mut());
        image_x_object.width(image.width as i32);
        image_x_object.height(image.height as i32);

        match icc_ref {
            Some(icc_ref) => image_x_object.pair(Name(b"ColorSpace"), icc_ref),
            None => image_x_object.pair(Name(b"ColorSpace"), image.color_space.to_pdf_name()),
        };

        if image.invert_cmyk {
            image_x_object.decode([1.0, 0.0].repeat(image.color_space.num_components()));
        }

        image_x_object.bits_per_component(image.bits_per_component as i32);

        if self.properties.interpolate {
            image_x_object.interpolate(true);
        }

        if let Some(soft_mask_ref) = soft_mask {
            image_x_object.s_mask(soft_mask_ref);
        }

        image_x_object.finish();

        Ok(chunk)
    }
}

#[cfg(feature = "raster-images")]
mod decode {
    use zune_jpeg::JpegDecoder;
    use zune_png::zune_core::colorspace::ColorSpace;
    use zune_png::zune_core::result::DecodingResult;
    use zune_png::PngDecoder;

    use super::{ImageData, RasterImage};
    use crate::color::DeviceColorSpace;
    use crate::error::{CapyError, CapyResult};

    fn image_error(what: impl std::fmt::Display) -> CapyError {
        CapyError::Image(what.to_string())
    }

    fn device_color_space(color_space: ColorSpace) -> CapyResult<DeviceColorSpace> {
        match color_space {
            ColorSpace::RGB | ColorSpace::RGBA | ColorSpace::YCbCr => Ok(DeviceColorSpace::Rgb),
            ColorSpace::Luma | ColorSpace::LumaA => Ok(DeviceColorSpace::Gray),
            ColorSpace::CMYK | ColorSpace::YCCK => Ok(DeviceColorSpace::Cmyk),
            other => Err(image_error(format!("unsupported colorspace {other:?}"))),
        }
    }

    /// Split interleaved samples into color and alpha samples.
    fn split_alpha<T: Copy>(data: &[T], color_space: ColorSpace) -> (Vec<T>, Option<Vec<T>>) {
        if !color_space.has_alpha() {
            return (data.to_vec(), None);
        }

        let stride = color_space.num_components();
        let mut color = Vec::with_capacity(data.len() / stride * (stride - 1));
        let mut alpha = Vec::with_capacity(data.len() / stride);

        for pixel in data.chunks_exact(stride) {
            color.extend_from_slice(&pixel[..stride - 1]);
            alpha.push(pixel[stride - 1]);
        }

        (color, Some(alpha))
    }

    fn to_be_bytes(data: Vec<u16>) -> Vec<u8> {
        data.into_iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    pub(super) fn from_png(data: &[u8]) -> CapyResult<RasterImage> {
        let mut decoder = PngDecoder::new(data);
        decoder.decode_headers().map_err(|e| image_error(format!("{e:?}")))?;

        let png_color_space = decoder
            .get_colorspace()
            .ok_or_else(|| image_error("PNG has no colorspace"))?;
        let color_space = device_color_space(png_color_space)?;

        let (width, height, icc_profile) = {
            let info = decoder
                .get_info()
                .ok_or_else(|| image_error("PNG has no header"))?;
            (info.width as u32, info.height as u32, info.icc_profile.clone())
        };

        let decoded = decoder.decode().map_err(|e| image_error(format!("{e:?}")))?;

        let (pixels, alpha, bits_per_component) = match decoded {
            DecodingResult::U8(data) => {
                let (color, alpha) = split_alpha(&data, png_color_space);
                (color, alpha, 8)
            }
            DecodingResult::U16(data) => {
                let (color, alpha) = split_alpha(&data, png_color_space);
                (to_be_bytes(color), alpha.map(to_be_bytes), 16)
            }
            _ => return Err(image_error("unsupported PNG sample format")),
        };

        Ok(RasterImage {
            width,
            height,
            color_space,
            bits_per_component,
            data: ImageData::Raw(pixels),
            alpha,
            icc_profile,
            invert_cmyk: false,
        })
    }

    pub(super) fn from_jpeg(data: &[u8]) -> CapyResult<RasterImage> {
        let mut decoder = JpegDecoder::new(data);
        decoder.decode_headers().map_err(|e| image_error(format!("{e:?}")))?;

        let (width, height) = decoder
            .dimensions()
            .ok_or_else(|| image_error("JPEG has no dimensions"))?;
        let input_color_space = decoder
            .get_input_colorspace()
            .ok_or_else(|| image_error("JPEG has no colorspace"))?;

        Ok(RasterImage {
            width: width as u32,
            height: height as u32,
            color_space: device_color_space(input_color_space)?,
            bits_per_component: 8,
            data: ImageData::Jpeg(data.to_vec()),
            alpha: None,
            icc_profile: decoder.icc_profile(),
            invert_cmyk: matches!(input_color_space, ColorSpace::YCCK | ColorSpace::CMYK),
        })
    }
}
