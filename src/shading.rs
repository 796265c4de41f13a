//! Shadings, i.e. smooth color transitions.
//!
//! Function-based, axial and radial shadings get their colors from a function,
//! whose number of outputs must match the number of components of the colorspace.
//! Mesh shadings list their colors explicitly per vertex instead. Each vertex color
//! must be in the colorspace of the mesh.

use std::ops::DerefMut;

use pdf_writer::types::FunctionShadingType;
use pdf_writer::{Chunk, Finish, Name, Ref};

use crate::chunk_container::ChunkContainerFn;
use crate::color::{Color, ColorSpace};
use crate::error::{CapyError, CapyResult};
use crate::geom::{Transform, TransformExt};
use crate::handle::FunctionId;
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::FilterStreamBuilder;
use crate::util::check_finite;

/// A function-based shading (type 1), where the color at every point of the
/// domain is computed by a two-input function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionShading {
    /// The colorspace of the function outputs.
    pub color_space: ColorSpace,
    /// The rectangular domain `[x0 x1 y0 y1]`.
    pub domain: [f32; 4],
    /// Maps the domain into the shading space.
    pub matrix: Option<Transform>,
    /// The color function.
    pub function: FunctionId,
}

/// An axial shading (type 2) along the line from `(x0, y0)` to `(x1, y1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AxialShading {
    /// The colorspace of the function outputs.
    pub color_space: ColorSpace,
    /// The coordinates `[x0 y0 x1 y1]`.
    pub coords: [f32; 4],
    /// The color function.
    pub function: FunctionId,
    /// Whether to extend the shading beyond the start and end point.
    pub extend: Option<[bool; 2]>,
    /// The parametric domain of the function.
    pub domain: Option<[f32; 2]>,
}

impl AxialShading {
    /// Create a new axial shading without extension.
    pub fn new(color_space: impl Into<ColorSpace>, coords: [f32; 4], function: FunctionId) -> Self {
        Self {
            color_space: color_space.into(),
            coords,
            function,
            extend: None,
            domain: None,
        }
    }

    /// Extend the shading beyond its start and end point.
    pub fn set_extend(&mut self, start: bool, end: bool) {
        self.extend = Some([start, end]);
    }

    /// Set the parametric domain of the function.
    pub fn set_domain(&mut self, start: f32, end: f32) {
        self.domain = Some([start, end]);
    }
}

/// A radial shading (type 3) between two circles.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialShading {
    /// The colorspace of the function outputs.
    pub color_space: ColorSpace,
    /// The coordinates `[x0 y0 r0 x1 y1 r1]`.
    pub coords: [f32; 6],
    /// The color function.
    pub function: FunctionId,
    /// Whether to extend the shading beyond the start and end circle.
    pub extend: Option<[bool; 2]>,
    /// The parametric domain of the function.
    pub domain: Option<[f32; 2]>,
}

impl RadialShading {
    /// Create a new radial shading without extension.
    pub fn new(color_space: impl Into<ColorSpace>, coords: [f32; 6], function: FunctionId) -> Self {
        Self {
            color_space: color_space.into(),
            coords,
            function,
            extend: None,
            domain: None,
        }
    }

    /// Extend the shading beyond its start and end circle.
    pub fn set_extend(&mut self, start: bool, end: bool) {
        self.extend = Some([start, end]);
    }

    /// Set the parametric domain of the function.
    pub fn set_domain(&mut self, start: f32, end: f32) {
        self.domain = Some([start, end]);
    }
}

#[derive(Debug, Clone, PartialEq)]
struct MeshElement {
    flag: u8,
    coords: Vec<f32>,
    colors: Vec<Color>,
}

fn check_mesh_input(
    color_space: ColorSpace,
    coords: &[f32],
    colors: &[Color],
    num_coords: usize,
    num_colors: usize,
) -> CapyResult<()> {
    if coords.len() != num_coords {
        return Err(CapyError::invalid(format!(
            "Expected {num_coords} coordinates, got {}.",
            coords.len()
        )));
    }

    if colors.len() != num_colors {
        return Err(CapyError::invalid(format!(
            "Expected {num_colors} colors, got {}.",
            colors.len()
        )));
    }

    check_finite(coords, "mesh coordinate")?;

    if let Some(color) = colors.iter().find(|c| c.color_space() != color_space) {
        return Err(CapyError::ColorSpaceMismatch(format!(
            "mesh is {} but color is {}.",
            color_space.kind(),
            color.color_space().kind()
        )));
    }

    Ok(())
}

/// A free-form triangle mesh shading (type 4).
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    color_space: ColorSpace,
    elements: Vec<MeshElement>,
}

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new(color_space: impl Into<ColorSpace>) -> Self {
        Self {
            color_space: color_space.into(),
            elements: vec![],
        }
    }

    /// Add a new, unconnected triangle.
    ///
    /// Expects 6 coordinates (three `x, y` pairs) and one color per vertex.
    pub fn add_triangle(&mut self, coords: &[f32], colors: &[Color]) -> CapyResult<()> {
        check_mesh_input(self.color_space, coords, colors, 6, 3)?;

        for (point, color) in coords.chunks_exact(2).zip(colors) {
            self.elements.push(MeshElement {
                flag: 0,
                coords: point.to_vec(),
                colors: vec![color.clone()],
            });
        }

        Ok(())
    }

    /// Add a triangle that shares an edge with the previous one.
    ///
    /// With flag 1 the new vertex forms a triangle with the last two vertices, with
    /// flag 2 it uses the first and last vertex of the previous triangle.
    pub fn extend_triangle(&mut self, flag: u8, coords: &[f32], colors: &[Color]) -> CapyResult<()> {
        if !matches!(flag, 1 | 2) {
            return Err(CapyError::invalid(format!(
                "Triangle extension flag must be 1 or 2, got {flag}."
            )));
        }

        if self.elements.is_empty() {
            return Err(CapyError::invalid("No triangle to extend."));
        }

        check_mesh_input(self.color_space, coords, colors, 2, 1)?;
        self.elements.push(MeshElement {
            flag,
            coords: coords.to_vec(),
            colors: colors.to_vec(),
        });

        Ok(())
    }

    /// The number of vertices in the mesh.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the mesh has no vertices.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// A Coons patch mesh shading (type 6).
#[derive(Debug, Clone, PartialEq)]
pub struct PatchMesh {
    color_space: ColorSpace,
    elements: Vec<MeshElement>,
}

impl PatchMesh {
    /// Create an empty mesh.
    pub fn new(color_space: impl Into<ColorSpace>) -> Self {
        Self {
            color_space: color_space.into(),
            elements: vec![],
        }
    }

    /// Add a new, unconnected patch.
    ///
    /// Expects 24 coordinates (the twelve control points of the boundary) and the
    /// colors of the four corners.
    pub fn add_patch(&mut self, coords: &[f32], colors: &[Color]) -> CapyResult<()> {
        check_mesh_input(self.color_space, coords, colors, 24, 4)?;
        self.elements.push(MeshElement {
            flag: 0,
            coords: coords.to_vec(),
            colors: colors.to_vec(),
        });

        Ok(())
    }

    /// Add a patch that shares an edge with the previous one.
    ///
    /// Expects 16 coordinates (the eight new control points) and the colors of the
    /// two new corners. The flag (1, 2 or 3) selects the shared edge.
    pub fn extend_patch(&mut self, flag: u8, coords: &[f32], colors: &[Color]) -> CapyResult<()> {
        if !matches!(flag, 1..=3) {
            return Err(CapyError::invalid(format!(
                "Patch extension flag must be 1, 2 or 3, got {flag}."
            )));
        }

        if self.elements.is_empty() {
            return Err(CapyError::invalid("No patch to extend."));
        }

        check_mesh_input(self.color_space, coords, colors, 16, 2)?;
        self.elements.push(MeshElement {
            flag,
            coords: coords.to_vec(),
            colors: colors.to_vec(),
        });

        Ok(())
    }

    /// The number of patches in the mesh.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the mesh has no patches.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// A shading.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Shading {
    Function(FunctionShading),
    Axial(AxialShading),
    Radial(RadialShading),
    TriangleMesh(TriangleMesh),
    PatchMesh(PatchMesh),
}

impl Shading {
    pub(crate) fn color_space(&self) -> ColorSpace {
        match self {
            Shading::Function(s) => s.color_space,
            Shading::Axial(s) => s.color_space,
            Shading::Radial(s) => s.color_space,
            Shading::TriangleMesh(s) => s.color_space,
            Shading::PatchMesh(s) => s.color_space,
        }
    }

    /// The function and the number of inputs it must take.
    pub(crate) fn function(&self) -> Option<(FunctionId, usize)> {
        match self {
            Shading::Function(s) => Some((s.function, 2)),
            Shading::Axial(s) => Some((s.function, 1)),
            Shading::Radial(s) => Some((s.function, 1)),
            Shading::TriangleMesh(_) | Shading::PatchMesh(_) => None,
        }
    }

    pub(crate) fn mesh_colors(&self) -> impl Iterator<Item = &Color> + '_ {
        let elements: &[MeshElement] = match self {
            Shading::TriangleMesh(m) => &m.elements,
            Shading::PatchMesh(m) => &m.elements,
            _ => &[],
        };

        elements.iter().flat_map(|e| e.colors.iter())
    }

    pub(crate) fn validate_geometry(&self) -> CapyResult<()> {
        match self {
            Shading::Function(s) => check_finite(&s.domain, "shading domain"),
            Shading::Axial(s) => check_finite(&s.coords, "shading coordinate"),
            Shading::Radial(s) => {
                check_finite(&s.coords, "shading coordinate")?;

                if s.coords[2] < 0.0 || s.coords[5] < 0.0 {
                    return Err(CapyError::invalid("Radial shading radius is negative."));
                }

                Ok(())
            }
            Shading::TriangleMesh(m) if m.elements.len() < 3 => {
                Err(CapyError::invalid("Triangle mesh needs at least one triangle."))
            }
            Shading::PatchMesh(m) if m.elements.is_empty() => {
                Err(CapyError::invalid("Patch mesh needs at least one patch."))
            }
            _ => Ok(()),
        }
    }
}

impl From<FunctionShading> for Shading {
    fn from(value: FunctionShading) -> Self {
        Shading::Function(value)
    }
}

impl From<AxialShading> for Shading {
    fn from(value: AxialShading) -> Self {
        Shading::Axial(value)
    }
}

impl From<RadialShading> for Shading {
    fn from(value: RadialShading) -> Self {
        Shading::Radial(value)
    }
}

impl From<TriangleMesh> for Shading {
    fn from(value: TriangleMesh) -> Self {
        Shading::TriangleMesh(value)
    }
}

impl From<PatchMesh> for Shading {
    fn from(value: PatchMesh) -> Self {
        Shading::PatchMesh(value)
    }
}

/// A registered shading, together with the decode ranges of its color components.
#[derive(Debug, Clone)]
pub(crate) struct ShadingRecord {
    pub(crate) shading: Shading,
    pub(crate) component_ranges: Vec<[f32; 2]>,
}

impl Serialize for ShadingRecord {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.shadings
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();

        match &self.shading {
            Shading::Function(s) => {
                let function_ref = sc.refs.functions.get(s.function)?;
                let mut shading = chunk.function_shading(root_ref);
                shading.shading_type(FunctionShadingType::Function);
                s.color_space.write(sc, shading.insert(Name(b"ColorSpace")))?;
                shading.domain(s.domain);
                if let Some(matrix) = s.matrix {
                    shading.matrix(matrix.to_pdf_transform());
                }
                shading.function(function_ref);
                shading.finish();
            }
            Shading::Axial(s) => {
                let function_ref = sc.refs.functions.get(s.function)?;
                let mut shading = chunk.function_shading(root_ref);
                shading.shading_type(FunctionShadingType::Axial);
                s.color_space.write(sc, shading.insert(Name(b"ColorSpace")))?;
                shading.coords(s.coords);
                shading.function(function_ref);
                if let Some(extend) = s.extend {
                    shading.extend(extend);
                }
                if let Some(domain) = s.domain {
                    shading.insert(Name(b"Domain")).array().items(domain);
                }
                shading.finish();
            }
            Shading::Radial(s) => {
                let function_ref = sc.refs.functions.get(s.function)?;
                let mut shading = chunk.function_shading(root_ref);
                shading.shading_type(FunctionShadingType::Radial);
                s.color_space.write(sc, shading.insert(Name(b"ColorSpace")))?;
                shading.coords(s.coords);
                shading.function(function_ref);
                if let Some(extend) = s.extend {
                    shading.extend(extend);
                }
                if let Some(domain) = s.domain {
                    shading.insert(Name(b"Domain")).array().items(domain);
                }
                shading.finish();
            }
            Shading::TriangleMesh(m) => {
                self.write_mesh(sc, &mut chunk, root_ref, 4, m.color_space, &m.elements)?
            }
            Shading::PatchMesh(m) => {
                self.write_mesh(sc, &mut chunk, root_ref, 6, m.color_space, &m.elements)?
            }
        }

        Ok(chunk)
    }
}

impl ShadingRecord {
    fn write_mesh(
        &self,
        sc: &mut SerializeContext,
        chunk: &mut Chunk,
        root_ref: Ref,
        shading_type: i32,
        color_space: ColorSpace,
        elements: &[MeshElement],
    ) -> CapyResult<()> {
        let (x_range, y_range) = coordinate_ranges(elements);
        let data = encode_mesh(elements, x_range, y_range, &self.component_ranges);

        let stream = FilterStreamBuilder::new_from_binary_data(&data).finish(sc.serialize_settings());
        let mut mesh = chunk.stream(root_ref, stream.encoded_data());
        mesh.pair(Name(b"ShadingType"), shading_type);
        color_space.write(sc, mesh.insert(Name(b"ColorSpace")))?;
        mesh.pair(Name(b"BitsPerCoordinate"), 32);
        mesh.pair(Name(b"BitsPerComponent"), 16);
        mesh.pair(Name(b"BitsPerFlag"), 8);

        let mut decode = vec![x_range[0], x_range[1], y_range[0], y_range[1]];
        decode.extend(self.component_ranges.iter().flatten());
        mesh.insert(Name(b"Decode")).array().items(decode);

        stream.write_filters(mesh.deref_mut());
        mesh.finish();

        Ok(())
    }
}

fn coordinate_ranges(elements: &[MeshElement]) -> ([f32; 2], [f32; 2]) {
    let mut x = [f32::MAX, f32::MIN];
    let mut y = [f32::MAX, f32::MIN];

    for point in elements.iter().flat_map(|e| e.coords.chunks_exact(2)) {
        x = [x[0].min(point[0]), x[1].max(point[0])];
        y = [y[0].min(point[1]), y[1].max(point[1])];
    }

    // A degenerate range can't be used for normalization.
    let widen = |r: [f32; 2]| if r[0] < r[1] { r } else { [r[0], r[0] + 1.0] };
    (widen(x), widen(y))
}

fn normalize_u32(value: f32, range: [f32; 2]) -> u32 {
    let t = ((value - range[0]) as f64 / (range[1] - range[0]) as f64).clamp(0.0, 1.0);
    (t * u32::MAX as f64).round() as u32
}

fn normalize_u16(value: f32, range: [f32; 2]) -> u16 {
    let span = range[1] - range[0];
    let t = if span > 0.0 {
        ((value - range[0]) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (t * u16::MAX as f32).round() as u16
}

fn encode_mesh(
    elements: &[MeshElement],
    x_range: [f32; 2],
    y_range: [f32; 2],
    component_ranges: &[[f32; 2]],
) -> Vec<u8> {
    let mut data = vec![];

    for element in elements {
        data.push(element.flag);

        for point in element.coords.chunks_exact(2) {
            data.extend(normalize_u32(point[0], x_range).to_be_bytes());
            data.extend(normalize_u32(point[1], y_range).to_be_bytes());
        }

        for color in &element.colors {
            for (component, range) in color.components().into_iter().zip(component_ranges) {
                data.extend(normalize_u16(component, *range).to_be_bytes());
            }
        }
    }

    data
}
