//! Tiling and shading patterns.

use std::ops::DerefMut;

use pdf_writer::types::{PaintType, TilingType};
use pdf_writer::{Chunk, Finish, Name, Ref};

use crate::chunk_container::ChunkContainerFn;
use crate::error::{CapyError, CapyResult};
use crate::geom::{RectExt, Transform, TransformExt};
use crate::handle::{DocumentId, Handle, ShadingId};
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::{FilterStreamBuilder, Stream};
use crate::util::check_finite;

/// The geometry of a tiling pattern.
///
/// The cell of the pattern is the bounding box of its draw context. It is repeated
/// every `x_step` units horizontally and every `y_step` units vertically.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TilingPatternProperties {
    /// The horizontal distance between pattern cells.
    pub x_step: f32,
    /// The vertical distance between pattern cells.
    pub y_step: f32,
    /// Maps pattern space to the default coordinate space of the page.
    pub matrix: Option<Transform>,
}

impl TilingPatternProperties {
    pub(crate) fn validate(&self) -> CapyResult<()> {
        check_finite(&[self.x_step, self.y_step], "pattern step")?;

        if self.x_step == 0.0 || self.y_step == 0.0 {
            return Err(CapyError::invalid("Pattern steps must not be zero."));
        }

        Ok(())
    }
}

/// A colored tiling pattern.
#[derive(Debug, Clone)]
pub(crate) struct TilingPattern {
    pub(crate) stream: Stream,
    pub(crate) properties: TilingPatternProperties,
}

/// A pattern that paints a shading.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ShadingPattern {
    /// The shading to paint.
    pub shading: ShadingId,
    /// Maps pattern space to the default coordinate space of the page.
    pub matrix: Option<Transform>,
}

impl ShadingPattern {
    /// Create a new shading pattern without a matrix.
    pub fn new(shading: ShadingId) -> Self {
        Self {
            shading,
            matrix: None,
        }
    }

    pub(crate) fn validate(&self, document: DocumentId) -> CapyResult<()> {
        self.shading.check(document)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum PatternRecord {
    Tiling(TilingPattern),
    Shading(ShadingPattern),
}

impl Serialize for PatternRecord {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.patterns
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();

        match self {
            PatternRecord::Tiling(pattern) => {
                let pattern_stream = FilterStreamBuilder::new_from_content_stream(
                    &pattern.stream.content,
                    sc.serialize_settings(),
                )
                .finish(sc.serialize_settings());

                let mut tiling_pattern =
                    chunk.tiling_pattern(root_ref, pattern_stream.encoded_data());
                pattern_stream.write_filters(tiling_pattern.deref_mut().deref_mut());

                pattern
                    .stream
                    .resource_dictionary
                    .to_pdf_resources(sc, &mut tiling_pattern)?;

                tiling_pattern
                    .tiling_type(TilingType::ConstantSpacing)
                    .paint_type(PaintType::Colored)
                    .bbox(pattern.stream.bbox.to_pdf_rect())
                    .x_step(pattern.properties.x_step)
                    .y_step(pattern.properties.y_step);

                if let Some(matrix) = pattern.properties.matrix {
                    tiling_pattern.matrix(matrix.to_pdf_transform());
                }

                tiling_pattern.finish();
            }
            PatternRecord::Shading(pattern) => {
                let shading_ref = sc.refs.shadings.get(pattern.shading)?;
                let mut shading_pattern = chunk.shading_pattern(root_ref);
                shading_pattern.pair(Name(b"Shading"), shading_ref);

                if let Some(matrix) = pattern.matrix {
                    shading_pattern.matrix(matrix.to_pdf_transform());
                }

                shading_pattern.finish();
            }
        }

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_steps_are_rejected() {
        let properties = TilingPatternProperties {
            x_step: 10.0,
            y_step: 0.0,
            matrix: None,
        };

        assert!(properties.validate().is_err());
    }
}
