//! Geometrical helper structs.
//!
//! Rectangles and matrices are given in PDF user space, i.e. the origin is in the
//! bottom-left corner and the y axis points upwards. For [`Rect`], `top` is the
//! lower y coordinate and `bottom` the upper one, a consequence of reusing the
//! types of `tiny-skia-path`.

pub use tiny_skia_path::{Point, Rect, Transform};

use crate::error::{CapyError, CapyResult};

/// Create a rectangle from its lower-left and upper-right corners.
pub fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> CapyResult<Rect> {
    Rect::from_ltrb(x0, y0, x1, y1)
        .ok_or_else(|| CapyError::invalid(format!("Invalid rectangle [{x0} {y0} {x1} {y1}].")))
}

pub(crate) trait RectExt {
    fn to_pdf_rect(&self) -> pdf_writer::Rect;
}

impl RectExt for Rect {
    fn to_pdf_rect(&self) -> pdf_writer::Rect {
        pdf_writer::Rect::new(self.left(), self.top(), self.right(), self.bottom())
    }
}

pub(crate) trait TransformExt {
    fn to_pdf_transform(&self) -> [f32; 6];
}

impl TransformExt for Transform {
    fn to_pdf_transform(&self) -> [f32; 6] {
        [self.sx, self.ky, self.kx, self.sy, self.tx, self.ty]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_requires_positive_area() {
        assert!(rect(0.0, 0.0, 100.0, 50.0).is_ok());
        assert!(matches!(
            rect(10.0, 0.0, 5.0, 50.0),
            Err(CapyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn transform_is_written_in_pdf_order() {
        let t = Transform::from_row(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        assert_eq!(t.to_pdf_transform(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
