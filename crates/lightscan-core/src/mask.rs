//! Binary region masks rasterized from contour polygons.

use crate::contour::{ContourSet, ContourType, Point, ValidationError};
use crate::geometry;
use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use thiserror::Error;

const INSIDE: Luma<u8> = Luma([255]);
const OUTSIDE: u8 = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("cannot rasterize onto a {width}x{height} frame")]
    EmptyFrame { width: u32, height: u32 },
    #[error("polygon needs at least 3 distinct vertices, got {points}")]
    DegeneratePolygon { points: usize },
    #[error("mask size mismatch: {expected:?} vs {actual:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("face mask covers no pixels")]
    EmptyMask,
}

/// Failure to build the masks of one frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Binary raster: 255 inside the region, 0 outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// All-black mask of the given size.
    pub fn empty(width: u32, height: u32) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::EmptyFrame { width, height });
        }
        Ok(Self {
            image: GrayImage::from_pixel(width, height, Luma([OUTSIDE])),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Whether `(x, y)` lies inside the region. Out-of-bounds is outside.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.image.get_pixel(x, y)[0] != OUTSIDE
    }

    /// Number of pixels inside the region.
    pub fn coverage(&self) -> usize {
        self.image.pixels().filter(|p| p[0] != OUTSIDE).count()
    }

    pub fn is_empty(&self) -> bool {
        self.coverage() == 0
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }
}

/// Fill the closed polygon `points` (last point joins the first) white on a
/// black `width` x `height` canvas.
pub fn rasterize(points: &[Point], width: u32, height: u32) -> Result<Mask, GeometryError> {
    let mut mask = Mask::empty(width, height)?;

    // The closing edge is implicit, so an explicit repeat of the first vertex
    // at the end is dropped.
    let mut poly: Vec<imageproc::point::Point<i32>> = points
        .iter()
        .map(|p| imageproc::point::Point::new(p.x, p.y))
        .collect();
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() < 3 {
        return Err(GeometryError::DegeneratePolygon {
            points: points.len(),
        });
    }

    draw_polygon_mut(&mut mask.image, &poly, INSIDE);
    Ok(mask)
}

/// Cut each `excluded` region out of `base` by XOR compositing.
///
/// XOR only behaves as subtraction when every excluded region lies inside
/// `base` and the excluded regions do not overlap each other.
pub fn compose_exclusion(base: Mask, excluded: &[Mask]) -> Result<Mask, GeometryError> {
    let mut out = base;
    for mask in excluded {
        if mask.dimensions() != out.dimensions() {
            return Err(GeometryError::SizeMismatch {
                expected: out.dimensions(),
                actual: mask.dimensions(),
            });
        }
        for (dst, src) in out.image.pixels_mut().zip(mask.image.pixels()) {
            dst[0] ^= src[0];
        }
    }
    Ok(out)
}

/// Masks derived from a single frame.
#[derive(Debug, Clone)]
pub struct FaceMasks {
    /// Skin above the nose end, without eyes and eyebrows.
    pub face: Mask,
    /// Inner mouth opening, without lips.
    pub mouth: Mask,
}

impl FaceMasks {
    /// Build the face and mouth masks for a `width` x `height` frame.
    ///
    /// All polygons are validated before anything is rasterized, so a
    /// malformed detection never yields a partial result.
    pub fn build(set: &ContourSet, width: u32, height: u32) -> Result<Self, MaskError> {
        let face_outline = geometry::face_till_nose_end(set)?;
        let exclusions = [
            geometry::eye(set, ContourType::LeftEye)?,
            geometry::eye(set, ContourType::RightEye)?,
            geometry::eyebrow_loop(
                set,
                ContourType::LeftEyebrowTop,
                ContourType::LeftEyebrowBottom,
            )?,
            geometry::eyebrow_loop(
                set,
                ContourType::RightEyebrowTop,
                ContourType::RightEyebrowBottom,
            )?,
        ];
        let mouth_outline = geometry::mouth_without_lips(set)?;

        let excluded = exclusions
            .iter()
            .map(|points| rasterize(points, width, height))
            .collect::<Result<Vec<_>, _>>()?;
        let face = compose_exclusion(rasterize(&face_outline, width, height)?, &excluded)?;
        let mouth = rasterize(&mouth_outline, width, height)?;

        tracing::debug!(
            face_px = face.coverage(),
            mouth_px = mouth.coverage(),
            "face masks built"
        );
        Ok(Self { face, mouth })
    }
}
