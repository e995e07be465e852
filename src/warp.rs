use ndarray as nd;

use crate::config::Config;
use crate::frame::Frame;
use crate::math::{invert_affine, rigid_transform, transform_point};
use crate::motion_filter::Motion;
use crate::my_types::*;
use crate::{Error, Result};

/// Applies a 2x3 transform to a frame.
pub trait ImageResampler {
    /// Output has the size of `frame`; destination pixel `p` samples the source at
    /// `matrix⁻¹ · p`, pixels mapping outside the source are black.
    fn warp_affine(&self, frame: &Frame, matrix: &Matrix23d) -> Result<Frame>;
}

/// Bilinear interpolation with a constant zero border
#[derive(Debug, Clone, Default)]
pub struct BilinearResampler;

impl ImageResampler for BilinearResampler {
    fn warp_affine(&self, frame: &Frame, matrix: &Matrix23d) -> Result<Frame> {
        frame.ensure_valid()?;
        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidTransform(format!("non-finite matrix {matrix:?}")));
        }
        let inverse = invert_affine(matrix)
            .ok_or_else(|| Error::InvalidTransform(format!("singular matrix {matrix:?}")))?;

        let (height, width, channels) = frame.data.dim();
        let src = &frame.data;
        // neighbours outside the image read as zero
        let sample = |x: i64, y: i64, c: usize| -> f64 {
            if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                0.
            } else {
                src[[y as usize, x as usize, c]] as f64
            }
        };

        let mut out = nd::Array3::<u8>::zeros((height, width, channels));
        for y in 0..height {
            for x in 0..width {
                let s = transform_point(&inverse, &Point2d::new(x as f64, y as f64));
                let x0 = s.x.floor();
                let y0 = s.y.floor();
                if x0 < -1. || y0 < -1. || x0 >= width as f64 || y0 >= height as f64 {
                    continue;
                }
                let wx = s.x - x0;
                let wy = s.y - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                for c in 0..channels {
                    let top = sample(x0, y0, c) * (1. - wx) + sample(x0 + 1, y0, c) * wx;
                    let bottom = sample(x0, y0 + 1, c) * (1. - wx) + sample(x0 + 1, y0 + 1, c) * wx;
                    let v = top * (1. - wy) + bottom * wy;
                    out[[y, x, c]] = v.round().clamp(0., 255.) as u8;
                }
            }
        }
        Ok(Frame { data: out })
    }
}

/// Center crop removing `floor(w * width_ratio)` columns and `floor(h * height_ratio)`
/// rows on each side. With `keep_size` the crop is put back in place on a black
/// canvas of the input size.
pub fn crop_frame(
    frame: &Frame,
    width_ratio: f64,
    height_ratio: f64,
    keep_size: bool,
) -> Result<Frame> {
    let (height, width, channels) = frame.data.dim();
    let x_margin = (width as f64 * width_ratio).floor() as usize;
    let y_margin = (height as f64 * height_ratio).floor() as usize;
    if 2 * x_margin >= width || 2 * y_margin >= height {
        return Err(Error::InvalidCrop(format!(
            "margins {x_margin}x{y_margin} leave nothing of a {width}x{height} frame"
        )));
    }

    let (rows, cols) = (y_margin..height - y_margin, x_margin..width - x_margin);
    let cropped = frame.data.slice(nd::s![rows.clone(), cols.clone(), ..]);
    let data = if keep_size {
        let mut canvas = nd::Array3::<u8>::zeros((height, width, channels));
        canvas.slice_mut(nd::s![rows, cols, ..]).assign(&cropped);
        canvas
    } else {
        cropped.to_owned()
    };
    Ok(Frame { data })
}

/// Applies corrective motions to frames.
pub struct FrameWarper {
    resampler: Box<dyn ImageResampler>,
    crop_result: bool,
    crop_width_ratio: f64,
    crop_height_ratio: f64,
    crop_keep_size: bool,
}

impl FrameWarper {
    pub fn new(resampler: Box<dyn ImageResampler>, config: &Config) -> Self {
        FrameWarper {
            resampler,
            crop_result: config.crop_result,
            crop_width_ratio: config.crop_width_ratio,
            crop_height_ratio: config.crop_height_ratio,
            crop_keep_size: config.crop_keep_size,
        }
    }

    /// Rotate by `correction.dr` about the origin and translate by (dx, dy), then crop
    /// if configured.
    pub fn warp(&self, frame: &Frame, correction: Motion) -> Result<Frame> {
        frame.ensure_valid()?;
        if !correction.is_finite() {
            return Err(Error::InvalidTransform(format!(
                "non-finite correction {correction:?}"
            )));
        }
        let matrix = rigid_transform(correction.dx, correction.dy, correction.dr);
        let warped = self.resampler.warp_affine(frame, &matrix)?;
        if !self.crop_result {
            return Ok(warped);
        }
        crop_frame(
            &warped,
            self.crop_width_ratio,
            self.crop_height_ratio,
            self.crop_keep_size,
        )
    }
}
