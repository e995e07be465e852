use nalgebra as na;
use ndarray as nd;

pub type Vector2d = na::Vector2<f64>;
pub type Point2d = na::Point2<f64>;
/// Affine transform mapping `[x, y, 1]` to `[x', y']`
pub type Matrix23d = na::Matrix2x3<f64>;

/// Pixel storage of a frame, indexed as (row, column, channel)
pub type FrameData = nd::Array3<u8>;
