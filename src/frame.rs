use ndarray as nd;

use crate::image::Image;
use crate::my_types::*;
use crate::{Error, Result};

/// Video frame with 1 (gray), 3 (BGR) or 4 (BGRA) interleaved 8 bit channels
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub data: FrameData,
}

impl Frame {
    pub fn new(data: FrameData) -> Result<Frame> {
        check_channels(data.dim().2)?;
        Ok(Frame { data })
    }

    /// Black frame
    pub fn zeros(width: usize, height: usize, channels: usize) -> Result<Frame> {
        Frame::new(nd::Array3::zeros((height, width, channels)))
    }

    /// Build a frame from row-major interleaved pixel bytes
    pub fn from_raw(width: usize, height: usize, channels: usize, bytes: Vec<u8>) -> Result<Frame> {
        let data = nd::Array3::from_shape_vec((height, width, channels), bytes)
            .map_err(|e| Error::InvalidFrame(e.to_string()))?;
        Frame::new(data)
    }

    /// Single channel frame holding a copy of `image`
    pub fn from_gray(image: &Image) -> Frame {
        let data = nd::Array3::from_shape_fn((image.height, image.width, 1), |(y, x, _)| {
            image.value(x, y)
        });
        Frame { data }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Fail on frames the pipeline cannot read: an unsupported channel count
    /// gives [`Error::InvalidFrame`], no pixels give [`Error::EmptyFrame`].
    /// `data` is public, so hand-built frames are only checked here.
    pub fn ensure_valid(&self) -> Result<()> {
        check_channels(self.channels())?;
        if self.is_empty() {
            return Err(Error::EmptyFrame {
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(())
    }

    /// Grayscale conversion with the BT.601 luma weights, channels in BGR order
    pub fn to_gray(&self) -> Image {
        let (height, width, channels) = self.data.dim();
        let mut data = Vec::with_capacity(width * height);
        for pixel in self.data.rows() {
            let value = if channels == 1 {
                pixel[0]
            } else {
                let v = 0.114 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.299 * pixel[2] as f64;
                v.round().min(255.) as u8
            };
            data.push(value);
        }
        Image {
            data,
            width,
            height,
        }
    }
}

fn check_channels(channels: usize) -> Result<()> {
    if !matches!(channels, 1 | 3 | 4) {
        return Err(Error::InvalidFrame(format!(
            "unsupported channel count {channels}"
        )));
    }
    Ok(())
}
