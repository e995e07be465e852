/// Row-major grayscale image storage
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create an image with every pixel set to `value`
    pub fn filled(width: usize, height: usize, value: u8) -> Image {
        Image {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline(always)]
    pub fn value_i32(&self, x: i32, y: i32) -> u8 {
        self.data[y as usize * self.width + x as usize]
    }

    /// Pixel value with coordinates clamped to the image border
    #[inline(always)]
    pub fn value_clamped(&self, x: i32, y: i32) -> u8 {
        let x = x.clamp(0, self.width as i32 - 1);
        let y = y.clamp(0, self.height as i32 - 1);
        self.value_i32(x, y)
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Bilinear resize by `ratio`, output size is `round(size * ratio)` but at least one pixel.
    /// A ratio of one returns a copy.
    pub fn resized(&self, ratio: f64) -> Image {
        if ratio == 1.0 || self.is_empty() {
            return self.clone();
        }
        let width = ((self.width as f64 * ratio).round() as usize).max(1);
        let height = ((self.height as f64 * ratio).round() as usize).max(1);
        let sx = self.width as f64 / width as f64;
        let sy = self.height as f64 / height as f64;

        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            // align pixel centers
            let fy = ((y as f64 + 0.5) * sy - 0.5).max(0.);
            let y0 = (fy as usize).min(self.height - 1);
            let y1 = (y0 + 1).min(self.height - 1);
            let wy = fy - y0 as f64;
            for x in 0..width {
                let fx = ((x as f64 + 0.5) * sx - 0.5).max(0.);
                let x0 = (fx as usize).min(self.width - 1);
                let x1 = (x0 + 1).min(self.width - 1);
                let wx = fx - x0 as f64;
                let top = self.value(x0, y0) as f64 * (1. - wx) + self.value(x1, y0) as f64 * wx;
                let bottom = self.value(x0, y1) as f64 * (1. - wx) + self.value(x1, y1) as f64 * wx;
                let v = top * (1. - wy) + bottom * wy;
                data.push(v.round().clamp(0., 255.) as u8);
            }
        }
        Image {
            data,
            width,
            height,
        }
    }

    /// Separable box blur with a (2 * radius + 1) window, replicated border
    pub fn box_blur(&self, radius: usize) -> Image {
        if radius == 0 || self.is_empty() {
            return self.clone();
        }
        let r = radius as i32;
        let n = (2 * r + 1) as u32;
        let mut horizontal = vec![0u8; self.data.len()];
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let sum: u32 = (-r..=r).map(|d| self.value_clamped(x + d, y) as u32).sum();
                horizontal[y as usize * self.width + x as usize] = ((sum + n / 2) / n) as u8;
            }
        }
        let horizontal = Image {
            data: horizontal,
            width: self.width,
            height: self.height,
        };
        let mut out = Image::filled(self.width, self.height, 0);
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let sum: u32 = (-r..=r)
                    .map(|d| horizontal.value_clamped(x, y + d) as u32)
                    .sum();
                out.set_value(x as usize, y as usize, ((sum + n / 2) / n) as u8);
            }
        }
        out
    }

    /// Mean absolute pixel difference, None when the sizes differ or the images are empty
    pub fn mean_abs_diff(&self, other: &Image) -> Option<f64> {
        if self.width != other.width || self.height != other.height || self.is_empty() {
            return None;
        }
        let total: u64 = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| a.abs_diff(b) as u64)
            .sum();
        Some(total as f64 / self.data.len() as f64)
    }
}
