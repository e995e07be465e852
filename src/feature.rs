use crate::image::Image;
use crate::my_types::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub point: Point2d,
    /// detector score, larger is stronger
    pub response: f64,
    /// orientation in radians
    pub angle: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Keypoint {
            point: Point2d::new(x, y),
            response: 0.,
            angle: 0.,
        }
    }
}

/// Row-major descriptor table, one row per keypoint
#[derive(Clone, Debug, PartialEq)]
pub enum Descriptors {
    /// Bit strings compared with the Hamming distance
    Binary { row_len: usize, data: Vec<u8> },
    /// Vectors compared with the euclidean distance
    Float { row_len: usize, data: Vec<f32> },
}

impl Default for Descriptors {
    fn default() -> Self {
        Descriptors::Binary {
            row_len: 32,
            data: vec![],
        }
    }
}

impl Descriptors {
    pub fn len(&self) -> usize {
        match self {
            Descriptors::Binary { row_len, data } if *row_len > 0 => data.len() / row_len,
            Descriptors::Float { row_len, data } if *row_len > 0 => data.len() / row_len,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distance between row `i` of `self` and row `j` of `other`.
    /// None when the descriptor kinds or lengths differ.
    pub fn distance(&self, i: usize, other: &Descriptors, j: usize) -> Option<f32> {
        match (self, other) {
            (
                Descriptors::Binary { row_len: n, data: a },
                Descriptors::Binary { row_len: m, data: b },
            ) if n == m => {
                let a = &a[i * n..(i + 1) * n];
                let b = &b[j * n..(j + 1) * n];
                Some(a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum::<u32>() as f32)
            }
            (
                Descriptors::Float { row_len: n, data: a },
                Descriptors::Float { row_len: m, data: b },
            ) if n == m => {
                let a = &a[i * n..(i + 1) * n];
                let b = &b[j * n..(j + 1) * n];
                Some(a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt())
            }
            _ => None,
        }
    }
}

/// Correspondence between a query and a train descriptor
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Keypoints and descriptors of one frame, plus the image they were extracted from
#[derive(Clone, Debug)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
    /// downscaled grayscale image
    pub image: Image,
    /// ratio between `image` and the original frame
    pub scale: f64,
}

impl FeatureSet {
    pub fn has_descriptors(&self) -> bool {
        !self.descriptors.is_empty()
    }
}
