use std::cmp::Ordering;
use std::collections::HashSet;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::trace;

use crate::feature::{Descriptors, Keypoint};
use crate::image::Image;
use crate::Result;

/// Finds keypoints in a grayscale image and describes them.
pub trait FeatureDetector {
    /// Return at most `max_features` keypoints and one descriptor row per keypoint.
    fn detect(
        &mut self,
        image: &Image,
        max_features: usize,
    ) -> Result<(Vec<Keypoint>, Descriptors)>;
}

/// Length of the contiguous arc, FAST-9
const FAST_VARIANT_N: usize = 9;

/// A Bresenham circle.
/// ref https://en.wikipedia.org/wiki/Midpoint_circle_algorithm
const CIRCLE_RADIUS: usize = 3;
const CIRCLE: [[i32; 2]; 16] = [
    [0, -3],
    [1, -3],
    [2, -2],
    [3, -1],
    [3, 0],
    [3, 1],
    [2, 2],
    [1, 3],
    [0, 3],
    [-1, 3],
    [-2, 2],
    [-3, 1],
    [-3, 0],
    [-3, -1],
    [-2, -2],
    [-1, -3],
];

const EDGE_MARGIN: usize = CIRCLE_RADIUS + 5;
const ORIENTATION_RADIUS: i32 = 15;
const SUPPRESSION_CELL: f64 = 5.;
const BRIEF_BITS: usize = 256;
const BRIEF_HALF_PATCH: i32 = 12;
const BRIEF_SMOOTHING: usize = 2;

/// FAST corners with intensity centroid orientation and rotated BRIEF descriptors.
pub struct FastBriefDetector {
    threshold: i16,
    /// sampling pairs (x1, y1, x2, y2) relative to the keypoint
    pattern: Vec<[i32; 4]>,
}

impl FastBriefDetector {
    /// The test pattern is drawn from `seed`, detectors built with the same seed
    /// produce comparable descriptors.
    pub fn new(threshold: u8, seed: u64) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let pattern = (0..BRIEF_BITS)
            .map(|_| {
                let mut coord = || rng.gen_range(-BRIEF_HALF_PATCH..=BRIEF_HALF_PATCH);
                [coord(), coord(), coord(), coord()]
            })
            .collect();
        FastBriefDetector {
            threshold: threshold as i16,
            pattern,
        }
    }

    /// Corner score or None when (x, y) is not a FAST corner
    fn corner_score(&self, image: &Image, x: i32, y: i32) -> Option<f64> {
        let center = image.value_i32(x, y) as i16;
        let mut diffs = [0i16; 16];
        for (diff, [dx, dy]) in diffs.iter_mut().zip(CIRCLE.iter()) {
            *diff = image.value_i32(x + dx, y + dy) as i16 - center;
        }

        let arc = |brighter: bool| {
            let mut longest = 0;
            let mut current = 0;
            for i in 0..(CIRCLE.len() + FAST_VARIANT_N - 1) {
                let d = diffs[i % CIRCLE.len()];
                let passes = if brighter {
                    d > self.threshold
                } else {
                    d < -self.threshold
                };
                if passes {
                    current += 1;
                    longest = usize::max(longest, current);
                } else {
                    current = 0;
                }
            }
            longest >= FAST_VARIANT_N
        };

        let score = |brighter: bool| {
            diffs
                .iter()
                .map(|&d| if brighter { d } else { -d })
                .filter(|&d| d > self.threshold)
                .map(|d| (d - self.threshold) as f64)
                .sum::<f64>()
        };

        match (arc(true), arc(false)) {
            (true, _) => Some(score(true)),
            (_, true) => Some(score(false)),
            _ => None,
        }
    }

    fn orientation(image: &Image, x: i32, y: i32) -> f64 {
        let mut m01 = 0.;
        let mut m10 = 0.;
        for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
                if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                    continue;
                }
                let v = image.value_clamped(x + dx, y + dy) as f64;
                m10 += v * dx as f64;
                m01 += v * dy as f64;
            }
        }
        f64::atan2(m01, m10)
    }

    fn describe(&self, smoothed: &Image, keypoint: &Keypoint, out: &mut Vec<u8>) {
        let x = keypoint.point.x as i32;
        let y = keypoint.point.y as i32;
        let (sin, cos) = keypoint.angle.sin_cos();
        let rotate = |dx: i32, dy: i32| {
            let dx = dx as f64;
            let dy = dy as f64;
            (
                x + (dx * cos - dy * sin).round() as i32,
                y + (dx * sin + dy * cos).round() as i32,
            )
        };
        for tests in self.pattern.chunks(8) {
            let mut byte = 0u8;
            for (bit, [x1, y1, x2, y2]) in tests.iter().enumerate() {
                let (ax, ay) = rotate(*x1, *y1);
                let (bx, by) = rotate(*x2, *y2);
                if smoothed.value_clamped(ax, ay) < smoothed.value_clamped(bx, by) {
                    byte |= 1 << bit;
                }
            }
            out.push(byte);
        }
    }
}

impl FeatureDetector for FastBriefDetector {
    fn detect(
        &mut self,
        image: &Image,
        max_features: usize,
    ) -> Result<(Vec<Keypoint>, Descriptors)> {
        let row_len = BRIEF_BITS / 8;
        if image.width <= 2 * EDGE_MARGIN || image.height <= 2 * EDGE_MARGIN {
            return Ok((vec![], Descriptors::Binary { row_len, data: vec![] }));
        }

        let mut corners = vec![];
        for y in EDGE_MARGIN..(image.height - EDGE_MARGIN) {
            for x in EDGE_MARGIN..(image.width - EDGE_MARGIN) {
                if let Some(response) = self.corner_score(image, x as i32, y as i32) {
                    corners.push(Keypoint {
                        response,
                        ..Keypoint::new(x as f64, y as f64)
                    });
                }
            }
        }
        let detected = corners.len();

        // Grid non-maximum suppression, strongest first
        corners.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(Ordering::Equal));
        let mut occupied = HashSet::new();
        let mut keypoints = vec![];
        for corner in corners {
            if keypoints.len() >= max_features {
                break;
            }
            let cell_x = (corner.point.x / SUPPRESSION_CELL) as i32;
            let cell_y = (corner.point.y / SUPPRESSION_CELL) as i32;
            let suppressed = (-1..=1)
                .any(|dy| (-1..=1).any(|dx| occupied.contains(&(cell_x + dx, cell_y + dy))));
            if !suppressed {
                occupied.insert((cell_x, cell_y));
                keypoints.push(corner);
            }
        }

        let smoothed = image.box_blur(BRIEF_SMOOTHING);
        let mut data = Vec::with_capacity(keypoints.len() * row_len);
        for keypoint in keypoints.iter_mut() {
            keypoint.angle =
                Self::orientation(image, keypoint.point.x as i32, keypoint.point.y as i32);
            self.describe(&smoothed, keypoint, &mut data);
        }
        trace!("{} corners detected, {} kept", detected, keypoints.len());

        Ok((keypoints, Descriptors::Binary { row_len, data }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_image(size: usize, start: usize, end: usize) -> Image {
        let mut image = Image::filled(size, size, 20);
        for y in start..=end {
            for x in start..=end {
                image.set_value(x, y, 200);
            }
        }
        image
    }

    #[test]
    fn test_square_corners() {
        let image = square_image(64, 20, 35);
        let mut detector = FastBriefDetector::new(20, 0);
        let (keypoints, descriptors) = detector.detect(&image, 100).unwrap();
        assert!(!keypoints.is_empty());
        assert_eq!(descriptors.len(), keypoints.len());

        let corners = [(20., 20.), (35., 20.), (20., 35.), (35., 35.)];
        let near = |kp: &Keypoint, (cx, cy): (f64, f64)| {
            (kp.point.x - cx).abs() <= 4. && (kp.point.y - cy).abs() <= 4.
        };
        for kp in keypoints.iter() {
            assert!(corners.iter().any(|&c| near(kp, c)), "{kp:?} is not a corner");
        }
        for c in corners {
            assert!(keypoints.iter().any(|kp| near(kp, c)), "no keypoint at {c:?}");
        }
    }

    #[test]
    fn test_flat_image() {
        let mut detector = FastBriefDetector::new(20, 0);
        let (keypoints, descriptors) = detector.detect(&Image::filled(64, 64, 90), 100).unwrap();
        assert!(keypoints.is_empty());
        assert!(descriptors.is_empty());

        let (keypoints, _) = detector.detect(&Image::filled(10, 10, 0), 100).unwrap();
        assert!(keypoints.is_empty());
    }

    #[test]
    fn test_max_features() {
        let image = square_image(64, 20, 35);
        let mut detector = FastBriefDetector::new(20, 0);
        let (keypoints, descriptors) = detector.detect(&image, 2).unwrap();
        assert_eq!(keypoints.len(), 2);
        assert_eq!(descriptors.len(), 2);
    }

    #[test]
    fn test_descriptor_translation_invariance() {
        let mut detector = FastBriefDetector::new(20, 7);
        let (kp_a, desc_a) = detector.detect(&square_image(64, 20, 35), 100).unwrap();
        let (kp_b, desc_b) = detector.detect(&square_image(64, 23, 38), 100).unwrap();

        let i = kp_a
            .iter()
            .position(|kp| kp.point.x == 20. && kp.point.y == 20.)
            .unwrap();
        let j = kp_b
            .iter()
            .position(|kp| kp.point.x == 23. && kp.point.y == 23.)
            .unwrap();
        assert_eq!(desc_a.distance(i, &desc_b, j), Some(0.));
    }
}
