use tracing::debug;

use crate::detector::FeatureDetector;
use crate::feature::FeatureSet;
use crate::frame::Frame;
use crate::Result;

/// Turns frames into [`FeatureSet`]s: grayscale conversion, downscale, detection.
pub struct KeypointExtractor {
    detector: Box<dyn FeatureDetector>,
    resize_ratio: f64,
    max_features: usize,
}

impl KeypointExtractor {
    pub fn new(detector: Box<dyn FeatureDetector>, resize_ratio: f64, max_features: usize) -> Self {
        KeypointExtractor {
            detector,
            resize_ratio,
            max_features,
        }
    }

    /// Fails on empty frames. A frame without texture gives an empty set.
    pub fn extract(&mut self, frame: &Frame) -> Result<FeatureSet> {
        frame.ensure_valid()?;
        let image = frame.to_gray().resized(self.resize_ratio);
        let (keypoints, descriptors) = self.detector.detect(&image, self.max_features)?;
        debug!(
            "{} keypoints on {}x{} image",
            keypoints.len(),
            image.width,
            image.height
        );
        Ok(FeatureSet {
            keypoints,
            descriptors,
            image,
            scale: self.resize_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::FastBriefDetector;
    use crate::image::Image;
    use crate::Error;

    #[test]
    fn test_extract_downscales() {
        let mut gray = Image::filled(128, 96, 30);
        for y in 40..70 {
            for x in 40..80 {
                gray.set_value(x, y, 220);
            }
        }
        let frame = Frame::from_gray(&gray);
        let detector = Box::new(FastBriefDetector::new(20, 0));
        let mut extractor = KeypointExtractor::new(detector, 0.5, 50);
        let set = extractor.extract(&frame).unwrap();
        assert_eq!((set.image.width, set.image.height), (64, 48));
        assert_eq!(set.scale, 0.5);
        assert!(set.has_descriptors());
        assert_eq!(set.keypoints.len(), set.descriptors.len());
    }

    #[test]
    fn test_textureless_and_empty() {
        let detector = Box::new(FastBriefDetector::new(20, 0));
        let mut extractor = KeypointExtractor::new(detector, 1.0, 50);
        let set = extractor.extract(&Frame::zeros(40, 30, 3).unwrap()).unwrap();
        assert!(!set.has_descriptors());
        assert_eq!((set.image.width, set.image.height), (40, 30));

        assert!(matches!(
            extractor.extract(&Frame::zeros(0, 0, 3).unwrap()),
            Err(Error::EmptyFrame { .. })
        ));
    }
}
