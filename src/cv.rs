//! OpenCV implementations of the image primitives, frame conversion and video input.

use std::path::Path;

use cv2::core::{Mat, Point2f, Scalar, Vector};
use cv2::prelude::*;
use opencv as cv2;
use tracing::{info, warn};

use crate::affine::{AffineEstimator, AffineFit};
use crate::config::Config;
use crate::detector::FeatureDetector;
use crate::feature::{DescriptorMatch, Descriptors, Keypoint};
use crate::frame::Frame;
use crate::image::Image;
use crate::matcher::DescriptorMatcher;
use crate::my_types::*;
use crate::source::FrameSource;
use crate::stabilizer::Backend;
use crate::warp::ImageResampler;
use crate::{Error, Result};

/// Copy a frame into an 8 bit `Mat` with the same channel count
pub fn frame_to_mat(frame: &Frame) -> Result<Mat> {
    let (height, width, channels) = frame.data.dim();
    let mut mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        cv2::core::CV_8UC(channels as i32)?,
        Scalar::default(),
    )?;
    let data = frame.data.as_standard_layout();
    let bytes = data
        .as_slice()
        .ok_or_else(|| Error::InvalidFrame("frame is not contiguous".into()))?;
    mat.data_bytes_mut()?.copy_from_slice(bytes);
    Ok(mat)
}

/// Copy an 8 bit `Mat` into a frame
pub fn mat_to_frame(mat: &Mat) -> Result<Frame> {
    if mat.depth() != cv2::core::CV_8U {
        return Err(Error::InvalidFrame(format!("unsupported depth {}", mat.depth())));
    }
    let continuous;
    let mat = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone()?;
        &continuous
    };
    Frame::from_raw(
        mat.cols() as usize,
        mat.rows() as usize,
        mat.channels() as usize,
        mat.data_bytes()?.to_vec(),
    )
}

fn image_to_mat(image: &Image) -> Result<Mat> {
    frame_to_mat(&Frame::from_gray(image))
}

fn descriptors_to_mat(descriptors: &Descriptors) -> Result<(Mat, i32)> {
    let rows = descriptors.len() as i32;
    match descriptors {
        Descriptors::Binary { row_len, data } => {
            let mut mat = Mat::new_rows_cols_with_default(
                rows,
                *row_len as i32,
                cv2::core::CV_8UC1,
                Scalar::default(),
            )?;
            mat.data_bytes_mut()?
                .copy_from_slice(&data[..rows as usize * row_len]);
            Ok((mat, cv2::core::NORM_HAMMING))
        }
        Descriptors::Float { row_len, data } => {
            let mut mat = Mat::new_rows_cols_with_default(
                rows,
                *row_len as i32,
                cv2::core::CV_32FC1,
                Scalar::default(),
            )?;
            mat.data_typed_mut::<f32>()?
                .copy_from_slice(&data[..rows as usize * row_len]);
            Ok((mat, cv2::core::NORM_L2))
        }
    }
}

fn matrix_to_mat(m: &Matrix23d) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(2, 3, cv2::core::CV_64FC1, Scalar::default())?;
    let values = mat.data_typed_mut::<f64>()?;
    for r in 0..2 {
        for c in 0..3 {
            values[r * 3 + c] = m[(r, c)];
        }
    }
    Ok(mat)
}

/// ORB keypoints and descriptors
pub struct OrbDetector {
    orb: cv2::core::Ptr<cv2::features2d::ORB>,
    max_features: usize,
    fast_threshold: i32,
}

impl OrbDetector {
    pub fn new(max_features: usize, fast_threshold: u8) -> Result<Self> {
        Ok(Self {
            orb: Self::create(max_features, fast_threshold as i32)?,
            max_features,
            fast_threshold: fast_threshold as i32,
        })
    }

    fn create(
        max_features: usize,
        fast_threshold: i32,
    ) -> Result<cv2::core::Ptr<cv2::features2d::ORB>> {
        Ok(cv2::features2d::ORB::create(
            max_features as i32,
            1.2, // scale factor
            8,   // levels
            31,  // edge threshold
            0,   // first level
            2,   // WTA_K
            cv2::features2d::ORB_ScoreType::HARRIS_SCORE,
            31, // patch size
            fast_threshold,
        )?)
    }
}

impl FeatureDetector for OrbDetector {
    fn detect(
        &mut self,
        image: &Image,
        max_features: usize,
    ) -> Result<(Vec<Keypoint>, Descriptors)> {
        if max_features != self.max_features {
            self.orb = Self::create(max_features, self.fast_threshold)?;
            self.max_features = max_features;
        }
        let mat = image_to_mat(image)?;
        let mut cv_keypoints = Vector::<cv2::core::KeyPoint>::new();
        let mut cv_descriptors = Mat::default();
        self.orb.detect_and_compute(
            &mat,
            &Mat::default(),
            &mut cv_keypoints,
            &mut cv_descriptors,
            false,
        )?;

        if cv_descriptors.empty() {
            return Ok((vec![], Descriptors::default()));
        }
        let keypoints = cv_keypoints
            .iter()
            .map(|kp| {
                let pt = kp.pt();
                Keypoint {
                    point: Point2d::new(pt.x as f64, pt.y as f64),
                    response: kp.response() as f64,
                    angle: (kp.angle() as f64).to_radians(),
                }
            })
            .collect();
        let descriptors = Descriptors::Binary {
            row_len: cv_descriptors.cols() as usize,
            data: cv_descriptors.data_bytes()?.to_vec(),
        };
        Ok((keypoints, descriptors))
    }
}

/// `cv::BFMatcher`, Hamming norm for binary and L2 for float descriptors
pub struct CvMatcher {
    pub cross_check: bool,
}

impl CvMatcher {
    fn try_match(&self, query: &Descriptors, train: &Descriptors) -> Result<Vec<DescriptorMatch>> {
        let (query_mat, query_norm) = descriptors_to_mat(query)?;
        let (train_mat, train_norm) = descriptors_to_mat(train)?;
        if query_norm != train_norm {
            return Ok(vec![]);
        }
        let matcher = cv2::features2d::BFMatcher::create(query_norm, self.cross_check)?;
        let mut cv_matches = Vector::<cv2::core::DMatch>::new();
        matcher.train_match(&query_mat, &train_mat, &mut cv_matches, &Mat::default())?;

        let mut matches: Vec<DescriptorMatch> = cv_matches
            .iter()
            .map(|m| DescriptorMatch {
                query_idx: m.query_idx as usize,
                train_idx: m.train_idx as usize,
                distance: m.distance,
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(matches)
    }
}

impl DescriptorMatcher for CvMatcher {
    fn match_descriptors(&self, query: &Descriptors, train: &Descriptors) -> Vec<DescriptorMatch> {
        if query.is_empty() || train.is_empty() {
            return vec![];
        }
        self.try_match(query, train).unwrap_or_else(|e| {
            warn!("Descriptor matching failed: {}", e);
            vec![]
        })
    }
}

/// `cv::estimateAffine2D` with RANSAC
pub struct CvAffineEstimator {
    pub threshold: f64,
    pub iterations: usize,
}

impl CvAffineEstimator {
    fn try_fit(&self, from: &[Point2d], to: &[Point2d]) -> Result<AffineFit> {
        let to_vector = |points: &[Point2d]| {
            points
                .iter()
                .map(|p| Point2f::new(p.x as f32, p.y as f32))
                .collect::<Vector<Point2f>>()
        };
        let mut inlier_mask = Mat::default();
        let transform = cv2::calib3d::estimate_affine_2d(
            &to_vector(from),
            &to_vector(to),
            &mut inlier_mask,
            cv2::calib3d::RANSAC,
            self.threshold,
            self.iterations,
            0.99, // confidence
            10,   // refine iterations
        )?;

        let inliers = if inlier_mask.empty() {
            vec![false; from.len()]
        } else {
            inlier_mask.data_bytes()?.iter().map(|&v| v != 0).collect()
        };
        if transform.empty() {
            return Ok(AffineFit {
                transform: None,
                inliers,
            });
        }
        let mut m = Matrix23d::zeros();
        for r in 0..2 {
            for c in 0..3 {
                m[(r, c)] = *transform.at_2d::<f64>(r as i32, c as i32)?;
            }
        }
        Ok(AffineFit {
            transform: Some(m),
            inliers,
        })
    }
}

impl AffineEstimator for CvAffineEstimator {
    fn fit(&mut self, from: &[Point2d], to: &[Point2d]) -> AffineFit {
        if from.len() < 3 || from.len() != to.len() {
            return AffineFit::failed(from.len());
        }
        self.try_fit(from, to).unwrap_or_else(|e| {
            warn!("Affine estimation failed: {}", e);
            AffineFit::failed(from.len())
        })
    }
}

/// `cv::warpAffine`, bilinear with a black constant border
#[derive(Debug, Clone, Default)]
pub struct CvResampler;

impl ImageResampler for CvResampler {
    fn warp_affine(&self, frame: &Frame, matrix: &Matrix23d) -> Result<Frame> {
        frame.ensure_valid()?;
        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidTransform(format!("non-finite matrix {matrix:?}")));
        }
        let src = frame_to_mat(frame)?;
        let mut dst = Mat::default();
        cv2::imgproc::warp_affine(
            &src,
            &mut dst,
            &matrix_to_mat(matrix)?,
            src.size()?,
            cv2::imgproc::INTER_LINEAR,
            cv2::core::BORDER_CONSTANT,
            Scalar::default(),
        )?;
        mat_to_frame(&dst)
    }
}

impl Backend {
    /// OpenCV primitives: ORB, brute force matching, `estimateAffine2D` and `warpAffine`
    pub fn opencv(config: &Config) -> Result<Self> {
        Ok(Backend {
            detector: Box::new(OrbDetector::new(config.max_feature_count, config.fast_threshold)?),
            matcher: Box::new(CvMatcher { cross_check: true }),
            fitter: Box::new(CvAffineEstimator {
                threshold: config.ransac_threshold,
                iterations: config.ransac_iterations,
            }),
            resampler: Box::new(CvResampler),
        })
    }
}

/// Frames from a video file or a camera through `cv::VideoCapture`
pub struct VideoSource {
    capture: cv2::videoio::VideoCapture,
    frame_count: Option<u64>,
}

impl VideoSource {
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path
            .to_str()
            .ok_or_else(|| Error::Backend(format!("Invalid video path {path:?}")))?;
        let capture = cv2::videoio::VideoCapture::from_file(name, cv2::videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::Backend(format!("Failed to open video file: {name}")));
        }
        let frame_count = capture.get(cv2::videoio::CAP_PROP_FRAME_COUNT)?;
        info!("Opened {} ({} frames)", name, frame_count);
        Ok(Self {
            capture,
            frame_count: (frame_count > 0.).then_some(frame_count as u64),
        })
    }

    /// Open camera `index`, optionally requesting a resolution and frame rate
    pub fn camera(index: i32, resolution: Option<(u32, u32)>, fps: Option<f64>) -> Result<Self> {
        let mut capture = cv2::videoio::VideoCapture::new(index, cv2::videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::Backend(format!("Failed to open camera {index}")));
        }
        if let Some((width, height)) = resolution {
            capture.set(cv2::videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
            capture.set(cv2::videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        }
        if let Some(fps) = fps {
            capture.set(cv2::videoio::CAP_PROP_FPS, fps)?;
        }
        info!(
            "Opened camera {} at {}x{}",
            index,
            capture.get(cv2::videoio::CAP_PROP_FRAME_WIDTH)?,
            capture.get(cv2::videoio::CAP_PROP_FRAME_HEIGHT)?
        );
        Ok(Self {
            capture,
            frame_count: None,
        })
    }
}

impl FrameSource for VideoSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.capture.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        Ok(Some(mat_to_frame(&mat)?))
    }

    fn len_hint(&self) -> Option<u64> {
        self.frame_count
    }
}
