use tracing::debug;

use crate::affine::{AffineEstimator, RansacSimilarity};
use crate::config::Config;
use crate::detector::{FastBriefDetector, FeatureDetector};
use crate::frame::Frame;
use crate::matcher::{BruteForceMatcher, DescriptorMatcher};
use crate::motion_estimator::{MotionEstimate, MotionEstimator};
use crate::motion_filter::{Motion, MotionFilter};
use crate::sink::{NullSink, StatusSink, TrajectorySink};
use crate::warp::{BilinearResampler, FrameWarper, ImageResampler};
use crate::Result;

/// The image primitives a [`Stabilizer`] runs on
pub struct Backend {
    pub detector: Box<dyn FeatureDetector>,
    pub matcher: Box<dyn DescriptorMatcher>,
    pub fitter: Box<dyn AffineEstimator>,
    pub resampler: Box<dyn ImageResampler>,
}

impl Backend {
    /// Pure rust primitives: FAST/BRIEF features, cross-checked Hamming matching,
    /// RANSAC similarity fit and bilinear resampling.
    pub fn native(config: &Config) -> Self {
        Backend {
            detector: Box::new(FastBriefDetector::new(config.fast_threshold, config.seed)),
            matcher: Box::new(BruteForceMatcher { cross_check: true }),
            fitter: Box::new(RansacSimilarity::new(
                config.ransac_threshold,
                config.ransac_iterations,
                config.seed,
            )),
            resampler: Box::new(BilinearResampler),
        }
    }
}

/// Per frame stabilization pipeline.
///
/// Each frame is compared with the previous one, the motion is folded into the
/// smoothed trajectory and the frame is warped by the clamped correction. When the
/// motion cannot be estimated the last stabilized frame is returned again and the
/// trajectory is left untouched.
pub struct Stabilizer<S: StatusSink = NullSink, T: TrajectorySink = NullSink> {
    estimator: MotionEstimator,
    filter: MotionFilter,
    warper: FrameWarper,

    /// last stabilized frame
    fallback: Frame,
    last_estimate: Option<MotionEstimate>,
    consecutive_failures: usize,
    fallback_limit: usize,

    status_sink: S,
    trajectory_sink: T,
}

impl Stabilizer {
    /// Seed the pipeline with the first frame of the stream
    pub fn new(config: &Config, backend: Backend, first_frame: &Frame) -> Result<Self> {
        config.validate()?;
        first_frame.ensure_valid()?;

        let Backend {
            detector,
            matcher,
            fitter,
            resampler,
        } = backend;
        let estimator = MotionEstimator::new(config, detector, matcher, fitter, first_frame)?;
        let warper = FrameWarper::new(resampler, config);
        // identical to the first frame unless cropping is on
        let fallback = warper.warp(first_frame, Motion::ZERO)?;

        Ok(Stabilizer {
            estimator,
            filter: MotionFilter::from_config(config),
            warper,
            fallback,
            last_estimate: None,
            consecutive_failures: 0,
            fallback_limit: config.fallback_limit,
            status_sink: NullSink,
            trajectory_sink: NullSink,
        })
    }
}

impl<S: StatusSink, T: TrajectorySink> Stabilizer<S, T> {
    pub fn with_status_sink<U: StatusSink>(self, status_sink: U) -> Stabilizer<U, T> {
        Stabilizer {
            estimator: self.estimator,
            filter: self.filter,
            warper: self.warper,
            fallback: self.fallback,
            last_estimate: self.last_estimate,
            consecutive_failures: self.consecutive_failures,
            fallback_limit: self.fallback_limit,
            status_sink,
            trajectory_sink: self.trajectory_sink,
        }
    }

    pub fn with_trajectory_sink<U: TrajectorySink>(self, trajectory_sink: U) -> Stabilizer<S, U> {
        Stabilizer {
            estimator: self.estimator,
            filter: self.filter,
            warper: self.warper,
            fallback: self.fallback,
            last_estimate: self.last_estimate,
            consecutive_failures: self.consecutive_failures,
            fallback_limit: self.fallback_limit,
            status_sink: self.status_sink,
            trajectory_sink,
        }
    }

    /// Stabilize the next frame of the stream.
    ///
    /// Errors only on unusable input, see [`crate::Error`].
    pub fn stabilize(&mut self, frame: &Frame) -> Result<&Frame> {
        let estimate = self.estimator.estimate(frame)?;
        self.last_estimate = Some(estimate);

        match estimate.motion() {
            Some(motion) => {
                self.filter.cumulate(motion);
                self.filter.smooth();
                let correction = self.filter.compute_correction();
                self.fallback = self.warper.warp(frame, correction)?;
                self.consecutive_failures = 0;

                self.status_sink.report(true);
                let (raw, smoothed) = self.filter.get_raw_and_smoothed_trajectory();
                self.trajectory_sink.collect(raw, smoothed);
            }
            None => {
                self.consecutive_failures += 1;
                if self.fallback_limit > 0 && self.consecutive_failures >= self.fallback_limit {
                    debug!(
                        "{} consecutive failures, passing the frame through",
                        self.consecutive_failures
                    );
                    self.fallback = self.warper.warp(frame, Motion::ZERO)?;
                }
                self.status_sink.report(false);
            }
        }

        Ok(&self.fallback)
    }

    /// The frame the last call to [`stabilize`](Self::stabilize) returned
    pub fn last_output(&self) -> &Frame {
        &self.fallback
    }

    pub fn last_estimate(&self) -> Option<MotionEstimate> {
        self.last_estimate
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    pub fn estimator(&self) -> &MotionEstimator {
        &self.estimator
    }

    pub fn filter(&self) -> &MotionFilter {
        &self.filter
    }

    pub fn status_sink(&self) -> &S {
        &self.status_sink
    }

    pub fn trajectory_sink(&self) -> &T {
        &self.trajectory_sink
    }
}
