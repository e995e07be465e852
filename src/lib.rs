//! # Video stabilizer
//!
//! Per-frame digital video stabilization. Every frame goes through
//!
//! 1. keypoint extraction on a downscaled grayscale copy,
//! 2. rigid motion estimation against the previous frame, with static scene suppression,
//! 3. accumulation into a camera trajectory and per-axis Kalman smoothing,
//! 4. a clamped corrective warp.
//!
//! When the motion of a frame cannot be estimated the last stabilized frame is
//! returned again and the smoothing state is left untouched.
//!
//! Feature detection, descriptor matching, robust transform fitting and resampling are
//! pluggable through the traits in [`detector`], [`matcher`], [`affine`] and [`warp`].
//! Pure rust implementations are always available, the `opencv` feature adds OpenCV backed ones.
//!
//! ```rust,ignore
//! use video_stabilizer::{Backend, Config, Stabilizer};
//!
//! let config = Config::default();
//! let mut stabilizer = Stabilizer::new(&config, Backend::native(&config), &first)?;
//! let steady = stabilizer.stabilize(&next)?;
//! ```

pub mod affine;
pub mod config;
pub mod detector;
pub mod extractor;
pub mod feature;
pub mod frame;
pub mod image;
pub mod kalman_filter;
pub mod matcher;
pub mod math;
pub mod motion_estimator;
pub mod motion_filter;
pub mod my_types;
pub mod sink;
pub mod source;
pub mod stabilizer;
pub mod stationary;
pub mod warp;

#[cfg(feature = "opencv")]
pub mod cv;

#[cfg(any(feature = "opencv", feature = "rerun"))]
pub mod visualization;

pub use config::Config;
pub use frame::Frame;
pub use motion_estimator::{EstimationFailure, MotionEstimate, MotionEstimator};
pub use motion_filter::{Motion, MotionFilter};
pub use stabilizer::{Backend, Stabilizer};

pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that abort stabilization.
    ///
    /// Frames whose motion cannot be estimated are not errors, see
    /// [`EstimationFailure`](crate::EstimationFailure).
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Empty frame ({width}x{height})")]
        EmptyFrame { width: usize, height: usize },

        #[error("Invalid frame: {0}")]
        InvalidFrame(String),

        #[error("Invalid transform: {0}")]
        InvalidTransform(String),

        #[error("Invalid crop: {0}")]
        InvalidCrop(String),

        #[error("Backend error: {0}")]
        Backend(String),

        #[error("Serialization error: {0}")]
        Json(#[from] serde_json::Error),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[cfg(feature = "opencv")]
        #[error("OpenCV error: {0}")]
        OpenCv(#[from] opencv::Error),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}
