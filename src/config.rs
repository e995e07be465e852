use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tuning of the stabilization pipeline.
///
/// Parsed from the command line (flattened into the binary arguments) or
/// read from a JSON file where missing keys take their default value.
#[derive(Debug, Clone, PartialEq, clap::Args, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Downscale factor in (0, 1] applied before feature extraction
    #[clap(long, default_value = "0.5")]
    pub resize_ratio: f64,

    /// Mean absolute grayscale difference under which the scene counts as static
    #[clap(long, default_value = "1.0")]
    pub static_scene_threshold: f64,

    /// Number of frame differences averaged for static scene detection
    #[clap(long, default_value = "10")]
    pub static_window_size: usize,

    #[clap(long, default_value = "200")]
    pub max_feature_count: usize,

    #[clap(long, default_value = "10")]
    pub min_match_count: usize,

    #[clap(long, default_value = "10")]
    pub min_inlier_count: usize,

    /// Largest horizontal correction in pixels
    #[clap(long, default_value = "40")]
    pub max_horizontal_shift: f64,

    /// Largest vertical correction in pixels
    #[clap(long, default_value = "40")]
    pub max_vertical_shift: f64,

    /// Largest rotation correction in degrees
    #[clap(long, default_value = "5")]
    pub max_rotation: f64,

    /// Process noise of the trajectory smoothers
    #[clap(long, default_value = "5e-5")]
    pub kalman_q: f64,

    /// Measurement noise of the trajectory smoothers
    #[clap(long, default_value = "3e-2")]
    pub kalman_r: f64,

    #[clap(long)]
    pub crop_result: bool,

    /// Fraction of the width removed on the left and on the right
    #[clap(long, default_value = "0.15")]
    pub crop_width_ratio: f64,

    /// Fraction of the height removed at the top and at the bottom
    #[clap(long, default_value = "0.10")]
    pub crop_height_ratio: f64,

    /// Put the cropped region back into a black canvas of the input size
    #[clap(long)]
    pub crop_keep_size: bool,

    /// Reject raw motions translating further than this many pixels, 0 disables
    #[clap(long, default_value = "0")]
    pub max_raw_translation: f64,

    /// Reject raw motions rotating further than this many degrees, 0 disables
    #[clap(long, default_value = "0")]
    pub max_raw_rotation: f64,

    /// Re-seed the fallback frame after this many consecutive failures, 0 disables
    #[clap(long, default_value = "0")]
    pub fallback_limit: usize,

    #[clap(long, default_value = "20")]
    pub fast_threshold: u8,

    /// RANSAC reprojection threshold in (downscaled) pixels
    #[clap(long, default_value = "3.0")]
    pub ransac_threshold: f64,

    #[clap(long, default_value = "1000")]
    pub ransac_iterations: usize,

    #[clap(long, default_value = "0")]
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resize_ratio: 0.5,
            static_scene_threshold: 1.0,
            static_window_size: 10,
            max_feature_count: 200,
            min_match_count: 10,
            min_inlier_count: 10,
            max_horizontal_shift: 40.,
            max_vertical_shift: 40.,
            max_rotation: 5.,
            kalman_q: 5e-5,
            kalman_r: 3e-2,
            crop_result: false,
            crop_width_ratio: 0.15,
            crop_height_ratio: 0.10,
            crop_keep_size: false,
            max_raw_translation: 0.,
            max_raw_rotation: 0.,
            fallback_limit: 0,
            fast_threshold: 20,
            ransac_threshold: 3.0,
            ransac_iterations: 1000,
            seed: 0,
        }
    }
}

impl Config {
    /// Read a JSON configuration file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Config = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn max_rotation_radians(&self) -> f64 {
        self.max_rotation.to_radians()
    }

    pub fn max_raw_rotation_radians(&self) -> f64 {
        self.max_raw_rotation.to_radians()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if !(self.resize_ratio > 0. && self.resize_ratio <= 1.) {
            return invalid(format!("resize_ratio must be in (0, 1], got {}", self.resize_ratio));
        }
        if !(self.static_scene_threshold >= 0.) {
            return invalid(format!(
                "static_scene_threshold must be >= 0, got {}",
                self.static_scene_threshold
            ));
        }
        if self.static_window_size == 0 {
            return invalid("static_window_size must be > 0".into());
        }
        if self.max_feature_count == 0 {
            return invalid("max_feature_count must be > 0".into());
        }
        for (name, value) in [
            ("max_horizontal_shift", self.max_horizontal_shift),
            ("max_vertical_shift", self.max_vertical_shift),
            ("max_rotation", self.max_rotation),
            ("max_raw_translation", self.max_raw_translation),
            ("max_raw_rotation", self.max_raw_rotation),
        ] {
            if !(value >= 0. && value.is_finite()) {
                return invalid(format!("{name} must be a finite value >= 0, got {value}"));
            }
        }
        for (name, value) in [("kalman_q", self.kalman_q), ("kalman_r", self.kalman_r)] {
            if !(value > 0. && value.is_finite()) {
                return invalid(format!("{name} must be a finite value > 0, got {value}"));
            }
        }
        for (name, value) in [
            ("crop_width_ratio", self.crop_width_ratio),
            ("crop_height_ratio", self.crop_height_ratio),
        ] {
            if !(0. ..0.5).contains(&value) {
                return invalid(format!("{name} must be in [0, 0.5), got {value}"));
            }
        }
        if !(self.ransac_threshold > 0.) {
            return invalid(format!(
                "ransac_threshold must be > 0, got {}",
                self.ransac_threshold
            ));
        }
        if self.ransac_iterations == 0 {
            return invalid("ransac_iterations must be > 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_validate_ranges() {
        let bad = [
            Config {
                resize_ratio: 0.,
                ..Default::default()
            },
            Config {
                resize_ratio: 1.5,
                ..Default::default()
            },
            Config {
                static_scene_threshold: -1.,
                ..Default::default()
            },
            Config {
                max_feature_count: 0,
                ..Default::default()
            },
            Config {
                max_rotation: -2.,
                ..Default::default()
            },
            Config {
                kalman_q: 0.,
                ..Default::default()
            },
            Config {
                kalman_r: f64::NAN,
                ..Default::default()
            },
            Config {
                crop_width_ratio: 0.5,
                ..Default::default()
            },
            Config {
                static_window_size: 0,
                ..Default::default()
            },
        ];
        for config in bad.iter() {
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "resize_ratio": 0.25, "crop_result": true }"#).unwrap();
        assert_eq!(config.resize_ratio, 0.25);
        assert!(config.crop_result);
        assert_eq!(config.kalman_q, Config::default().kalman_q);
        assert_eq!(config.static_window_size, 10);
    }

    #[test]
    fn test_cli_defaults_match_default() {
        use clap::Parser;

        #[derive(Parser)]
        struct Args {
            #[clap(flatten)]
            config: Config,
        }

        let args = Args::parse_from(["stabilize"]);
        assert_eq!(args.config, Config::default());

        let args = Args::parse_from(["stabilize", "--max-rotation", "2.5", "--crop-result"]);
        assert_eq!(args.config.max_rotation, 2.5);
        assert!(args.config.crop_result);
    }
}
