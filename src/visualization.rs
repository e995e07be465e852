#[cfg(feature = "opencv")]
pub use self::display::*;
#[cfg(feature = "rerun")]
pub use self::trajectory::*;

#[cfg(feature = "opencv")]
mod display {
    use cv2::core::Mat;
    use cv2::prelude::*;
    use opencv as cv2;

    use crate::cv::frame_to_mat;
    use crate::frame::Frame;
    use crate::Result;

    const WINDOW_NAME: &str = "Stabilized";
    const ESCAPE: i32 = 27;

    /// Show the stabilized frame, next to the input when given.
    /// A cropped output is scaled back to the input size for the comparison.
    pub fn show_result(output: &Frame, input: Option<&Frame>) -> Result<()> {
        let output_mat = frame_to_mat(output)?;
        let Some(input) = input else {
            cv2::highgui::imshow(WINDOW_NAME, &output_mat)?;
            return Ok(());
        };

        let input_mat = frame_to_mat(input)?;
        let output_mat = if output_mat.size()? != input_mat.size()? {
            let mut resized = Mat::default();
            cv2::imgproc::resize(
                &output_mat,
                &mut resized,
                input_mat.size()?,
                0.,
                0.,
                cv2::imgproc::INTER_LINEAR,
            )?;
            resized
        } else {
            output_mat
        };
        let mut combined = Mat::default();
        cv2::core::hconcat2(&input_mat, &output_mat, &mut combined)?;
        cv2::highgui::imshow(WINDOW_NAME, &combined)?;
        Ok(())
    }

    /// Pump the window events for a millisecond, true when ESC was pressed
    pub fn escape_pressed() -> Result<bool> {
        Ok(cv2::highgui::wait_key(1)? == ESCAPE)
    }

    pub fn close_windows() -> Result<()> {
        cv2::highgui::destroy_all_windows()?;
        Ok(())
    }
}

#[cfg(feature = "rerun")]
mod trajectory {
    use std::path::Path;

    use rerun::{RecordingStream, RecordingStreamBuilder};
    use tracing::warn;

    use crate::motion_filter::Motion;
    use crate::sink::TrajectorySink;
    use crate::{Error, Result};

    /// Streams the raw and smoothed trajectories into a rerun recording,
    /// angles in degrees.
    pub struct RerunTrajectorySink {
        recorder: RecordingStream,
        frame: i64,
    }

    impl RerunTrajectorySink {
        pub fn save(path: &Path) -> Result<Self> {
            let recorder = RecordingStreamBuilder::new("video-stabilizer")
                .save(path)
                .map_err(|e| Error::Backend(e.to_string()))?;
            Ok(Self { recorder, frame: 0 })
        }

        fn log_motion(&self, prefix: &str, motion: Motion) -> rerun::RecordingStreamResult<()> {
            self.recorder
                .log(format!("{prefix}/x"), &rerun::Scalar::new(motion.dx))?;
            self.recorder
                .log(format!("{prefix}/y"), &rerun::Scalar::new(motion.dy))?;
            self.recorder.log(
                format!("{prefix}/angle"),
                &rerun::Scalar::new(motion.dr.to_degrees()),
            )?;
            Ok(())
        }
    }

    impl TrajectorySink for RerunTrajectorySink {
        fn collect(&mut self, raw: Motion, smoothed: Motion) {
            self.frame += 1;
            self.recorder.set_time_sequence("frame", self.frame);
            let logged = self
                .log_motion("trajectory/raw", raw)
                .and_then(|_| self.log_motion("trajectory/smoothed", smoothed));
            if let Err(e) = logged {
                warn!("Failed to log trajectory: {}", e);
            }
        }
    }
}
