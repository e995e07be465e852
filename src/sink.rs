use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::motion_filter::Motion;
use crate::Result;

/// Receives the outcome of every processed frame.
pub trait StatusSink {
    fn report(&mut self, success: bool);
}

/// Receives the cumulative trajectories after every successfully estimated frame.
pub trait TrajectorySink {
    fn collect(&mut self, raw: Motion, smoothed: Motion);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn report(&mut self, _: bool) {}
}

impl TrajectorySink for NullSink {
    fn collect(&mut self, _: Motion, _: Motion) {}
}

impl<T: TrajectorySink> TrajectorySink for Option<T> {
    fn collect(&mut self, raw: Motion, smoothed: Motion) {
        if let Some(sink) = self {
            sink.collect(raw, smoothed);
        }
    }
}

/// Fan out to both sinks
impl<A: TrajectorySink, B: TrajectorySink> TrajectorySink for (A, B) {
    fn collect(&mut self, raw: Motion, smoothed: Motion) {
        self.0.collect(raw, smoothed);
        self.1.collect(raw, smoothed);
    }
}

/// Throughput over one reporting window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsReport {
    /// frames processed when the report was made
    pub frame: usize,
    pub fps: f64,
    /// percent
    pub drop_rate: f64,
}

/// Logs throughput and drop rate every `interval` frames
#[derive(Debug)]
pub struct FrameStatistics {
    interval: usize,
    frame_count: usize,
    success_count: usize,
    drop_count: usize,
    window_start: Instant,
    last_report: Option<StatisticsReport>,
}

impl Default for FrameStatistics {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FrameStatistics {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            frame_count: 0,
            success_count: 0,
            drop_count: 0,
            window_start: Instant::now(),
            last_report: None,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Percentage of dropped frames in the current window
    pub fn drop_rate(&self) -> f64 {
        let total = self.success_count + self.drop_count;
        if total == 0 {
            return 0.;
        }
        100. * self.drop_count as f64 / total as f64
    }

    pub fn last_report(&self) -> Option<StatisticsReport> {
        self.last_report
    }
}

impl StatusSink for FrameStatistics {
    fn report(&mut self, success: bool) {
        self.frame_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.drop_count += 1;
        }

        if self.frame_count % self.interval == 0 {
            let elapsed = self.window_start.elapsed().as_secs_f64();
            let fps = if elapsed > 0. {
                self.interval as f64 / elapsed
            } else {
                0.
            };
            let report = StatisticsReport {
                frame: self.frame_count,
                fps,
                drop_rate: self.drop_rate(),
            };
            info!(
                frame = report.frame,
                "Avg FPS: {:.1} | Dropped: {:.1}%",
                report.fps,
                report.drop_rate
            );
            self.last_report = Some(report);
            self.window_start = Instant::now();
            self.success_count = 0;
            self.drop_count = 0;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub raw: Motion,
    pub smoothed: Motion,
}

/// Keeps every trajectory sample in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectoryRecorder {
    pub samples: Vec<TrajectorySample>,
}

impl TrajectoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Trajectory with {} samples saved to {:?}", self.samples.len(), path);
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl TrajectorySink for TrajectoryRecorder {
    fn collect(&mut self, raw: Motion, smoothed: Motion) {
        self.samples.push(TrajectorySample { raw, smoothed });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_reset_every_interval() {
        let mut stats = FrameStatistics::new(4);
        stats.report(true);
        stats.report(false);
        stats.report(true);
        assert_eq!(stats.drop_rate(), 100. / 3.);
        assert_eq!(stats.last_report(), None);
        stats.report(false);
        // window was logged and reset
        assert_eq!(stats.drop_rate(), 0.);
        assert_eq!(stats.frame_count(), 4);
        let report = stats.last_report().unwrap();
        assert_eq!((report.frame, report.drop_rate), (4, 50.));
        assert!(report.fps >= 0.);

        for _ in 0..4 {
            stats.report(true);
        }
        assert_eq!(stats.last_report().unwrap().frame, 8);
        assert_eq!(stats.last_report().unwrap().drop_rate, 0.);
    }

    #[test]
    fn test_fan_out() {
        let mut sinks = (TrajectoryRecorder::new(), Some(TrajectoryRecorder::new()));
        sinks.collect(Motion::ZERO, Motion::ZERO);
        let mut disabled: (TrajectoryRecorder, Option<TrajectoryRecorder>) = Default::default();
        disabled.collect(Motion::ZERO, Motion::ZERO);

        assert_eq!(sinks.0.samples.len(), 1);
        assert_eq!(sinks.1.unwrap().samples.len(), 1);
        assert_eq!(disabled.0.samples.len(), 1);
        assert!(disabled.1.is_none());
    }

    #[test]
    fn test_recorder_json() {
        let mut recorder = TrajectoryRecorder::new();
        recorder.collect(Motion::new(1., 2., 0.25), Motion::new(0.5, 1., 0.125));
        recorder.collect(Motion::new(2., 4., 0.5), Motion::new(1., 2., 0.25));

        let path = std::env::temp_dir().join(format!("trajectory-{}.json", std::process::id()));
        recorder.save_json(&path).unwrap();
        let loaded = TrajectoryRecorder::load_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.samples, recorder.samples);
    }
}
