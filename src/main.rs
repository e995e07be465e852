use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context as AnyhowContext, Result};
use clap::Parser;
use indicatif::ProgressStyle;
use tracing::{info, info_span, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use video_stabilizer::cv::VideoSource;
use video_stabilizer::sink::{FrameStatistics, TrajectoryRecorder};
use video_stabilizer::source::FrameSource;
use video_stabilizer::visualization::{close_windows, escape_pressed, show_result};
use video_stabilizer::{Backend, Config, Stabilizer};

#[derive(Parser)]
#[clap(about = "Stabilize a video file or a camera stream")]
pub struct Args {
    /// Video file to stabilize
    #[clap(required_unless_present = "camera")]
    pub input: Option<PathBuf>,

    /// Capture from this camera instead of a file
    #[clap(long, conflicts_with = "input")]
    pub camera: Option<i32>,

    /// Requested camera frame width
    #[clap(long, requires = "height")]
    pub width: Option<u32>,

    /// Requested camera frame height
    #[clap(long, requires = "width")]
    pub height: Option<u32>,

    /// Requested camera frame rate
    #[clap(long)]
    pub fps: Option<f64>,

    /// JSON file with the pipeline settings, replaces the pipeline flags
    #[clap(long = "config")]
    pub config_file: Option<PathBuf>,

    /// Show the input next to the stabilized output
    #[clap(long)]
    pub show_combined: bool,

    /// Do not open a window
    #[clap(long)]
    pub no_display: bool,

    /// Save the raw and smoothed trajectories here
    #[clap(long)]
    pub trajectory_json: Option<PathBuf>,

    /// Save the trajectories as a rerun recording
    #[cfg(feature = "rerun")]
    #[clap(long)]
    pub rerun: Option<PathBuf>,

    /// Also write the log to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Frames between two performance reports
    #[clap(long, default_value = "100")]
    pub stats_interval: usize,

    #[clap(flatten)]
    pub config: Config,
}

#[cfg(feature = "rerun")]
fn rerun_sink(args: &Args) -> Result<Option<video_stabilizer::visualization::RerunTrajectorySink>> {
    let sink = args
        .rerun
        .as_deref()
        .map(video_stabilizer::visualization::RerunTrajectorySink::save)
        .transpose()
        .context("Failed to create the rerun recording")?;
    Ok(sink)
}

#[cfg(not(feature = "rerun"))]
fn rerun_sink(_: &Args) -> Result<Option<video_stabilizer::sink::NullSink>> {
    Ok(None)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    let file_layer = match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create the log file {path:?}"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .with(file_layer)
        .with(LevelFilter::INFO)
        .init();

    let config = match &args.config_file {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("Failed to load the configuration from {path:?}"))?,
        None => args.config.clone(),
    };

    let mut source = match (&args.input, args.camera) {
        (_, Some(index)) => VideoSource::camera(index, args.width.zip(args.height), args.fps)?,
        (Some(path), None) => VideoSource::from_file(path)?,
        (None, None) => bail!("No input given"),
    };
    let first = source.read()?.context("The input has no frames")?;

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    if let Some(length) = source.len_hint() {
        header_span.pb_set_length(length);
    }
    let header_span_enter = header_span.enter();

    let trajectory = (TrajectoryRecorder::new(), rerun_sink(&args)?);
    let mut stabilizer = Stabilizer::new(&config, Backend::opencv(&config)?, &first)
        .context("Failed to set up the stabilizer")?
        .with_status_sink(FrameStatistics::new(args.stats_interval))
        .with_trajectory_sink(trajectory);

    while let Some(frame) = source.read()? {
        let output = stabilizer.stabilize(&frame)?;
        Span::current().pb_inc(1);

        if args.no_display {
            continue;
        }
        show_result(output, args.show_combined.then_some(&frame))?;
        if escape_pressed()? {
            info!("Interrupted");
            break;
        }
    }

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    if !args.no_display {
        close_windows()?;
    }

    let processed = stabilizer.status_sink().frame_count();
    let estimated = stabilizer.filter().update_count();
    info!("{} of {} frames stabilized", estimated, processed);

    if let Some(path) = &args.trajectory_json {
        stabilizer
            .trajectory_sink()
            .0
            .save_json(path)
            .with_context(|| format!("Failed to save the trajectory to {path:?}"))?;
    }

    Ok(())
}
