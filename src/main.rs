use std::{path::PathBuf, time::Duration};

use clap::Parser;
use handcam::{
    config::{LoopConfig, ModelComplexity, TrackingConfig},
    deadline::{TimedLandmarker, TimedSource},
    gui::{self, Window},
    hand::network::LandmarkNetwork,
    image::Resolution,
    pipeline::OverlayLoop,
    video::webcam::{ParamPreference, Webcam, WebcamOptions},
};

/// Shows a webcam feed with the estimated landmarks of the hands in view.
///
/// Press the quit key (default `x`) in the window to exit.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Index of the webcam among all supported capture devices.
    ///
    /// Ignored if `--device-name` or `HANDCAM_WEBCAM_NAME` is set.
    #[arg(long, default_value_t = 0)]
    device: usize,

    /// Name of the webcam to open, as reported by the driver.
    #[arg(long)]
    device_name: Option<String>,

    /// Directory containing the `palm_detection_*.onnx` and `hand_landmark_*.onnx` models.
    #[arg(long, env = "HANDCAM_MODEL_DIR", default_value = "models")]
    model_dir: PathBuf,

    /// Treat every frame as unrelated to the previous one instead of tracking hands.
    #[arg(long)]
    static_image_mode: bool,

    /// Maximum number of hands to report.
    #[arg(long, default_value_t = 2)]
    max_hands: usize,

    /// Landmark model to use: 0 (lite) or 1 (full).
    #[arg(long, default_value_t = 1)]
    model_complexity: u8,

    /// Minimum confidence for a hand to be detected.
    #[arg(long, default_value_t = 0.5)]
    min_detection_confidence: f32,

    /// Minimum confidence for a hand to keep being tracked.
    #[arg(long, default_value_t = 0.7)]
    min_tracking_confidence: f32,

    /// Which detected hand to report in pixel coordinates.
    #[arg(long, default_value_t = 0)]
    hand_index: usize,

    /// Key that closes the program.
    #[arg(long, default_value_t = 'x')]
    quit_key: char,

    #[arg(long, default_value = "WebCamFeed")]
    window_title: String,

    /// Maximum time to wait for a webcam frame.
    #[arg(long, default_value_t = 2000)]
    capture_timeout_ms: u64,

    /// Maximum time to wait for landmark estimation of a frame.
    #[arg(long, default_value_t = 5000)]
    inference_timeout_ms: u64,

    /// Preferred capture width.
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Preferred capture height.
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Preferred capture frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Keep the frame rate instead of the resolution when the webcam cannot deliver both.
    #[arg(long)]
    prefer_fps: bool,
}

impl Cli {
    fn tracking_config(&self) -> anyhow::Result<TrackingConfig> {
        TrackingConfig::default()
            .static_image_mode(self.static_image_mode)
            .max_hands(self.max_hands)
            .complexity(ModelComplexity::from_level(self.model_complexity)?)
            .min_detection_confidence(self.min_detection_confidence)
            .min_tracking_confidence(self.min_tracking_confidence)
            .validate()
    }

    fn webcam_options(&self) -> WebcamOptions {
        let mut options = WebcamOptions::default().index(self.device);
        if let (Some(width), Some(height)) = (self.width, self.height) {
            options = options.resolution(Resolution::new(width, height));
        }
        if let Some(fps) = self.fps {
            options = options.fps(fps);
        }
        if let Some(name) = &self.device_name {
            options = options.name(name.clone());
        }
        if self.prefer_fps {
            options = options.prefer(ParamPreference::Framerate);
        }
        options
    }
}

fn main() -> anyhow::Result<()> {
    handcam::init_logger!();

    let cli = Cli::parse();
    let tracking = cli.tracking_config()?;

    gui::run(move || app(cli, tracking))
}

fn app(cli: Cli, tracking: TrackingConfig) -> anyhow::Result<()> {
    let options = cli.webcam_options();
    let source = TimedSource::spawn(Duration::from_millis(cli.capture_timeout_ms), move || {
        Webcam::open(options)
    })?;

    let model_dir = cli.model_dir.clone();
    let landmarker =
        TimedLandmarker::spawn(Duration::from_millis(cli.inference_timeout_ms), move || {
            LandmarkNetwork::load(&model_dir, tracking)
        })?;

    let window = Window::open(&cli.window_title)?;

    let config = LoopConfig::default()
        .hand_index(cli.hand_index)
        .quit_key(cli.quit_key);
    let mut overlay = OverlayLoop::new(source, landmarker, window, tracking, config);
    let summary = overlay.run()?;
    log::info!(
        "exiting after {} frames ({:?})",
        summary.iterations,
        summary.reason
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn webcam_flags() {
        let cli = Cli::try_parse_from(["handcam", "--device-name", "Front Cam", "--prefer-fps"])
            .unwrap();
        let options = format!("{:?}", cli.webcam_options());
        assert!(options.contains(r#"name: Some("Front Cam")"#), "{options}");
        assert!(options.contains("Framerate"), "{options}");

        let options = format!("{:?}", Cli::parse_from(["handcam"]).webcam_options());
        assert!(options.contains("name: None"), "{options}");
        assert!(options.contains("pref: Resolution"), "{options}");
    }
}
