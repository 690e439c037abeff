//! Webcam hand landmark overlay.
//!
//! Captures frames from a webcam, hands them to a [`HandLandmarker`] for hand landmark
//! estimation, draws the estimated landmarks, a frame rate counter and the active tracking
//! thresholds onto the frame, and shows the result in a window until the quit key is pressed.
//!
//! The moving parts are behind small traits so that [`OverlayLoop`] can be driven by anything
//! that produces frames, estimates landmarks, and shows images:
//!
//! - [`FrameSource`] (implemented by [`Webcam`])
//! - [`HandLandmarker`] (implemented by [`LandmarkNetwork`])
//! - [`DisplaySurface`] (implemented by [`gui::Window`])
//! - [`Clock`] (implemented by [`MonotonicClock`])
//!
//! # Coordinates
//!
//! Landmark positions are *normalized*: X and Y are in range 0.0 to 1.0 relative to the frame
//! they were estimated on, with Y pointing down. Z is relative depth with the wrist as origin
//! and uses roughly the same scale as X.
//!
//! # Environment Variables
//!
//! * `HANDCAM_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s. If unset, the device is
//!   selected by index among all devices that support a compatible image format.
//! * `HANDCAM_MODEL_DIR`: Directory containing `palm_detection_{lite,full}.onnx` and
//!   `hand_landmark_{lite,full}.onnx`. Overridden by `--model-dir`.
//!
//! [`HandLandmarker`]: hand::HandLandmarker
//! [`LandmarkNetwork`]: hand::network::LandmarkNetwork
//! [`FrameSource`]: video::FrameSource
//! [`Webcam`]: video::webcam::Webcam
//! [`DisplaySurface`]: gui::DisplaySurface
//! [`Clock`]: timer::Clock
//! [`MonotonicClock`]: timer::MonotonicClock
//! [`OverlayLoop`]: pipeline::OverlayLoop

use log::LevelFilter;

pub mod config;
pub mod deadline;
pub mod error;
pub mod gui;
pub mod hand;
pub mod image;
pub mod nn;
pub mod overlay;
pub mod pipeline;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `handcam` will log at *debug* level, `wgpu` at *warn* level. `RUST_LOG`
/// can be used to override this.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
