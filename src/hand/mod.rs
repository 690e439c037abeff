//! Hand landmark estimation.
//!
//! [`HandLandmarker`] is the boundary to whatever estimates hand landmarks. The overlay loop only
//! relies on this trait; [`network::LandmarkNetwork`] implements it with ONNX palm detection
//! ([`palm::PalmDetector`]) and hand landmark networks.

mod crop;
pub mod landmark;
pub mod network;
pub mod palm;

use crate::{
    error::InferenceError,
    image::{PackedFrame, PixelLayout},
};

pub use landmark::{
    HandLandmarks, Handedness, LandmarkIdx, LandmarkPoint, PixelPoint, HAND_CONNECTIONS,
    NUM_LANDMARKS,
};

/// Estimates hand landmarks in color frames.
///
/// Implementations are constructed with a [`TrackingConfig`] and keep it for their whole
/// lifetime.
///
/// [`TrackingConfig`]: crate::config::TrackingConfig
pub trait HandLandmarker {
    /// Returns the pixel layout [`HandLandmarker::detect`] expects its input frame in.
    fn input_layout(&self) -> PixelLayout {
        PixelLayout::Rgb8
    }

    /// Estimates the landmarks of every hand visible in `frame`.
    ///
    /// Finding no hands is not an error and results in an empty [`Vec`].
    fn detect(&mut self, frame: &PackedFrame) -> Result<Vec<HandLandmarks>, InferenceError>;

    /// Returns the pairs of landmarks that should be connected when drawing a hand.
    fn connections(&self) -> &'static [(LandmarkIdx, LandmarkIdx)] {
        HAND_CONNECTIONS
    }
}

impl<L: HandLandmarker + ?Sized> HandLandmarker for Box<L> {
    fn input_layout(&self) -> PixelLayout {
        (**self).input_layout()
    }

    fn detect(&mut self, frame: &PackedFrame) -> Result<Vec<HandLandmarks>, InferenceError> {
        (**self).detect(frame)
    }

    fn connections(&self) -> &'static [(LandmarkIdx, LandmarkIdx)] {
        (**self).connections()
    }
}
