//! Error types for the three failure points of the overlay loop.
//!
//! Capturing, inferring, and displaying each have their own error type. [`LoopError`] wraps them
//! so that [`OverlayLoop::run`] can report which stage stopped the loop.
//!
//! [`OverlayLoop::run`]: crate::pipeline::OverlayLoop::run

use std::{io, time::Duration};

use thiserror::Error;

/// Failure to obtain a frame from a [`FrameSource`].
///
/// [`FrameSource`]: crate::video::FrameSource
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera device error: {0}")]
    Device(#[from] io::Error),
    #[error("camera stopped delivering frames")]
    Disconnected,
    #[error("no frame arrived within {0:?}")]
    Timeout(Duration),
}

/// Failure of the hand landmark collaborator.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("landmark model failed: {0}")]
    Model(#[source] anyhow::Error),
    #[error("unexpected output #{index} shape {actual:?} (expected {expected:?})")]
    OutputShape {
        index: usize,
        actual: Vec<usize>,
        expected: Vec<usize>,
    },
    #[error("landmark estimation did not finish within {0:?}")]
    Timeout(Duration),
    #[error("landmark worker thread is gone")]
    WorkerGone,
}

/// Failure to present a frame or to read keyboard input.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display is not available (was the GUI event loop started?)")]
    Unavailable,
    #[error("window event loop has shut down")]
    Closed,
    #[error("graphics error: {0}")]
    Graphics(#[source] anyhow::Error),
}

/// Any error that stops the [`OverlayLoop`].
///
/// [`OverlayLoop`]: crate::pipeline::OverlayLoop
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("capture failed")]
    Capture(#[from] CaptureError),
    #[error("inference failed")]
    Inference(#[from] InferenceError),
    #[error("display failed")]
    Display(#[from] DisplayError),
}
