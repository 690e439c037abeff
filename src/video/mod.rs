//! Frame sources.

pub mod webcam;

use crate::{error::CaptureError, image::Frame, timer::Timer};

/// Something that produces a sequence of [`Frame`]s, one per call.
pub trait FrameSource {
    /// Returns the next frame, blocking until one is available.
    fn capture_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Returns the timers measuring the parts of [`FrameSource::capture_frame`], if any.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        (**self).capture_frame()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}
