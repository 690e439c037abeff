//! Run configuration.
//!
//! Both configuration records are built once at startup and never change afterwards.

use std::{fmt, time::Duration};

use anyhow::bail;

/// Selects which of the two hand landmark networks is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelComplexity {
    /// `hand_landmark_lite.onnx`, faster but less accurate.
    Lite,
    /// `hand_landmark_full.onnx`.
    #[default]
    Full,
}

impl ModelComplexity {
    /// Maps the numeric complexity level used on the command line (`0` or `1`).
    pub fn from_level(level: u8) -> anyhow::Result<Self> {
        match level {
            0 => Ok(Self::Lite),
            1 => Ok(Self::Full),
            _ => bail!("model complexity must be 0 or 1, got {level}"),
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Self::Lite => 0,
            Self::Full => 1,
        }
    }
}

/// Parameters handed to the [`HandLandmarker`] when it is constructed.
///
/// [`HandLandmarker`]: crate::hand::HandLandmarker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingConfig {
    static_image_mode: bool,
    max_hands: usize,
    complexity: ModelComplexity,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            max_hands: 2,
            complexity: ModelComplexity::Full,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.7,
        }
    }
}

impl TrackingConfig {
    /// If `true`, every frame is treated as unrelated to the previous one and no tracking
    /// between frames happens.
    #[inline]
    pub fn static_image_mode(self, enabled: bool) -> Self {
        Self {
            static_image_mode: enabled,
            ..self
        }
    }

    /// Sets the maximum number of hands reported per frame.
    #[inline]
    pub fn max_hands(self, max_hands: usize) -> Self {
        Self { max_hands, ..self }
    }

    #[inline]
    pub fn complexity(self, complexity: ModelComplexity) -> Self {
        Self { complexity, ..self }
    }

    /// Sets the minimum presence score for a hand found without prior tracking data.
    #[inline]
    pub fn min_detection_confidence(self, confidence: f32) -> Self {
        Self {
            min_detection_confidence: confidence,
            ..self
        }
    }

    /// Sets the minimum presence score for a hand to keep being tracked from the previous frame.
    #[inline]
    pub fn min_tracking_confidence(self, confidence: f32) -> Self {
        Self {
            min_tracking_confidence: confidence,
            ..self
        }
    }

    /// Checks that both confidences are in range `0.0..=1.0`.
    pub fn validate(self) -> anyhow::Result<Self> {
        for (name, value) in [
            ("detection", self.min_detection_confidence),
            ("tracking", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("minimum {name} confidence must be between 0.0 and 1.0, got {value}");
            }
        }
        Ok(self)
    }

    pub fn is_static_image_mode(&self) -> bool {
        self.static_image_mode
    }

    pub fn hand_limit(&self) -> usize {
        self.max_hands
    }

    pub fn model_complexity(&self) -> ModelComplexity {
        self.complexity
    }

    pub fn detection_confidence(&self) -> f32 {
        self.min_detection_confidence
    }

    pub fn tracking_confidence(&self) -> f32 {
        self.min_tracking_confidence
    }
}

/// Formats the two thresholds the way they are shown on screen.
impl fmt::Display for TrackingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "detection: {:?} tracking: {:?}",
            self.min_detection_confidence, self.min_tracking_confidence
        )
    }
}

/// Behavior of the [`OverlayLoop`] itself.
///
/// [`OverlayLoop`]: crate::pipeline::OverlayLoop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub(crate) hand_index: usize,
    pub(crate) quit_key: char,
    pub(crate) key_poll_timeout: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            hand_index: 0,
            quit_key: 'x',
            key_poll_timeout: Duration::from_millis(1),
        }
    }
}

impl LoopConfig {
    /// Selects which detected hand has its points scaled to pixel coordinates and reported.
    #[inline]
    pub fn hand_index(mut self, index: usize) -> Self {
        self.hand_index = index;
        self
    }

    /// Sets the key that stops the loop.
    #[inline]
    pub fn quit_key(mut self, key: char) -> Self {
        self.quit_key = key;
        self
    }

    /// Sets how long each iteration waits for a key press.
    #[inline]
    pub fn key_poll_timeout(mut self, timeout: Duration) -> Self {
        self.key_poll_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TrackingConfig::default();
        assert!(!config.is_static_image_mode());
        assert_eq!(config.hand_limit(), 2);
        assert_eq!(config.model_complexity().level(), 1);
        assert_eq!(config.detection_confidence(), 0.5);
        assert_eq!(config.tracking_confidence(), 0.7);
    }

    #[test]
    fn settings_text() {
        assert_eq!(
            TrackingConfig::default().to_string(),
            "detection: 0.5 tracking: 0.7"
        );
        assert_eq!(
            TrackingConfig::default()
                .min_detection_confidence(1.0)
                .to_string(),
            "detection: 1.0 tracking: 0.7"
        );
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        assert!(TrackingConfig::default()
            .min_tracking_confidence(1.5)
            .validate()
            .is_err());
        assert!(TrackingConfig::default()
            .min_detection_confidence(-0.1)
            .validate()
            .is_err());
        assert!(TrackingConfig::default().validate().is_ok());
    }

    #[test]
    fn complexity_levels() {
        assert_eq!(ModelComplexity::from_level(0).unwrap(), ModelComplexity::Lite);
        assert_eq!(ModelComplexity::from_level(1).unwrap(), ModelComplexity::Full);
        assert!(ModelComplexity::from_level(2).is_err());
    }
}
