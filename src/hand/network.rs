//! ONNX hand landmark network.
//!
//! Uses the networks from MediaPipe's [Hands] pipeline. A [`PalmDetector`] finds hands in the whole
//! frame, and the hand landmark network (`hand_landmark_lite.onnx` or `hand_landmark_full.onnx`)
//! then estimates the landmarks inside a crop around each of them. While tracking, the crop for
//! the next frame is derived from the hand's landmarks, and the palm detector only runs while
//! fewer than the maximum number of hands are tracked.
//!
//! [Hands]: https://google.github.io/mediapipe/solutions/hands.html

use std::{mem, path::Path};

use anyhow::Context;

use crate::{
    config::{ModelComplexity, TrackingConfig},
    error::InferenceError,
    image::{PackedFrame, PixelLayout, Resolution},
    nn::{NeuralNetwork, Tensor},
};

use super::{
    crop::{self, CropNetwork, Roi},
    palm::PalmDetector,
    HandLandmarker, HandLandmarks, Handedness, NUM_LANDMARKS,
};

/// Crops overlapping a kept crop by more than this are assumed to contain the same hand.
const SAME_HAND_IOU: f32 = 0.5;

/// Returns the landmark model file name for a complexity level.
pub fn model_file_name(complexity: ModelComplexity) -> &'static str {
    match complexity {
        ModelComplexity::Lite => "hand_landmark_lite.onnx",
        ModelComplexity::Full => "hand_landmark_full.onnx",
    }
}

/// Where a crop came from, which decides the presence threshold applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Tracked,
    Detected,
}

/// A [`HandLandmarker`] backed by ONNX palm detection and hand landmark networks.
pub struct LandmarkNetwork {
    landmarks: CropNetwork,
    palms: PalmDetector,
    config: TrackingConfig,
    tracked: Vec<Roi>,
}

impl LandmarkNetwork {
    /// Loads the palm and landmark networks matching `config`'s model complexity from
    /// `model_dir`.
    pub fn load(model_dir: &Path, config: TrackingConfig) -> anyhow::Result<Self> {
        let path = model_dir.join(model_file_name(config.model_complexity()));
        let nn = NeuralNetwork::from_path(&path)
            .with_context(|| format!("failed to load hand landmark model {}", path.display()))?;
        let palms = PalmDetector::load(model_dir, config.model_complexity())?;
        Self::new(nn, palms, config)
    }

    /// Wraps an already loaded landmark network.
    ///
    /// The network must take exactly one square image input of shape `[1, 3, H, W]` or
    /// `[1, H, W, 3]`.
    pub fn new(
        nn: NeuralNetwork,
        palms: PalmDetector,
        config: TrackingConfig,
    ) -> anyhow::Result<Self> {
        let landmarks = CropNetwork::new(nn, "hand landmark")?;
        log::info!(
            "hand landmark network ready ({:?}, {} input, up to {} hands)",
            config.model_complexity(),
            landmarks.input_resolution(),
            config.hand_limit(),
        );

        Ok(Self {
            landmarks,
            palms,
            config,
            tracked: Vec::new(),
        })
    }

    fn extract(
        &self,
        outputs: &[Tensor],
        roi: Roi,
        res: Resolution,
    ) -> Result<HandLandmarks, InferenceError> {
        let screen_landmarks = crop::output(outputs, 0, &[1, NUM_LANDMARKS * 3])?;
        let presence = crop::output(outputs, 1, &[1, 1])?;
        let handedness = crop::output(outputs, 2, &[1, 1])?;

        let presence = presence.as_singular().unwrap_or(0.0);
        let handedness = if handedness.as_singular().unwrap_or(0.0) > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        };

        // Network coordinates are pixels of the network input; map them back through the crop.
        let scale = self.landmarks.scale(roi);
        let (fw, fh) = (res.width() as f32, res.height() as f32);
        let positions = screen_landmarks.as_slice().chunks_exact(3).map(|xyz| {
            [
                (roi.left() + xyz[0] * scale) / fw,
                (roi.top() + xyz[1] * scale) / fh,
                xyz[2] * scale / fw,
            ]
        });

        Ok(HandLandmarks::new(positions, presence, handedness))
    }
}

/// Picks at most `limit` crops to run the landmark network on.
///
/// Tracked crops come first. Detected crops are only added if they do not overlap a crop that is
/// already picked.
fn plan_crops(tracked: Vec<Roi>, detected: Vec<Roi>, limit: usize) -> Vec<(Roi, Origin)> {
    let candidates = tracked
        .into_iter()
        .map(|roi| (roi, Origin::Tracked))
        .chain(detected.into_iter().map(|roi| (roi, Origin::Detected)));

    let mut crops: Vec<(Roi, Origin)> = Vec::with_capacity(limit);
    for (roi, origin) in candidates {
        if crops.len() >= limit {
            break;
        }
        if crops.iter().any(|(kept, _)| kept.iou(&roi) > SAME_HAND_IOU) {
            continue;
        }
        crops.push((roi, origin));
    }
    crops
}

impl HandLandmarker for LandmarkNetwork {
    fn input_layout(&self) -> PixelLayout {
        PixelLayout::Rgb8
    }

    fn detect(&mut self, frame: &PackedFrame) -> Result<Vec<HandLandmarks>, InferenceError> {
        let limit = self.config.hand_limit();
        let tracked = if self.config.is_static_image_mode() {
            Vec::new()
        } else {
            mem::take(&mut self.tracked)
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let res = frame.resolution();
        let detected: Vec<Roi> = if tracked.len() < limit {
            self.palms
                .detect(frame, self.config.detection_confidence())?
                .iter()
                .map(|palm| palm.hand_roi())
                .collect()
        } else {
            Vec::new()
        };

        let mut hands = Vec::new();
        for (roi, origin) in plan_crops(tracked, detected, limit) {
            let threshold = match origin {
                Origin::Tracked => self.config.tracking_confidence(),
                Origin::Detected => self.config.detection_confidence(),
            };
            let outputs = self.landmarks.run(frame, roi)?;
            let hand = self.extract(&outputs, roi, res)?;

            if hand.presence() < threshold {
                log::trace!(
                    "{:?} hand presence {:.2} below threshold {:.2}",
                    origin,
                    hand.presence(),
                    threshold
                );
                continue;
            }

            if !self.config.is_static_image_mode() {
                self.tracked.extend(Roi::around(&hand, res));
            }
            hands.push(hand);
        }
        Ok(hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Non-overlapping crops along the x axis.
    fn row(n: usize) -> Vec<Roi> {
        (0..n)
            .map(|i| Roi::new(50.0 + i as f32 * 100.0, 50.0, 80.0))
            .collect()
    }

    #[test]
    fn model_names() {
        assert_eq!(
            model_file_name(ModelComplexity::Lite),
            "hand_landmark_lite.onnx"
        );
        assert_eq!(
            model_file_name(ModelComplexity::Full),
            "hand_landmark_full.onnx"
        );
    }

    #[test]
    fn crop_count_capped_by_hand_limit() {
        for max_hands in 0..4 {
            let config = TrackingConfig::default().max_hands(max_hands);
            let crops = plan_crops(row(2), row(8).split_off(2), config.hand_limit());
            assert_eq!(crops.len(), max_hands);
        }
    }

    #[test]
    fn tracked_crops_come_first() {
        let crops = plan_crops(row(1), row(3).split_off(1), 2);
        assert_eq!(
            crops.iter().map(|(_, origin)| *origin).collect::<Vec<_>>(),
            [Origin::Tracked, Origin::Detected]
        );
        assert_eq!(crops[0].0, row(1)[0]);
    }

    #[test]
    fn detection_of_tracked_hand_is_skipped() {
        let tracked = row(1);
        let mut detected = vec![Roi::new(52.0, 50.0, 80.0)];
        detected.extend(row(2).split_off(1));

        let crops = plan_crops(tracked, detected, 3);
        assert_eq!(crops.len(), 2);
        assert_eq!(crops[1], (row(2)[1], Origin::Detected));
    }

    #[test]
    fn missing_model_file() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("no-such-model-dir");
        assert!(LandmarkNetwork::load(&dir, TrackingConfig::default()).is_err());
    }
}
