//! Palm detection.
//!
//! Uses MediaPipe's palm detection networks (`palm_detection_lite.onnx` and
//! `palm_detection_full.onnx`). They are single-shot multibox detectors with 2016 anchors, each
//! producing a box and 7 [`Keypoint`]s. Overlapping detections are merged by confidence-weighted
//! averaging.

use std::path::Path;

use anyhow::{bail, Context};

use crate::{
    config::ModelComplexity,
    error::InferenceError,
    image::{PackedFrame, Resolution},
    nn::{NeuralNetwork, Tensor},
};

use super::crop::{self, CropNetwork, Roi};

/// Intersection-over-union above which two detections are considered the same palm.
const IOU_THRESH: f32 = 0.3;

/// How much larger than the palm box the hand crop derived from it is.
const HAND_SCALE: f32 = 2.6;

/// How far the hand crop is moved from the palm towards the fingers, relative to the palm size.
const HAND_SHIFT: f32 = 0.5;

const NUM_KEYPOINTS: usize = 7;
const BOX_PARAMS: usize = 4 + NUM_KEYPOINTS * 2;

/// Returns the palm model file name for a complexity level.
pub fn model_file_name(complexity: ModelComplexity) -> &'static str {
    match complexity {
        ModelComplexity::Lite => "palm_detection_lite.onnx",
        ModelComplexity::Full => "palm_detection_full.onnx",
    }
}

/// A keypoint of a [`PalmDetection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

/// A detected palm, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PalmDetection {
    confidence: f32,
    center: (f32, f32),
    width: f32,
    height: f32,
    keypoints: [(f32, f32); NUM_KEYPOINTS],
}

impl PalmDetection {
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the center of the palm's bounding box.
    pub fn center(&self) -> (f32, f32) {
        self.center
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn keypoint(&self, keypoint: Keypoint) -> (f32, f32) {
        self.keypoints[keypoint as usize]
    }

    fn rect(&self) -> [f32; 4] {
        let (x, y) = self.center;
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        [x - hw, y - hh, x + hw, y + hh]
    }

    /// Returns the crop the landmark network should look at for the hand of this palm.
    ///
    /// The crop is moved from the palm towards the middle finger, since the palm sits at the
    /// bottom of the hand.
    pub(crate) fn hand_roi(&self) -> Roi {
        let palm_size = self.width.max(self.height);
        let (wx, wy) = self.keypoint(Keypoint::Wrist);
        let (mx, my) = self.keypoint(Keypoint::MiddleFingerMcp);
        let (dx, dy) = (mx - wx, my - wy);
        let len = dx.hypot(dy);
        let (dx, dy) = if len > f32::EPSILON {
            (dx / len, dy / len)
        } else {
            (0.0, -1.0)
        };

        let shift = palm_size * HAND_SHIFT;
        Roi::new(
            self.center.0 + dx * shift,
            self.center.1 + dy * shift,
            palm_size * HAND_SCALE,
        )
    }
}

/// Centers of the SSD anchors, relative to the network input, in `0.0..=1.0`.
struct Anchors {
    centers: Vec<(f32, f32)>,
}

impl Anchors {
    /// Computes anchors for `(boxes_per_cell, width, height)` layers.
    fn calculate(layers: &[(usize, usize, usize)]) -> Self {
        let mut centers = Vec::new();
        for &(boxes_per_cell, w, h) in layers {
            for y in 0..h {
                for x in 0..w {
                    let center = ((x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32);
                    centers.extend(std::iter::repeat(center).take(boxes_per_cell));
                }
            }
        }
        Self { centers }
    }

    fn palm() -> Self {
        Self::calculate(&[(2, 24, 24), (6, 12, 12)])
    }

    fn len(&self) -> usize {
        self.centers.len()
    }
}

/// Finds palms in full frames.
pub struct PalmDetector {
    net: CropNetwork,
    anchors: Anchors,
}

impl PalmDetector {
    /// Loads the palm network matching `complexity` from `model_dir`.
    pub fn load(model_dir: &Path, complexity: ModelComplexity) -> anyhow::Result<Self> {
        let path = model_dir.join(model_file_name(complexity));
        let nn = NeuralNetwork::from_path(&path)
            .with_context(|| format!("failed to load palm detection model {}", path.display()))?;
        Self::new(nn)
    }

    /// Wraps an already loaded network.
    ///
    /// The network must take one square image input of shape `[1, 3, H, W]` or `[1, H, W, 3]`.
    pub fn new(nn: NeuralNetwork) -> anyhow::Result<Self> {
        let net = CropNetwork::new(nn, "palm detection")?;
        if net.input_resolution() != Resolution::new(192, 192) {
            bail!(
                "palm detection network takes {} input, expected 192x192",
                net.input_resolution()
            );
        }
        Ok(Self {
            net,
            anchors: Anchors::palm(),
        })
    }

    /// Detects all palms in `frame` with a confidence of at least `threshold`.
    ///
    /// Detections are ordered by descending confidence.
    pub fn detect(
        &self,
        frame: &PackedFrame,
        threshold: f32,
    ) -> Result<Vec<PalmDetection>, InferenceError> {
        let roi = Roi::enclosing(frame.resolution());
        let outputs = self.net.run(frame, roi)?;
        let raw = decode(
            &outputs,
            &self.anchors,
            self.net.input_resolution(),
            threshold,
        )?;

        // Map from network input pixels back to the frame.
        let scale = self.net.scale(roi);
        let to_frame = |(x, y): (f32, f32)| (roi.left() + x * scale, roi.top() + y * scale);
        let palms = non_max_suppression(raw)
            .into_iter()
            .map(|det| PalmDetection {
                confidence: det.confidence,
                center: to_frame(det.center),
                width: det.width * scale,
                height: det.height * scale,
                keypoints: det.keypoints.map(to_frame),
            })
            .collect::<Vec<_>>();
        log::trace!("{} palms above {threshold}", palms.len());
        Ok(palms)
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Decodes the raw box and score outputs into detections in network input coordinates.
fn decode(
    outputs: &[Tensor],
    anchors: &Anchors,
    input_res: Resolution,
    threshold: f32,
) -> Result<Vec<PalmDetection>, InferenceError> {
    let boxes = crop::output(outputs, 0, &[1, anchors.len(), BOX_PARAMS])?;
    let scores = crop::output(outputs, 1, &[1, anchors.len(), 1])?;

    let (input_w, input_h) = (input_res.width() as f32, input_res.height() as f32);
    let detections = scores
        .as_slice()
        .iter()
        .zip(boxes.as_slice().chunks_exact(BOX_PARAMS))
        .zip(&anchors.centers)
        .filter_map(|((&score, p), &(ax, ay))| {
            let confidence = sigmoid(score);
            if confidence < threshold {
                return None;
            }
            let offset = |x: f32, y: f32| (x + ax * input_w, y + ay * input_h);
            let mut keypoints = [(0.0, 0.0); NUM_KEYPOINTS];
            for (kp, xy) in keypoints.iter_mut().zip(p[4..].chunks_exact(2)) {
                *kp = offset(xy[0], xy[1]);
            }
            Some(PalmDetection {
                confidence,
                center: offset(p[0], p[1]),
                width: p[2],
                height: p[3],
                keypoints,
            })
        })
        .collect();
    Ok(detections)
}

/// Merges overlapping detections into their confidence-weighted average.
fn non_max_suppression(mut detections: Vec<PalmDetection>) -> Vec<PalmDetection> {
    // Ascending, so that the most confident detection is popped first.
    detections.sort_unstable_by(|a, b| a.confidence.total_cmp(&b.confidence));

    let mut out = Vec::new();
    while let Some(seed) = detections.pop() {
        let seed_rect = seed.rect();
        let (overlapping, rest): (Vec<_>, Vec<_>) = detections
            .into_iter()
            .partition(|other| crop::iou(seed_rect, other.rect()) >= IOU_THRESH);
        detections = rest;

        let mut acc = PalmDetection {
            confidence: seed.confidence,
            center: (0.0, 0.0),
            width: 0.0,
            height: 0.0,
            keypoints: [(0.0, 0.0); NUM_KEYPOINTS],
        };
        let mut divisor = 0.0;
        for det in std::iter::once(&seed).chain(&overlapping) {
            let factor = det.confidence;
            divisor += factor;
            acc.center.0 += det.center.0 * factor;
            acc.center.1 += det.center.1 * factor;
            acc.width += det.width * factor;
            acc.height += det.height * factor;
            for (acc, kp) in acc.keypoints.iter_mut().zip(&det.keypoints) {
                acc.0 += kp.0 * factor;
                acc.1 += kp.1 * factor;
            }
        }

        acc.center.0 /= divisor;
        acc.center.1 /= divisor;
        acc.width /= divisor;
        acc.height /= divisor;
        for kp in &mut acc.keypoints {
            kp.0 /= divisor;
            kp.1 /= divisor;
        }
        out.push(acc);
    }
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const INPUT: Resolution = Resolution::new(192, 192);

    fn palm(confidence: f32, x: f32, y: f32, size: f32) -> PalmDetection {
        PalmDetection {
            confidence,
            center: (x, y),
            width: size,
            height: size,
            keypoints: [(x, y); NUM_KEYPOINTS],
        }
    }

    /// Builds network outputs where only the given anchors have a box of `size`.
    fn outputs(anchors: &Anchors, hits: &[(usize, f32)], size: f32) -> Vec<Tensor> {
        let n = anchors.len();
        let mut boxes = vec![0.0; n * BOX_PARAMS];
        let mut scores = vec![-10.0; n];
        for &(index, logit) in hits {
            boxes[index * BOX_PARAMS + 2] = size;
            boxes[index * BOX_PARAMS + 3] = size;
            // Middle finger MCP above the wrist.
            boxes[index * BOX_PARAMS + 4 + 2 * 2 + 1] = -size / 2.0;
            scores[index] = logit;
        }
        vec![
            Tensor::from_vec(&[1, n, BOX_PARAMS], boxes).unwrap(),
            Tensor::from_vec(&[1, n, 1], scores).unwrap(),
        ]
    }

    #[test]
    fn model_names() {
        assert_eq!(
            model_file_name(ModelComplexity::Lite),
            "palm_detection_lite.onnx"
        );
        assert_eq!(
            model_file_name(ModelComplexity::Full),
            "palm_detection_full.onnx"
        );
    }

    #[test]
    fn anchor_layout() {
        let anchors = Anchors::palm();
        assert_eq!(anchors.len(), 24 * 24 * 2 + 12 * 12 * 6);
        // Both boxes of the first cell share its center.
        assert_eq!(anchors.centers[0], anchors.centers[1]);
        assert_relative_eq!(anchors.centers[0].0, 0.5 / 24.0);
        assert_relative_eq!(anchors.centers[2].0, 1.5 / 24.0);
        // First anchor of the 12x12 layer.
        assert_relative_eq!(anchors.centers[24 * 24 * 2].1, 0.5 / 12.0);
    }

    #[test]
    fn decode_thresholds_scores() {
        let anchors = Anchors::palm();
        let outputs = outputs(&anchors, &[(0, 5.0), (100, -1.0)], 20.0);

        let dets = decode(&outputs, &anchors, INPUT, 0.5).unwrap();
        assert_eq!(dets.len(), 1);
        let det = &dets[0];
        assert_relative_eq!(det.confidence(), sigmoid(5.0));
        assert_relative_eq!(det.center().0, 4.0);
        assert_relative_eq!(det.center().1, 4.0);
        assert_relative_eq!(det.width(), 20.0);
        assert_relative_eq!(det.keypoint(Keypoint::MiddleFingerMcp).1, 4.0 - 10.0);

        let all = decode(&outputs, &anchors, INPUT, 0.0).unwrap();
        assert_eq!(all.len(), anchors.len());
    }

    #[test]
    fn decode_rejects_wrong_shapes() {
        let anchors = Anchors::palm();
        let outputs = [Tensor::from_vec(&[1, 2, 18], vec![0.0; 36]).unwrap()];
        assert!(matches!(
            decode(&outputs, &anchors, INPUT, 0.5),
            Err(InferenceError::OutputShape { index: 0, .. })
        ));
    }

    #[test]
    fn overlapping_detections_are_averaged() {
        let merged = non_max_suppression(vec![
            palm(0.25, 10.0, 10.0, 10.0),
            palm(0.75, 12.0, 10.0, 10.0),
            palm(0.6, 100.0, 100.0, 10.0),
        ]);
        assert_eq!(merged.len(), 2);

        assert_relative_eq!(merged[0].confidence(), 0.75);
        assert_relative_eq!(merged[0].center().0, 11.5);
        assert_relative_eq!(merged[0].keypoint(Keypoint::Wrist).0, 11.5);

        assert_relative_eq!(merged[1].confidence(), 0.6);
        assert_relative_eq!(merged[1].center().0, 100.0);
    }

    #[test]
    fn hand_roi_extends_towards_fingers() {
        let mut det = palm(1.0, 100.0, 100.0, 40.0);
        det.keypoints[Keypoint::Wrist as usize] = (100.0, 120.0);
        det.keypoints[Keypoint::MiddleFingerMcp as usize] = (100.0, 80.0);

        let roi = det.hand_roi();
        assert_relative_eq!(roi.center_x, 100.0);
        assert_relative_eq!(roi.center_y, 80.0);
        assert_relative_eq!(roi.size, 104.0);
    }
}
