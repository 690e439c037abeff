//! Square frame crops fed to the hand networks.

use anyhow::{bail, Context};

use crate::{
    error::InferenceError,
    image::{PackedFrame, Resolution},
    nn::{NeuralNetwork, Tensor},
};

use super::HandLandmarks;

/// How much larger than the landmarks' bounding box the tracking crop is.
const TRACKING_SCALE: f32 = 2.0;

/// A square region of the frame, in pixel coordinates. May extend past the frame's edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Roi {
    pub(crate) center_x: f32,
    pub(crate) center_y: f32,
    pub(crate) size: f32,
}

impl Roi {
    pub(crate) fn new(center_x: f32, center_y: f32, size: f32) -> Self {
        Self {
            center_x,
            center_y,
            size,
        }
    }

    /// The smallest square containing the whole frame, centered on it.
    ///
    /// Sampling it letterboxes the frame with black bars.
    pub(crate) fn enclosing(res: Resolution) -> Self {
        let (w, h) = (res.width() as f32, res.height() as f32);
        Self::new(w / 2.0, h / 2.0, w.max(h))
    }

    /// The crop to track `hand` with in the next frame.
    pub(crate) fn around(hand: &HandLandmarks, res: Resolution) -> Option<Self> {
        let (x0, y0, x1, y1) = hand.bounds()?;
        let (w, h) = (res.width() as f32, res.height() as f32);
        let size = ((x1 - x0) * w).max((y1 - y0) * h) * TRACKING_SCALE;
        if size < 1.0 {
            return None;
        }
        Some(Self::new((x0 + x1) / 2.0 * w, (y0 + y1) / 2.0 * h, size))
    }

    pub(crate) fn left(&self) -> f32 {
        self.center_x - self.size / 2.0
    }

    pub(crate) fn top(&self) -> f32 {
        self.center_y - self.size / 2.0
    }

    fn rect(&self) -> [f32; 4] {
        [
            self.left(),
            self.top(),
            self.left() + self.size,
            self.top() + self.size,
        ]
    }

    pub(crate) fn iou(&self, other: &Roi) -> f32 {
        iou(self.rect(), other.rect())
    }
}

/// Intersection over union of two `[x0, y0, x1, y1]` rectangles.
pub(crate) fn iou(a: [f32; 4], b: [f32; 4]) -> f32 {
    let area = |r: [f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let intersection = area([a[0].max(b[0]), a[1].max(b[1]), a[2].min(b[2]), a[3].min(b[3])]);
    let union = area(a) + area(b) - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputShape {
    /// Shape is `[1, 3, H, W]`.
    Nchw,
    /// Shape is `[1, H, W, 3]`.
    Nhwc,
}

/// A network taking a single square RGB image with color values in `0.0..=1.0`.
pub(crate) struct CropNetwork {
    nn: NeuralNetwork,
    shape: InputShape,
    input_res: Resolution,
}

impl CropNetwork {
    pub(crate) fn new(nn: NeuralNetwork, what: &str) -> anyhow::Result<Self> {
        if nn.num_inputs() != 1 {
            bail!(
                "{what} network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }
        let shape = nn
            .input_shape(0)
            .with_context(|| format!("{what} network has a symbolic input shape"))?;
        let (shape, w, h) = match shape[..] {
            [1, 3, h, w] => (InputShape::Nchw, w, h),
            [1, h, w, 3] => (InputShape::Nhwc, w, h),
            _ => bail!("invalid {what} network input shape {:?}", shape),
        };
        if w != h {
            bail!("{what} network input has to be square, got {}x{}", w, h);
        }
        let input_res = Resolution::new(w.try_into()?, h.try_into()?);
        log::debug!("{what} network takes {input_res} {shape:?} input");

        Ok(Self {
            nn,
            shape,
            input_res,
        })
    }

    pub(crate) fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Scale factor from network input pixels to frame pixels for `roi`.
    pub(crate) fn scale(&self, roi: Roi) -> f32 {
        roi.size / self.input_res.width() as f32
    }

    /// Samples `roi` out of `frame` and runs the network on it.
    pub(crate) fn run(&self, frame: &PackedFrame, roi: Roi) -> Result<Vec<Tensor>, InferenceError> {
        let input = self.input_tensor(frame, roi);
        self.nn.estimate(&input).map_err(InferenceError::Model)
    }

    fn input_tensor(&self, frame: &PackedFrame, roi: Roi) -> Tensor {
        let (w, h) = (
            self.input_res.width() as usize,
            self.input_res.height() as usize,
        );
        let res = frame.resolution();
        let sample = |x: usize, y: usize, c: usize| -> f32 {
            let fx = roi.left() + (x as f32 + 0.5) / w as f32 * roi.size;
            let fy = roi.top() + (y as f32 + 0.5) / h as f32 * roi.size;
            if fx < 0.0 || fy < 0.0 || fx >= res.width() as f32 || fy >= res.height() as f32 {
                return 0.0;
            }
            frame.rgb(fx as u32, fy as u32)[c] as f32 / 255.0
        };

        match self.shape {
            InputShape::Nchw => {
                Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| sample(x, y, c))
            }
            InputShape::Nhwc => {
                Tensor::from_array_shape_fn([1, h, w, 3], |[_, y, x, c]| sample(x, y, c))
            }
        }
    }
}

/// Returns output `index` if it has the `expected` shape.
pub(crate) fn output<'a>(
    outputs: &'a [Tensor],
    index: usize,
    expected: &[usize],
) -> Result<&'a Tensor, InferenceError> {
    match outputs.get(index) {
        Some(t) if t.shape() == expected => Ok(t),
        other => Err(InferenceError::OutputShape {
            index,
            actual: other.map(|t| t.shape().to_vec()).unwrap_or_default(),
            expected: expected.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::hand::Handedness;

    #[test]
    fn enclosing_letterboxes() {
        let roi = Roi::enclosing(Resolution::RES_480P);
        assert_relative_eq!(roi.left(), 0.0);
        assert_relative_eq!(roi.top(), -80.0);
        assert_relative_eq!(roi.size, 640.0);
    }

    #[test]
    fn roi_around_hand() {
        let hand = HandLandmarks::new(
            [[0.25, 0.25, 0.0], [0.75, 0.5, 0.0]],
            1.0,
            Handedness::Left,
        );
        let roi = Roi::around(&hand, Resolution::new(100, 100)).unwrap();
        assert_relative_eq!(roi.center_x, 50.0);
        assert_relative_eq!(roi.center_y, 37.5);
        assert_relative_eq!(roi.size, 100.0);

        let point = HandLandmarks::new([[0.5, 0.5, 0.0]], 1.0, Handedness::Left);
        assert!(Roi::around(&point, Resolution::new(100, 100)).is_none());
    }

    #[test]
    fn overlap() {
        let a = Roi::new(10.0, 10.0, 20.0);
        assert_relative_eq!(a.iou(&a), 1.0);
        assert_relative_eq!(a.iou(&Roi::new(100.0, 100.0, 20.0)), 0.0);
        // Half of each square overlaps: 200 / (400 + 400 - 200).
        assert_relative_eq!(a.iou(&Roi::new(20.0, 10.0, 20.0)), 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn missing_output() {
        let outputs = [Tensor::from_vec(&[1, 2], vec![0.0, 1.0]).unwrap()];
        assert!(output(&outputs, 0, &[1, 2]).is_ok());
        assert!(matches!(
            output(&outputs, 0, &[1, 3]),
            Err(InferenceError::OutputShape { index: 0, .. })
        ));
        assert!(matches!(
            output(&outputs, 1, &[1, 1]),
            Err(InferenceError::OutputShape { index: 1, .. })
        ));
    }
}
