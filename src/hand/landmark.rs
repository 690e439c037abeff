//! Hand landmark data and its visualization.

use crate::image::{draw, Color, Frame, Resolution};

/// Number of landmarks estimated per hand.
pub const NUM_LANDMARKS: usize = 21;

/// One estimated landmark in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkPoint {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A landmark scaled to pixel coordinates of a specific frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub id: usize,
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    /// Scales the normalized position to pixel coordinates in a frame of size `res`.
    pub fn to_pixels(&self, res: Resolution) -> PixelPoint {
        PixelPoint {
            id: self.id,
            x: self.x * res.width() as f32,
            y: self.y * res.height() as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// The landmarks of one detected hand, ordered by [`LandmarkIdx`].
#[derive(Debug, Clone)]
pub struct HandLandmarks {
    points: Vec<LandmarkPoint>,
    presence: f32,
    handedness: Handedness,
}

impl HandLandmarks {
    /// Creates a landmark set from normalized `[x, y, z]` positions.
    ///
    /// Point identifiers are assigned in order, starting at 0.
    pub fn new<I>(positions: I, presence: f32, handedness: Handedness) -> Self
    where
        I: IntoIterator<Item = [f32; 3]>,
    {
        let points = positions
            .into_iter()
            .enumerate()
            .map(|(id, [x, y, z])| LandmarkPoint { id, x, y, z })
            .collect();
        Self {
            points,
            presence,
            handedness,
        }
    }

    #[inline]
    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }

    /// Returns the landmark with identifier `idx`, if this set contains it.
    pub fn point(&self, idx: LandmarkIdx) -> Option<&LandmarkPoint> {
        self.points.get(idx as usize)
    }

    /// Returns the network's confidence that this is actually a hand.
    #[inline]
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the estimated handedness.
    ///
    /// This assumes that the camera image is passed in as-is (not mirrored).
    #[inline]
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Scales every landmark to pixel coordinates of a frame of size `res`.
    pub fn to_pixels(&self, res: Resolution) -> Vec<PixelPoint> {
        self.points.iter().map(|p| p.to_pixels(res)).collect()
    }

    /// Returns the normalized bounding box `(min_x, min_y, max_x, max_y)` of all landmarks.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        self.points.iter().fold(None, |acc, p| {
            Some(match acc {
                None => (p.x, p.y, p.x, p.y),
                Some((x0, y0, x1, y1)) => (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
            })
        })
    }

    /// Draws the landmarks and the lines in `connections` onto `frame`.
    ///
    /// Connections that refer to a landmark this set does not have are skipped.
    pub fn draw(&self, frame: &mut Frame, connections: &[(LandmarkIdx, LandmarkIdx)]) {
        let res = frame.resolution();
        let px = self.to_pixels(res);

        for &(a, b) in connections {
            let (Some(a), Some(b)) = (px.get(a as usize), px.get(b as usize)) else {
                continue;
            };
            draw::line(
                frame,
                a.x.round() as i32,
                a.y.round() as i32,
                b.x.round() as i32,
                b.y.round() as i32,
            )
            .color(CONNECTION_COLOR)
            .stroke_width(2);
        }
        for p in &px {
            draw::circle(frame, p.x.round() as i32, p.y.round() as i32, 5)
                .color(LANDMARK_COLOR)
                .fill(LANDMARK_COLOR);
        }
    }
}

const LANDMARK_COLOR: Color = Color::RED;
const CONNECTION_COLOR: Color = Color::WHITE;

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// The lines drawn between landmarks to form the hand skeleton.
pub const HAND_CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm:
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn centered_hand() -> HandLandmarks {
        HandLandmarks::new(
            (0..NUM_LANDMARKS).map(|i| [0.4 + i as f32 * 0.01, 0.5, 0.0]),
            0.9,
            Handedness::Right,
        )
    }

    #[test]
    fn scales_to_pixels() {
        let p = LandmarkPoint {
            id: 3,
            x: 0.5,
            y: 0.5,
            z: -0.1,
        };
        let px = p.to_pixels(Resolution::RES_480P);
        assert_eq!(px.id, 3);
        assert_relative_eq!(px.x, 320.0);
        assert_relative_eq!(px.y, 240.0);
    }

    #[test]
    fn ids_follow_order() {
        let hand = centered_hand();
        assert_eq!(hand.points().len(), NUM_LANDMARKS);
        for (i, p) in hand.points().iter().enumerate() {
            assert_eq!(p.id, i);
        }
        assert_eq!(hand.point(LandmarkIdx::PinkyTip).unwrap().id, 20);
    }

    #[test]
    fn bounds() {
        let hand = centered_hand();
        let (x0, y0, x1, y1) = hand.bounds().unwrap();
        assert_relative_eq!(x0, 0.4);
        assert_relative_eq!(x1, 0.6, epsilon = 1e-6);
        assert_relative_eq!(y0, 0.5);
        assert_relative_eq!(y1, 0.5);

        let empty = HandLandmarks::new([], 0.0, Handedness::Left);
        assert!(empty.bounds().is_none());
    }

    #[test]
    fn connections_cover_every_landmark() {
        let mut seen = [false; NUM_LANDMARKS];
        for &(a, b) in HAND_CONNECTIONS {
            seen[a as usize] = true;
            seen[b as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn draw_skips_missing_landmarks() {
        let mut frame = Frame::new(64, 64);
        let partial = HandLandmarks::new([[0.5, 0.5, 0.0]], 1.0, Handedness::Left);
        partial.draw(&mut frame, HAND_CONNECTIONS);
        assert_eq!(frame.get(32, 32), LANDMARK_COLOR);
    }
}
