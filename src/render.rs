//! Skeleton overlay drawn directly into a BGR8 frame.

use crate::estimator::{KEYPOINT_COUNT, Keypoint, Pose};
use crate::frame::Frame;

const JOINT_RADIUS: i64 = 4;
const LIMB_HALF_WIDTH: i64 = 1;

/// Joint pairs forming the limbs of the COCO-18 skeleton.
pub const LIMBS: [(usize, usize); 17] = [
    (1, 2), (1, 5), (2, 3), (3, 4), (5, 6), (6, 7), (1, 8), (8, 9), (9, 10),
    (1, 11), (11, 12), (12, 13), (1, 0), (0, 14), (14, 16), (0, 15), (15, 17),
];

/// One BGR colour per joint; limbs take the colour of their second joint.
pub const JOINT_COLORS: [[u8; 3]; KEYPOINT_COUNT] = [
    [255, 0, 0], [255, 85, 0], [255, 170, 0], [255, 255, 0], [170, 255, 0], [85, 255, 0],
    [0, 255, 0], [0, 255, 85], [0, 255, 170], [0, 255, 255], [0, 170, 255], [0, 85, 255],
    [0, 0, 255], [85, 0, 255], [170, 0, 255], [255, 0, 255], [255, 0, 170], [255, 0, 85],
];

pub fn draw_poses(poses: &[Pose], frame: &mut Frame) {
    if frame.is_empty() {
        return;
    }
    for pose in poses {
        for &(a, b) in LIMBS.iter() {
            if let (Some(from), Some(to)) = (pose.keypoints[a], pose.keypoints[b]) {
                draw_line(frame, from, to, JOINT_COLORS[b]);
            }
        }
        for (joint, keypoint) in pose.keypoints.iter().enumerate() {
            if let Some((x, y)) = keypoint.and_then(|point| joint_center(frame, point)) {
                fill_disc(frame, x, y, JOINT_RADIUS, JOINT_COLORS[joint]);
            }
        }
    }
}

/// Pixel position of a joint whose disc can touch the frame.
fn joint_center(frame: &Frame, point: Keypoint) -> Option<(i64, i64)> {
    let (x, y) = (point.x as f64, point.y as f64);
    let reach = JOINT_RADIUS as f64;
    let inside = |v: f64, extent: u32| v.is_finite() && v >= -reach && v <= extent as f64 + reach;
    (inside(x, frame.width) && inside(y, frame.height)).then(|| (x.round() as i64, y.round() as i64))
}

fn fill_disc(frame: &mut Frame, cx: i64, cy: i64, radius: i64, bgr: [u8; 3]) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                frame.put_pixel(cx + dx, cy + dy, bgr);
            }
        }
    }
}

/// Liang-Barsky clip of the segment to the frame rectangle. Non-finite
/// endpoints and segments that miss the frame yield `None`.
fn clip_segment(frame: &Frame, from: Keypoint, to: Keypoint) -> Option<((f64, f64), (f64, f64))> {
    let (x0, y0, x1, y1) = (from.x as f64, from.y as f64, to.x as f64, to.y as f64);
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (max_x, max_y) = (frame.width as f64 - 1.0, frame.height as f64 - 1.0);
    let (dx, dy) = (x1 - x0, y1 - y0);
    let (mut enter, mut exit) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, x0), (dx, max_x - x0), (-dy, y0), (dy, max_y - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            enter = enter.max(t);
        } else {
            exit = exit.min(t);
        }
        if enter > exit {
            return None;
        }
    }
    Some(((x0 + enter * dx, y0 + enter * dy), (x0 + exit * dx, y0 + exit * dy)))
}

// Bresenham over the clipped segment, thickened by stamping a small disc at
// every step.
fn draw_line(frame: &mut Frame, from: Keypoint, to: Keypoint, bgr: [u8; 3]) {
    let Some(((fx, fy), (tx, ty))) = clip_segment(frame, from, to) else {
        return;
    };
    let (mut x0, mut y0) = (fx.round() as i64, fy.round() as i64);
    let (x1, y1) = (tx.round() as i64, ty.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        fill_disc(frame, x0, y0, LIMB_HALF_WIDTH, bgr);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameHeader;

    #[test]
    fn joints_and_limbs_are_painted() {
        let mut frame = Frame::filled(40, 40, [0, 0, 0], FrameHeader::default());
        let mut pose = Pose::empty(1.0);
        pose.keypoints[1] = Some(Keypoint { x: 5.0, y: 20.0 });
        pose.keypoints[2] = Some(Keypoint { x: 35.0, y: 20.0 });
        draw_poses(&[pose], &mut frame);

        assert_eq!(frame.pixel(5, 20), Some(JOINT_COLORS[1]));
        assert_eq!(frame.pixel(35, 20), Some(JOINT_COLORS[2]));
        // Midpoint of limb (1, 2) carries the colour of joint 2.
        assert_eq!(frame.pixel(20, 20), Some(JOINT_COLORS[2]));
        assert_eq!(frame.pixel(20, 5), Some([0, 0, 0]));
    }

    #[test]
    fn keypoints_outside_the_frame_are_clipped() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0], FrameHeader::default());
        let mut pose = Pose::empty(1.0);
        pose.keypoints[0] = Some(Keypoint { x: -50.0, y: 500.0 });
        pose.keypoints[1] = Some(Keypoint { x: 5.0, y: 5.0 });
        draw_poses(&[pose], &mut frame);
        assert_eq!(frame.pixel(5, 5), Some(JOINT_COLORS[1]));
    }

    #[test]
    fn non_finite_keypoints_are_skipped() {
        let mut frame = Frame::filled(8, 8, [0, 0, 0], FrameHeader::default());
        let before = frame.checksum();
        let mut pose = Pose::empty(1.0);
        pose.keypoints[1] = Some(Keypoint { x: f32::NEG_INFINITY, y: 0.0 });
        pose.keypoints[2] = Some(Keypoint { x: f32::INFINITY, y: 0.0 });
        pose.keypoints[5] = Some(Keypoint { x: f32::NAN, y: 3.0 });
        draw_poses(&[pose], &mut frame);
        assert_eq!(frame.checksum(), before);
    }

    #[test]
    fn far_limbs_are_clipped_to_the_frame() {
        let mut frame = Frame::filled(8, 8, [0, 0, 0], FrameHeader::default());
        let mut pose = Pose::empty(1.0);
        pose.keypoints[1] = Some(Keypoint { x: -1e12, y: 4.0 });
        pose.keypoints[2] = Some(Keypoint { x: 1e12, y: 4.0 });
        // Misses the frame entirely.
        pose.keypoints[5] = Some(Keypoint { x: 1e12, y: 1e12 });
        draw_poses(&[pose], &mut frame);
        for x in 0..8 {
            assert_eq!(frame.pixel(x, 4), Some(JOINT_COLORS[2]));
        }
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
    }
}
