use pose_pipeline::config::EstimatorConfig;
use pose_pipeline::estimator::KEYPOINT_COUNT;
use pose_pipeline::{EstimatorError, Frame, Keypoint, Pose, PoseEstimator};

/// Joint layout of an upright figure, in half-extents of the bright region.
const TEMPLATE: [(f32, f32); KEYPOINT_COUNT] = [
    (0.0, -0.85),   // nose
    (0.0, -0.65),   // neck
    (-0.35, -0.6),  // right shoulder
    (-0.5, -0.3),   // right elbow
    (-0.55, 0.0),   // right wrist
    (0.35, -0.6),   // left shoulder
    (0.5, -0.3),    // left elbow
    (0.55, 0.0),    // left wrist
    (-0.2, 0.05),   // right hip
    (-0.22, 0.45),  // right knee
    (-0.24, 0.85),  // right ankle
    (0.2, 0.05),    // left hip
    (0.22, 0.45),   // left knee
    (0.24, 0.85),   // left ankle
    (-0.05, -0.9),  // right eye
    (0.05, -0.9),   // left eye
    (-0.12, -0.87), // right ear
    (0.12, -0.87),  // left ear
];

/// Pixels this much brighter than the frame mean count as foreground.
const FOREGROUND_MARGIN: f32 = 16.0;

/// Stand-in estimator for running the pipeline without a model: fits one
/// stick figure onto the brightest region of the frame.
#[derive(Debug, Default)]
pub struct DemoEstimator {
    input: Option<(u32, u32)>,
    min_fraction: f32,
    pending: Option<Vec<Pose>>,
}

impl DemoEstimator {
    pub fn new() -> Self {
        Self {
            min_fraction: 0.01,
            ..Self::default()
        }
    }

    fn fit(&self, frame: &Frame) -> Vec<Pose> {
        let pixels = (frame.width as usize) * (frame.height as usize);
        if pixels == 0 {
            return Vec::new();
        }
        let luma: Vec<f32> = frame
            .data
            .chunks_exact(3)
            .map(|bgr| 0.114 * bgr[0] as f32 + 0.587 * bgr[1] as f32 + 0.299 * bgr[2] as f32)
            .collect();
        let mean = luma.iter().sum::<f32>() / luma.len() as f32;

        let (mut count, mut sx, mut sy, mut sxx, mut syy) = (0f32, 0f32, 0f32, 0f32, 0f32);
        for (i, value) in luma.iter().enumerate() {
            if *value < mean + FOREGROUND_MARGIN {
                continue;
            }
            let x = (i % frame.width as usize) as f32;
            let y = (i / frame.width as usize) as f32;
            count += 1.0;
            sx += x;
            sy += y;
            sxx += x * x;
            syy += y * y;
        }
        let fraction = count / pixels as f32;
        if fraction < self.min_fraction {
            return Vec::new();
        }

        let (cx, cy) = (sx / count, sy / count);
        let half_w = 2.0 * (sxx / count - cx * cx).max(1.0).sqrt();
        let half_h = 2.0 * (syy / count - cy * cy).max(1.0).sqrt();
        let (w, h) = (frame.width as f32, frame.height as f32);

        let mut pose = Pose::empty(fraction.min(1.0));
        for (slot, (dx, dy)) in pose.keypoints.iter_mut().zip(TEMPLATE) {
            let x = cx + dx * half_w;
            let y = cy + dy * half_h;
            if (0.0..w).contains(&x) && (0.0..h).contains(&y) {
                *slot = Some(Keypoint { x, y });
            }
        }
        vec![pose]
    }
}

impl PoseEstimator for DemoEstimator {
    fn name(&self) -> String {
        "demo".into()
    }

    fn load(&mut self, config: &EstimatorConfig) -> Result<(), EstimatorError> {
        tracing::info!(
            model = %config.model_path().display(),
            "demo estimator ignores model weights"
        );
        Ok(())
    }

    fn reshape(&mut self, frame: &Frame) -> Result<(), EstimatorError> {
        let dims = (frame.width, frame.height);
        if self.input != Some(dims) {
            tracing::debug!(width = dims.0, height = dims.1, "reshaping demo input");
            self.input = Some(dims);
        }
        Ok(())
    }

    fn submit(&mut self, frame: &Frame) -> Result<(), EstimatorError> {
        if frame.is_empty() {
            return Err(EstimatorError::Inference("empty frame".into()));
        }
        self.pending = Some(self.fit(frame));
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        self.pending.is_some()
    }

    fn collect_results(&mut self) -> Result<Vec<Pose>, EstimatorError> {
        self.pending
            .take()
            .ok_or_else(|| EstimatorError::Inference("no request in flight".into()))
    }
}
