//! The per-timestamp sample aggregate.

use std::collections::BTreeMap;

use crate::types::{CameraFrameGroup, ImuStream, SemidensePoints, TrajectoryStream};

/// One timestamp-aligned bundle of sensor data plus ground truth.
///
/// Built once per queried timestamp by an external sample builder and
/// immutable afterwards. The aggregate exclusively owns its sensor
/// sub-structures; ground-truth values are opaque structured payloads that
/// this crate never interprets.
#[derive(Debug, Clone, Default)]
pub struct CaptureSample {
    pub camera_rgb: Option<CameraFrameGroup>,
    pub camera_slam_left: Option<CameraFrameGroup>,
    pub camera_slam_right: Option<CameraFrameGroup>,
    pub trajectory: Option<TrajectoryStream>,
    pub imu_left: Option<ImuStream>,
    pub semidense_points: Option<SemidensePoints>,
    /// Free-form ground-truth mapping, e.g. 2D/3D bounding-box annotations.
    pub gt_data: BTreeMap<String, serde_json::Value>,
}

impl CaptureSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// The camera groups present on this sample, in a fixed order.
    pub fn camera_groups(&self) -> impl Iterator<Item = &CameraFrameGroup> {
        [
            self.camera_rgb.as_ref(),
            self.camera_slam_left.as_ref(),
            self.camera_slam_right.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_groups_skips_absent_slots() {
        let sample = CaptureSample {
            camera_rgb: Some(CameraFrameGroup {
                camera_label: "camera-rgb".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let labels: Vec<_> = sample.camera_groups().map(|g| g.camera_label.as_str()).collect();
        assert_eq!(labels, vec!["camera-rgb"]);
    }
}
