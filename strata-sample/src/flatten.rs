//! Table-driven flattening encoder.
//!
//! Turns a [`CaptureSample`] into a flat key→payload mapping ready for
//! shard archival. Keys follow the archive grammar
//! `<Tag>#<Instance>+<field>.<ext>` (instance-less entities drop the
//! `<Instance>+` part), with the extension fixed by each field's
//! classification, never by its runtime value.
//!
//! Each entity declares a `const` encoding table mapping field name to
//! classification. A table entry the entity cannot produce fails with
//! [`FlattenError::ContractViolation`] so that schema drift is caught
//! immediately instead of silently dropping data.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::payload::{ImagePayload, Payload, PayloadError, TensorData};
use crate::sample::CaptureSample;
use crate::types::{CameraFrameGroup, ImuStream, SampleError, SemidensePoints, TrajectoryStream};

/// Fixed key under which the ground-truth mapping is emitted.
pub const GT_KEY: &str = "GtData.json";

/// Archive tag for camera frame groups (instance = camera label).
pub const CAMERA_TAG: &str = "MFCD";
/// Archive tag for the trajectory stream.
pub const TRAJECTORY_TAG: &str = "MTD";
/// Archive tag for IMU streams (instance = imu label).
pub const IMU_TAG: &str = "IMU";
/// Archive tag for semidense point data.
pub const SEMIDENSE_TAG: &str = "MSDPD";

/// Errors raised by the flattening encoder.
#[derive(Debug, Error)]
pub enum FlattenError {
    /// A field appears in an entity's encoding table but the entity declares
    /// no rule to produce it. Signals a schema/code mismatch.
    #[error("entity `{entity}` declares no encoding rule for field `{field}`")]
    ContractViolation {
        entity: &'static str,
        field: &'static str,
    },

    #[error(transparent)]
    Invalid(#[from] SampleError),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Classification of a flattenable field. Drives both the payload encoding
/// and the key extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Per-frame JPEG images with frame-index key suffixes.
    Image,
    /// Bincode tensor blob.
    Blob,
    /// Plain text.
    Text,
}

impl FieldKind {
    fn extension(self) -> &'static str {
        match self {
            FieldKind::Image => "jpeg",
            FieldKind::Blob => "bin",
            FieldKind::Text => "txt",
        }
    }
}

/// A field value pulled out of an entity, before wire encoding.
enum FieldValue {
    Tensor(TensorData),
    Text(String),
}

const CAMERA_FIELDS: &[(&str, FieldKind)] = &[
    ("images", FieldKind::Image),
    ("capture_timestamps_ns", FieldKind::Blob),
    ("frame_ids", FieldKind::Blob),
    ("device_from_camera", FieldKind::Blob),
    ("projection_params", FieldKind::Blob),
    ("camera_label", FieldKind::Text),
    ("camera_model_name", FieldKind::Text),
    ("origin_camera_label", FieldKind::Text),
];

const TRAJECTORY_FIELDS: &[(&str, FieldKind)] = &[
    ("world_from_device", FieldKind::Blob),
    ("capture_timestamps_ns", FieldKind::Blob),
    ("gravity_in_world", FieldKind::Blob),
];

const IMU_FIELDS: &[(&str, FieldKind)] = &[
    ("raw_accel", FieldKind::Blob),
    ("raw_gyro", FieldKind::Blob),
    ("capture_timestamps_ns", FieldKind::Blob),
    ("rectified_accel", FieldKind::Blob),
    ("rectified_gyro", FieldKind::Blob),
    ("device_from_imu", FieldKind::Blob),
    ("accel_rect_matrix", FieldKind::Blob),
    ("accel_rect_bias", FieldKind::Blob),
    ("gyro_rect_matrix", FieldKind::Blob),
    ("gyro_rect_bias", FieldKind::Blob),
    ("imu_label", FieldKind::Text),
];

const SEMIDENSE_FIELDS: &[(&str, FieldKind)] = &[
    ("points_world", FieldKind::Blob),
    ("points_inv_dist_std", FieldKind::Blob),
];

fn text_value(value: &str) -> Option<FieldValue> {
    // Empty strings are treated as absent.
    if value.is_empty() {
        None
    } else {
        Some(FieldValue::Text(value.to_string()))
    }
}

fn field_key(tag: &str, instance: Option<&str>, field: &str, ext: &str) -> String {
    match instance {
        Some(instance) => format!("{tag}#{instance}+{field}.{ext}"),
        None => format!("{tag}#{field}.{ext}"),
    }
}

fn insert_field(
    out: &mut BTreeMap<String, Payload>,
    tag: &str,
    instance: Option<&str>,
    field: &str,
    kind: FieldKind,
    value: FieldValue,
) -> Result<(), FlattenError> {
    let payload = match value {
        FieldValue::Tensor(tensor) => Payload::tensor(&tensor)?,
        FieldValue::Text(text) => Payload::Text(text),
    };
    out.insert(field_key(tag, instance, field, kind.extension()), payload);
    Ok(())
}

impl CameraFrameGroup {
    fn field_value(&self, field: &'static str) -> Result<Option<FieldValue>, FlattenError> {
        let value = match field {
            "capture_timestamps_ns" => self
                .capture_timestamps_ns
                .as_ref()
                .map(|t| FieldValue::Tensor(TensorData::I64(t.clone().into_dyn()))),
            "frame_ids" => self
                .frame_ids
                .as_ref()
                .map(|t| FieldValue::Tensor(TensorData::I64(t.clone().into_dyn()))),
            "device_from_camera" => self
                .device_from_camera
                .as_ref()
                .map(|t| FieldValue::Tensor(TensorData::F32(t.clone().into_dyn()))),
            "projection_params" => self
                .projection_params
                .as_ref()
                .map(|t| FieldValue::Tensor(TensorData::F32(t.clone().into_dyn()))),
            "camera_label" => text_value(&self.camera_label),
            "camera_model_name" => text_value(&self.camera_model_name),
            "origin_camera_label" => text_value(&self.origin_camera_label),
            _ => {
                return Err(FlattenError::ContractViolation {
                    entity: "camera frame group",
                    field,
                })
            }
        };
        Ok(value)
    }
}

impl TrajectoryStream {
    fn field_value(&self, field: &'static str) -> Result<Option<FieldValue>, FlattenError> {
        let value = match field {
            "world_from_device" => self
                .world_from_device
                .as_ref()
                .map(|t| FieldValue::Tensor(TensorData::F32(t.clone().into_dyn()))),
            "capture_timestamps_ns" => self
                .capture_timestamps_ns
                .as_ref()
                .map(|t| FieldValue::Tensor(TensorData::I64(t.clone().into_dyn()))),
            "gravity_in_world" => self
                .gravity_in_world
                .as_ref()
                .map(|t| FieldValue::Tensor(TensorData::F32(t.clone().into_dyn()))),
            _ => {
                return Err(FlattenError::ContractViolation {
                    entity: "trajectory stream",
                    field,
                })
            }
        };
        Ok(value)
    }
}

impl ImuStream {
    fn field_value(&self, field: &'static str) -> Result<Option<FieldValue>, FlattenError> {
        fn f32_tensor<D: ndarray::Dimension>(
            t: &Option<ndarray::Array<f32, D>>,
        ) -> Option<FieldValue> {
            t.as_ref()
                .map(|t| FieldValue::Tensor(TensorData::F32(t.clone().into_dyn())))
        }
        let value = match field {
            "raw_accel" => f32_tensor(&self.raw_accel),
            "raw_gyro" => f32_tensor(&self.raw_gyro),
            "capture_timestamps_ns" => self
                .capture_timestamps_ns
                .as_ref()
                .map(|t| FieldValue::Tensor(TensorData::I64(t.clone().into_dyn()))),
            "rectified_accel" => f32_tensor(&self.rectified_accel),
            "rectified_gyro" => f32_tensor(&self.rectified_gyro),
            "device_from_imu" => f32_tensor(&self.device_from_imu),
            "accel_rect_matrix" => f32_tensor(&self.accel_rect_matrix),
            "accel_rect_bias" => f32_tensor(&self.accel_rect_bias),
            "gyro_rect_matrix" => f32_tensor(&self.gyro_rect_matrix),
            "gyro_rect_bias" => f32_tensor(&self.gyro_rect_bias),
            "imu_label" => text_value(&self.imu_label),
            _ => {
                return Err(FlattenError::ContractViolation {
                    entity: "imu stream",
                    field,
                })
            }
        };
        Ok(value)
    }
}

impl SemidensePoints {
    fn field_value(&self, field: &'static str) -> Result<Option<FieldValue>, FlattenError> {
        let value = match field {
            "points_world" => Some(FieldValue::Tensor(TensorData::RaggedF32(
                self.points_world.iter().map(|t| Some(t.clone().into_dyn())).collect(),
            ))),
            "points_inv_dist_std" => Some(FieldValue::Tensor(TensorData::RaggedF32(
                self.points_inv_dist_std.iter().map(|t| Some(t.clone().into_dyn())).collect(),
            ))),
            _ => {
                return Err(FlattenError::ContractViolation {
                    entity: "semidense points",
                    field,
                })
            }
        };
        Ok(value)
    }
}

fn flatten_camera(
    group: &CameraFrameGroup,
    out: &mut BTreeMap<String, Payload>,
) -> Result<(), FlattenError> {
    if !group.is_populated() {
        return Ok(());
    }
    group.validate()?;

    let label = group.camera_label.as_str();
    for &(field, kind) in CAMERA_FIELDS {
        match kind {
            FieldKind::Image => {
                let Some(images) = group.images.as_ref() else {
                    continue;
                };
                // Frame-major [K, C, W, H] to one pixel-major frame per key.
                for (i, frame) in images.outer_iter().enumerate() {
                    let key = format!("{CAMERA_TAG}#{label}+{field}_{i}.jpeg");
                    out.insert(
                        key,
                        Payload::Image(ImagePayload::from_channel_major(frame.to_owned())),
                    );
                }
            }
            FieldKind::Blob | FieldKind::Text => {
                let Some(value) = group.field_value(field)? else {
                    continue;
                };
                insert_field(out, CAMERA_TAG, Some(label), field, kind, value)?;
            }
        }
    }
    Ok(())
}

fn flatten_trajectory(
    traj: &TrajectoryStream,
    out: &mut BTreeMap<String, Payload>,
) -> Result<(), FlattenError> {
    traj.validate()?;
    for &(field, kind) in TRAJECTORY_FIELDS {
        let Some(value) = traj.field_value(field)? else {
            continue;
        };
        insert_field(out, TRAJECTORY_TAG, None, field, kind, value)?;
    }
    Ok(())
}

fn flatten_imu(imu: &ImuStream, out: &mut BTreeMap<String, Payload>) -> Result<(), FlattenError> {
    if !imu.is_populated() {
        return Ok(());
    }
    imu.validate()?;
    for &(field, kind) in IMU_FIELDS {
        let Some(value) = imu.field_value(field)? else {
            continue;
        };
        insert_field(out, IMU_TAG, Some(&imu.imu_label), field, kind, value)?;
    }
    Ok(())
}

fn flatten_semidense(
    points: &SemidensePoints,
    out: &mut BTreeMap<String, Payload>,
) -> Result<(), FlattenError> {
    if points.is_empty() {
        return Ok(());
    }
    points.validate()?;
    for &(field, kind) in SEMIDENSE_FIELDS {
        let Some(value) = points.field_value(field)? else {
            continue;
        };
        insert_field(out, SEMIDENSE_TAG, None, field, kind, value)?;
    }
    Ok(())
}

impl CaptureSample {
    /// Flatten into a key→payload mapping with globally unique keys.
    ///
    /// Absent entities and empty fields contribute zero keys. The
    /// ground-truth mapping is emitted verbatim under [`GT_KEY`].
    pub fn flatten(&self) -> Result<BTreeMap<String, Payload>, FlattenError> {
        let mut out = BTreeMap::new();

        for group in self.camera_groups() {
            flatten_camera(group, &mut out)?;
        }
        if let Some(traj) = &self.trajectory {
            flatten_trajectory(traj, &mut out)?;
        }
        if let Some(imu) = &self.imu_left {
            flatten_imu(imu, &mut out)?;
        }
        if let Some(points) = &self.semidense_points {
            flatten_semidense(points, &mut out)?;
        }
        if !self.gt_data.is_empty() {
            let gt = serde_json::Value::Object(
                self.gt_data.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            );
            out.insert(GT_KEY.to_string(), Payload::Json(gt));
        }

        debug!(keys = out.len(), "flattened capture sample");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3, Array4};

    fn rgb_group(label: &str, frames: usize) -> CameraFrameGroup {
        CameraFrameGroup {
            images: Some(Array4::from_elem((frames, 3, 4, 4), 7)),
            capture_timestamps_ns: Some(Array1::from_iter(0..frames as i64)),
            frame_ids: Some(Array1::from_iter(100..100 + frames as i64)),
            device_from_camera: Some(Array3::zeros((frames, 3, 4))),
            projection_params: Some(Array1::from(vec![500.0, 500.0, 320.0, 240.0])),
            camera_label: label.to_string(),
            camera_model_name: "pinhole".to_string(),
            origin_camera_label: label.to_string(),
        }
    }

    #[test]
    fn test_camera_group_key_count() {
        let sample = CaptureSample {
            camera_rgb: Some(rgb_group("camera-rgb", 2)),
            ..Default::default()
        };
        let flat = sample.flatten().unwrap();
        // 2 image keys + 4 blob fields + 3 text fields
        assert_eq!(flat.len(), 9);
        assert!(flat.contains_key("MFCD#camera-rgb+images_0.jpeg"));
        assert!(flat.contains_key("MFCD#camera-rgb+images_1.jpeg"));
        assert!(flat.contains_key("MFCD#camera-rgb+capture_timestamps_ns.bin"));
        assert!(flat.contains_key("MFCD#camera-rgb+camera_label.txt"));
    }

    #[test]
    fn test_empty_label_group_contributes_zero_keys() {
        let mut group = rgb_group("", 2);
        group.camera_label.clear();
        let sample = CaptureSample {
            camera_rgb: Some(group),
            ..Default::default()
        };
        assert!(sample.flatten().unwrap().is_empty());
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let mut group = rgb_group("camera-slam-left", 1);
        group.images = None;
        group.camera_model_name.clear();
        let sample = CaptureSample {
            camera_slam_left: Some(group),
            ..Default::default()
        };
        let flat = sample.flatten().unwrap();
        // 4 blob fields + 2 non-empty text fields, no image keys
        assert_eq!(flat.len(), 6);
        assert!(!flat.keys().any(|k| k.contains("images")));
        assert!(!flat.contains_key("MFCD#camera-slam-left+camera_model_name.txt"));
    }

    #[test]
    fn test_trajectory_and_gt_keys() {
        let sample = CaptureSample {
            trajectory: Some(TrajectoryStream {
                world_from_device: Some(Array3::zeros((2, 3, 4))),
                capture_timestamps_ns: Some(Array1::from(vec![10, 20])),
                gravity_in_world: Some(Array1::from(vec![0.0, 0.0, -9.81])),
            }),
            gt_data: [("obb3_gt".to_string(), serde_json::json!({"boxes": []}))]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let flat = sample.flatten().unwrap();
        assert!(flat.contains_key("MTD#world_from_device.bin"));
        assert!(flat.contains_key("MTD#capture_timestamps_ns.bin"));
        assert!(flat.contains_key("MTD#gravity_in_world.bin"));
        assert!(matches!(flat.get(GT_KEY), Some(Payload::Json(_))));
        assert_eq!(flat.len(), 4);
    }

    #[test]
    fn test_blob_fields_round_trip() {
        let sample = CaptureSample {
            camera_rgb: Some(rgb_group("camera-rgb", 1)),
            ..Default::default()
        };
        let flat = sample.flatten().unwrap();
        let decoded = flat
            .get("MFCD#camera-rgb+projection_params.bin")
            .unwrap()
            .decode_tensor()
            .unwrap();
        assert_eq!(
            decoded,
            TensorData::F32(Array1::from(vec![500.0f32, 500.0, 320.0, 240.0]).into_dyn())
        );
    }

    #[test]
    fn test_two_cameras_do_not_collide() {
        let sample = CaptureSample {
            camera_rgb: Some(rgb_group("camera-rgb", 1)),
            camera_slam_left: Some(rgb_group("camera-slam-left", 1)),
            ..Default::default()
        };
        let flat = sample.flatten().unwrap();
        assert_eq!(flat.len(), 16);
    }

    #[test]
    fn test_imu_and_semidense_keys() {
        let sample = CaptureSample {
            imu_left: Some(ImuStream {
                raw_accel: Some(ndarray::Array2::zeros((5, 3))),
                capture_timestamps_ns: Some(Array1::from_iter(0..5)),
                imu_label: "imu-left".to_string(),
                ..Default::default()
            }),
            semidense_points: Some(SemidensePoints {
                points_world: vec![ndarray::Array2::zeros((7, 3))],
                points_inv_dist_std: vec![Array1::zeros(7)],
            }),
            ..Default::default()
        };
        let flat = sample.flatten().unwrap();
        assert!(flat.contains_key("IMU#imu-left+raw_accel.bin"));
        assert!(flat.contains_key("IMU#imu-left+imu_label.txt"));
        assert!(flat.contains_key("MSDPD#points_world.bin"));
        assert!(flat.contains_key("MSDPD#points_inv_dist_std.bin"));
        assert_eq!(flat.len(), 5);
    }

    #[test]
    fn test_invalid_group_fails_flattening() {
        let mut group = rgb_group("camera-rgb", 2);
        group.frame_ids = Some(Array1::from(vec![1, 2, 3]));
        let sample = CaptureSample {
            camera_rgb: Some(group),
            ..Default::default()
        };
        assert!(matches!(sample.flatten(), Err(FlattenError::Invalid(_))));
    }
}
