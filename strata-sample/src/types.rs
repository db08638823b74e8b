//! Sensor data entities that make up a capture sample.
//!
//! These are CPU-side tensor containers filled in by an external sample
//! builder (timestamp-synchronized reads of the raw sensor containers) and
//! consumed by the flattening encoder. Every per-frame sequence within one
//! entity shares a common length.

use ndarray::{Array1, Array2, Array3, Array4};
use thiserror::Error;

/// Errors raised when an entity's index-aligned sequences disagree.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("{entity}: field `{field}` has length {actual}, expected {expected}")]
    LengthMismatch {
        entity: &'static str,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

fn check_len(
    entity: &'static str,
    field: &'static str,
    expected: &mut Option<usize>,
    actual: Option<usize>,
) -> Result<(), SampleError> {
    let Some(actual) = actual else {
        return Ok(());
    };
    match *expected {
        None => {
            *expected = Some(actual);
            Ok(())
        }
        Some(expected) if expected == actual => Ok(()),
        Some(expected) => Err(SampleError::LengthMismatch {
            entity,
            field,
            expected,
            actual,
        }),
    }
}

/// One camera's synchronized K-frame burst with fixed calibration.
///
/// Calibration fields (`camera_label`, `camera_model_name`,
/// `origin_camera_label`, `projection_params`) are invariant across the K
/// frames; `device_from_camera` is conceptually constant too but stored
/// per frame for uniformity with the other tensors.
///
/// An empty `camera_label` marks the group as absent: it is skipped by the
/// flattening encoder and contributes zero keys.
#[derive(Debug, Clone, Default)]
pub struct CameraFrameGroup {
    /// Raw pixels, frame-major: `[K, channels, width, height]`.
    pub images: Option<Array4<u8>>,
    /// Capture time per frame, length K.
    pub capture_timestamps_ns: Option<Array1<i64>>,
    /// Source frame index per frame, length K.
    pub frame_ids: Option<Array1<i64>>,
    /// Rigid device-from-camera transform per frame: `[K, 3, 4]` R|t.
    pub device_from_camera: Option<Array3<f32>>,
    /// Intrinsics parameter vector for the camera model.
    pub projection_params: Option<Array1<f32>>,
    pub camera_label: String,
    pub camera_model_name: String,
    /// Label of the camera that defines the device frame.
    pub origin_camera_label: String,
}

impl CameraFrameGroup {
    /// Whether the group carries data. Empty label means absent.
    pub fn is_populated(&self) -> bool {
        !self.camera_label.is_empty()
    }

    /// Number of frames K, if any per-frame tensor is present.
    pub fn frame_count(&self) -> Option<usize> {
        self.images
            .as_ref()
            .map(|t| t.shape()[0])
            .or_else(|| self.capture_timestamps_ns.as_ref().map(|t| t.len()))
            .or_else(|| self.frame_ids.as_ref().map(|t| t.len()))
            .or_else(|| self.device_from_camera.as_ref().map(|t| t.shape()[0]))
    }

    /// Check that all per-frame tensors agree on K.
    pub fn validate(&self) -> Result<(), SampleError> {
        const ENTITY: &str = "camera frame group";
        let mut k = None;
        check_len(ENTITY, "images", &mut k, self.images.as_ref().map(|t| t.shape()[0]))?;
        check_len(
            ENTITY,
            "capture_timestamps_ns",
            &mut k,
            self.capture_timestamps_ns.as_ref().map(|t| t.len()),
        )?;
        check_len(ENTITY, "frame_ids", &mut k, self.frame_ids.as_ref().map(|t| t.len()))?;
        check_len(
            ENTITY,
            "device_from_camera",
            &mut k,
            self.device_from_camera.as_ref().map(|t| t.shape()[0]),
        )?;
        Ok(())
    }
}

/// Raw and rectified IMU sequences plus rectification calibration.
#[derive(Debug, Clone, Default)]
pub struct ImuStream {
    /// Raw accelerometer samples, `[N, 3]`.
    pub raw_accel: Option<Array2<f32>>,
    /// Raw gyroscope samples, `[N, 3]`.
    pub raw_gyro: Option<Array2<f32>>,
    /// Capture time per sample, length N.
    pub capture_timestamps_ns: Option<Array1<i64>>,
    /// Rectified accelerometer samples, `[N, 3]`.
    pub rectified_accel: Option<Array2<f32>>,
    /// Rectified gyroscope samples, `[N, 3]`.
    pub rectified_gyro: Option<Array2<f32>>,
    /// Rigid device-from-IMU transform per sample: `[N, 3, 4]` R|t.
    pub device_from_imu: Option<Array3<f32>>,
    /// Accelerometer rectification matrix, `[3, 3]`.
    pub accel_rect_matrix: Option<Array2<f32>>,
    /// Accelerometer rectification bias, `[3]`.
    pub accel_rect_bias: Option<Array1<f32>>,
    /// Gyroscope rectification matrix, `[3, 3]`.
    pub gyro_rect_matrix: Option<Array2<f32>>,
    /// Gyroscope rectification bias, `[3]`.
    pub gyro_rect_bias: Option<Array1<f32>>,
    pub imu_label: String,
}

impl ImuStream {
    /// Whether the stream carries data. Empty label means absent.
    pub fn is_populated(&self) -> bool {
        !self.imu_label.is_empty()
    }

    /// Check that all per-sample sequences agree on N.
    pub fn validate(&self) -> Result<(), SampleError> {
        const ENTITY: &str = "imu stream";
        let mut n = None;
        check_len(ENTITY, "raw_accel", &mut n, self.raw_accel.as_ref().map(|t| t.nrows()))?;
        check_len(ENTITY, "raw_gyro", &mut n, self.raw_gyro.as_ref().map(|t| t.nrows()))?;
        check_len(
            ENTITY,
            "capture_timestamps_ns",
            &mut n,
            self.capture_timestamps_ns.as_ref().map(|t| t.len()),
        )?;
        check_len(
            ENTITY,
            "rectified_accel",
            &mut n,
            self.rectified_accel.as_ref().map(|t| t.nrows()),
        )?;
        check_len(
            ENTITY,
            "rectified_gyro",
            &mut n,
            self.rectified_gyro.as_ref().map(|t| t.nrows()),
        )?;
        check_len(
            ENTITY,
            "device_from_imu",
            &mut n,
            self.device_from_imu.as_ref().map(|t| t.shape()[0]),
        )?;
        Ok(())
    }
}

/// World-from-device trajectory with a single gravity vector.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryStream {
    /// Rigid world-from-device transform per timestamp: `[N, 3, 4]` R|t.
    pub world_from_device: Option<Array3<f32>>,
    /// Capture time per transform, length N.
    pub capture_timestamps_ns: Option<Array1<i64>>,
    /// Gravity direction in the world frame, `[3]`.
    pub gravity_in_world: Option<Array1<f32>>,
}

impl TrajectoryStream {
    /// Check that transforms and timestamps agree on N.
    pub fn validate(&self) -> Result<(), SampleError> {
        const ENTITY: &str = "trajectory stream";
        let mut n = None;
        check_len(
            ENTITY,
            "world_from_device",
            &mut n,
            self.world_from_device.as_ref().map(|t| t.shape()[0]),
        )?;
        check_len(
            ENTITY,
            "capture_timestamps_ns",
            &mut n,
            self.capture_timestamps_ns.as_ref().map(|t| t.len()),
        )?;
        Ok(())
    }
}

/// Ragged per-frame semidense point sets.
///
/// Both outer lists have one entry per frame; inner tensors are
/// independently sized. `points_inv_dist_std[i]` holds one inverse-distance
/// uncertainty per point in `points_world[i]`.
#[derive(Debug, Clone, Default)]
pub struct SemidensePoints {
    /// Observable world points per frame, each `[N_i, 3]`.
    pub points_world: Vec<Array2<f32>>,
    /// Per-point inverse-distance standard deviation, each `[N_i]`.
    pub points_inv_dist_std: Vec<Array1<f32>>,
}

impl SemidensePoints {
    pub fn is_empty(&self) -> bool {
        self.points_world.is_empty()
    }

    /// Check that the two lists align, frame by frame.
    pub fn validate(&self) -> Result<(), SampleError> {
        const ENTITY: &str = "semidense points";
        if self.points_world.len() != self.points_inv_dist_std.len() {
            return Err(SampleError::LengthMismatch {
                entity: ENTITY,
                field: "points_inv_dist_std",
                expected: self.points_world.len(),
                actual: self.points_inv_dist_std.len(),
            });
        }
        for (points, stds) in self.points_world.iter().zip(&self.points_inv_dist_std) {
            if points.nrows() != stds.len() {
                return Err(SampleError::LengthMismatch {
                    entity: ENTITY,
                    field: "points_inv_dist_std",
                    expected: points.nrows(),
                    actual: stds.len(),
                });
            }
        }
        Ok(())
    }
}
