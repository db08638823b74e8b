//! Pinhole intrinsic matrix construction.

use glam::{Mat3, Vec3};
use ndarray::Array2;

use crate::pipeline::AdapterError;

/// Build a 3×3 pinhole intrinsic matrix from (fx, fy, cx, cy):
///
/// ```text
/// | fx  0  cx |
/// |  0 fy  cy |
/// |  0  0   1 |
/// ```
pub fn intrinsic_matrix(fx: f32, fy: f32, cx: f32, cy: f32) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(fx, 0.0, 0.0),
        Vec3::new(0.0, fy, 0.0),
        Vec3::new(cx, cy, 1.0),
    )
}

/// Build one intrinsic matrix per camera from a `[K, 4]` parameter tensor.
pub fn intrinsic_matrices(params: &Array2<f32>) -> Result<Vec<Mat3>, AdapterError> {
    if params.ncols() != 4 {
        return Err(AdapterError::MalformedInput(format!(
            "camera parameters must be [K, 4] (fx, fy, cx, cy), got {:?}",
            params.shape()
        )));
    }
    Ok(params
        .rows()
        .into_iter()
        .map(|p| intrinsic_matrix(p[0], p[1], p[2], p[3]))
        .collect())
}

/// Row-major nested-list form, for downstream serialization compatibility.
pub fn to_nested(k: &Mat3) -> [[f32; 3]; 3] {
    [k.row(0).to_array(), k.row(1).to_array(), k.row(2).to_array()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_intrinsic_matrix_layout() {
        let k = intrinsic_matrix(500.0, 500.0, 320.0, 240.0);
        assert_eq!(
            to_nested(&k),
            [[500.0, 0.0, 320.0], [0.0, 500.0, 240.0], [0.0, 0.0, 1.0]]
        );
    }

    #[test]
    fn test_projection_through_intrinsics() {
        let k = intrinsic_matrix(500.0, 500.0, 320.0, 240.0);
        let p = k * Vec3::new(0.0, 0.0, 1.0);
        // A point on the optical axis lands on the principal point.
        assert_eq!((p.x / p.z, p.y / p.z), (320.0, 240.0));
    }

    #[test]
    fn test_per_frame_matrices() {
        let params = arr2(&[[500.0, 500.0, 320.0, 240.0], [250.0, 260.0, 100.0, 80.0]]);
        let ks = intrinsic_matrices(&params).unwrap();
        assert_eq!(ks.len(), 2);
        assert_eq!(ks[1].row(1).to_array(), [0.0, 260.0, 80.0]);
    }

    #[test]
    fn test_wrong_parameter_count_is_rejected() {
        let params = Array2::<f32>::zeros((2, 3));
        assert!(matches!(
            intrinsic_matrices(&params),
            Err(AdapterError::MalformedInput(_))
        ));
    }
}
