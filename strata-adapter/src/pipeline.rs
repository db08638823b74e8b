//! The per-frame training-instance stream.
//!
//! [`TrainingInstances`] is a lazy, pull-based iterator adapter: for every
//! flattened sample drawn from its source it validates the image tensor,
//! builds per-frame intrinsics, applies the area/depth/category filters to
//! the frame's annotated objects, and yields one [`FrameRecord`] per camera
//! frame, in frame order. Structural errors are yielded as `Err` and abort
//! the current sample only; the driving loop decides whether to keep
//! pulling. Per-object filter exclusion is routine and silent.

use std::collections::VecDeque;
use std::path::Path;

use glam::Mat3;
use ndarray::{Array3, Array4};
use thiserror::Error;
use tracing::debug;

use crate::camera::{intrinsic_matrices, to_nested};
use crate::config::AdapterConfig;
use crate::keymap::FlatSample;

/// Errors raised by the adapter pipeline. All of these are fatal for the
/// sample being processed and are propagated, never swallowed.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("flattened sample is missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` holds an unexpected payload")]
    WrongPayload { field: &'static str },

    #[error(transparent)]
    Payload(#[from] strata_sample::PayloadError),
}

/// Filtered, annotated objects for one camera frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceSet {
    /// Remapped category id per object.
    pub classes: Vec<i64>,
    /// 2D boxes in (x0, y0, x1, y1) order.
    pub boxes_2d: Vec<[f32; 4]>,
    /// Full object-from-camera pose per object, row-major `[3, 4]` R|t.
    pub poses: Vec<[[f32; 4]; 3]>,
    /// 9-value box descriptor per object: projected center (2), depth (1),
    /// dimensions in reversed axis order (3), camera-frame translation (3).
    pub boxes_3d: Vec<[f32; 9]>,
}

impl InstanceSet {
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// One unbatched training record for a single camera frame.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// BGR u8 pixels, `[3, width, height]`.
    pub image: Array3<u8>,
    /// Row-major intrinsic matrix, nested-list form for downstream
    /// serialization compatibility.
    pub k: [[f32; 3]; 3],
    pub height: usize,
    pub width: usize,
    pub frame_id: i64,
    pub timestamp_ns: i64,
    /// Sequence name with the shard-tar component stripped.
    pub sequence_name: String,
    /// Absent (not empty) when the frame carries no annotations.
    pub instances: Option<InstanceSet>,
}

/// Last directory component of the stored sequence path, e.g.
/// `adt/seq42/shard-000.tar` → `seq42`.
fn sequence_stem(path: &str) -> String {
    Path::new(path)
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Reverse the channel axis (RGB→BGR) and rescale one frame to u8.
fn bgr_u8_frame(images: &Array4<f32>, idx: usize) -> Array3<u8> {
    let shape = images.shape();
    Array3::from_shape_fn((3, shape[2], shape[3]), |(c, x, y)| {
        (images[[idx, 2 - c, x, y]] * 255.0).clamp(0.0, 255.0) as u8
    })
}

fn frame_instances(
    sample: &FlatSample,
    idx: usize,
    k: &Mat3,
    config: &AdapterConfig,
) -> Result<Option<InstanceSet>, AdapterError> {
    let Some(bb2ds) = sample.bb2ds_x0x1y0y1[idx].as_ref() else {
        return Ok(None);
    };
    let ts = sample.ts_camera_object[idx].as_ref().ok_or_else(|| {
        AdapterError::MalformedInput(format!("frame {idx}: 2D boxes without object transforms"))
    })?;
    let dims = sample.object_dimensions[idx].as_ref().ok_or_else(|| {
        AdapterError::MalformedInput(format!("frame {idx}: 2D boxes without object dimensions"))
    })?;
    let ids = sample.object_instance_ids[idx].as_ref().ok_or_else(|| {
        AdapterError::MalformedInput(format!("frame {idx}: 2D boxes without instance ids"))
    })?;

    let n = bb2ds.nrows();
    if ts.shape()[0] != n || dims.nrows() != n || ids.len() != n {
        return Err(AdapterError::MalformedInput(format!(
            "frame {idx}: annotation tensors disagree on object count"
        )));
    }

    let mut set = InstanceSet::default();
    let mut dropped = 0usize;
    for obj in 0..n {
        // Stored order is (x0, x1, y0, y1); reorder to (x0, y0, x1, y1).
        let b = bb2ds.row(obj);
        let box_2d = [b[0], b[2], b[1], b[3]];
        let area = (box_2d[2] - box_2d[0]) * (box_2d[3] - box_2d[1]);

        let t = glam::Vec3::new(ts[[obj, 0, 3]], ts[[obj, 1, 3]], ts[[obj, 2, 3]]);
        let depth = t.z;
        let class = config.remap(ids[obj]);

        let keep = area > config.min_2d_area
            && depth >= config.min_depth
            && depth <= config.max_depth
            && class >= 0;
        if !keep {
            dropped += 1;
            continue;
        }

        let projected = *k * t;
        let projected = projected.truncate() / projected.z;
        let d = dims.row(obj);
        set.classes.push(class);
        set.boxes_2d.push(box_2d);
        set.poses.push([
            [ts[[obj, 0, 0]], ts[[obj, 0, 1]], ts[[obj, 0, 2]], ts[[obj, 0, 3]]],
            [ts[[obj, 1, 0]], ts[[obj, 1, 1]], ts[[obj, 1, 2]], ts[[obj, 1, 3]]],
            [ts[[obj, 2, 0]], ts[[obj, 2, 1]], ts[[obj, 2, 2]], ts[[obj, 2, 3]]],
        ]);
        set.boxes_3d.push([
            projected.x,
            projected.y,
            depth,
            d[2],
            d[1],
            d[0],
            t.x,
            t.y,
            t.z,
        ]);
    }

    debug!(frame = idx, kept = set.len(), dropped, "filtered frame annotations");
    Ok(Some(set))
}

/// Transform one flattened sample into per-frame records.
pub fn adapt_sample(
    sample: &FlatSample,
    config: &AdapterConfig,
) -> Result<Vec<FrameRecord>, AdapterError> {
    let shape = sample.images.shape();
    if shape[1] != 3 {
        return Err(AdapterError::MalformedInput(format!(
            "images must be [frames, 3, width, height], got {shape:?}"
        )));
    }
    let (frames, width, height) = (shape[0], shape[2], shape[3]);
    if sample.camera_params.nrows() != frames
        || sample.frame_id.len() != frames
        || sample.timestamp_ns.len() != frames
        || sample.sequence_name.len() != frames
    {
        return Err(AdapterError::MalformedInput(format!(
            "per-frame metadata disagrees with frame count {frames}"
        )));
    }
    if sample.bb2ds_x0x1y0y1.len() < frames
        || sample.ts_camera_object.len() < frames
        || sample.object_dimensions.len() < frames
        || sample.object_instance_ids.len() < frames
    {
        return Err(AdapterError::MalformedInput(format!(
            "annotation lists shorter than frame count {frames}"
        )));
    }

    let ks = intrinsic_matrices(&sample.camera_params)?;
    let mut records = Vec::with_capacity(frames);
    for idx in 0..frames {
        let instances = frame_instances(sample, idx, &ks[idx], config)?;
        records.push(FrameRecord {
            image: bgr_u8_frame(&sample.images, idx),
            k: to_nested(&ks[idx]),
            height,
            width,
            frame_id: sample.frame_id[idx],
            timestamp_ns: sample.timestamp_ns[idx],
            sequence_name: sequence_stem(&sample.sequence_name[idx]),
            instances,
        });
    }
    Ok(records)
}

/// Lazy stream of per-frame training records over a source of flattened
/// samples. Single-pass and non-restartable; holds no state across samples
/// beyond the read-only configuration.
pub struct TrainingInstances<I> {
    source: I,
    config: AdapterConfig,
    pending: VecDeque<FrameRecord>,
}

impl<I> TrainingInstances<I>
where
    I: Iterator<Item = FlatSample>,
{
    pub fn new(source: I, config: AdapterConfig) -> Self {
        Self {
            source,
            config,
            pending: VecDeque::new(),
        }
    }
}

impl<I> Iterator for TrainingInstances<I>
where
    I: Iterator<Item = FlatSample>,
{
    type Item = Result<FrameRecord, AdapterError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            let sample = self.source.next()?;
            match adapt_sample(&sample, &self.config) {
                Ok(records) => self.pending.extend(records),
                // Aborts this sample only; the driver decides whether to
                // keep pulling.
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Group records into a plain ordered batch, without merging.
pub fn collate_as_list<I: IntoIterator<Item = FrameRecord>>(records: I) -> Vec<FrameRecord> {
    records.into_iter().collect()
}
