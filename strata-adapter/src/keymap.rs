//! Archive-key selection and renaming, plus typed sample reconstitution.
//!
//! Shard archives store flattened samples under archive-native keys. Before
//! the pipeline runs, a table-driven [`KeyMap`] filters the entries down to
//! the ones a given training adapter needs and renames them to the fixed
//! internal schema. [`FlatSample::from_entries`] then lifts the renamed
//! payload map into typed tensors.

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array1, Array2, Array3, Array4};
use strata_sample::payload::{Payload, TensorData};
use tracing::warn;

use crate::pipeline::AdapterError;

/// Archive-native → internal key table for the RGB detection stream.
const RGB_DETECTION_TABLE: &[(&str, &str)] = &[
    ("f#214-1+image", "images"),
    ("f#214-1+camera_parameters", "camera_params"),
    ("f#214-1+ts_camera_object", "ts_camera_object"),
    ("f#214-1+object_dimensions", "object_dimensions"),
    ("f#214-1+bb2ds", "bb2ds_x0x1y0y1"),
    ("f#214-1+object_category_ids", "object_category_ids"),
    ("f#214-1+object_instance_ids", "object_instance_ids"),
    ("f#214-1+sequence_name", "sequence_name"),
    ("f#214-1+frame_id", "frame_id"),
    ("f#214-1+timestamp_ns", "timestamp_ns"),
];

/// A key-selection predicate and rename function in one table.
#[derive(Debug, Clone)]
pub struct KeyMap {
    entries: HashMap<String, String>,
}

impl KeyMap {
    /// Table for the RGB camera detection stream.
    pub fn rgb_detection() -> Self {
        Self::from_table(RGB_DETECTION_TABLE)
    }

    pub fn from_table(table: &[(&str, &str)]) -> Self {
        Self {
            entries: table.iter().map(|&(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    /// Whether an archive key is wanted by this adapter.
    pub fn selects(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Rename an archive key; unknown keys pass through unchanged.
    pub fn remap(&self, key: &str) -> String {
        self.entries.get(key).cloned().unwrap_or_else(|| key.to_string())
    }

    /// Filter and rename a reloaded flattened sample in one pass.
    pub fn apply(&self, entries: BTreeMap<String, Payload>) -> BTreeMap<String, Payload> {
        entries
            .into_iter()
            .filter(|(key, _)| self.selects(key))
            .map(|(key, payload)| (self.remap(&key), payload))
            .collect()
    }
}

/// A reloaded, key-remapped flattened sample with the fixed internal schema.
///
/// All per-frame lists are index-aligned with the K frames of `images`;
/// `None` entries mark frames without annotations.
#[derive(Debug, Clone)]
pub struct FlatSample {
    /// `[K, C, width, height]`, values in `[0, 1]`.
    pub images: Array4<f32>,
    /// `[K, 4]` pinhole parameters (fx, fy, cx, cy).
    pub camera_params: Array2<f32>,
    /// Per frame: `[N, 3, 4]` object-from-camera transforms.
    pub ts_camera_object: Vec<Option<Array3<f32>>>,
    /// Per frame: `[N, 3]` object dimensions (x, y, z).
    pub object_dimensions: Vec<Option<Array2<f32>>>,
    /// Per frame: `[N, 4]` 2D boxes in (x0, x1, y0, y1) order.
    pub bb2ds_x0x1y0y1: Vec<Option<Array2<f32>>>,
    /// Per frame: semantic category id per object. Carried for schema
    /// completeness; instance-based detection keys off the instance ids.
    pub object_category_ids: Vec<Option<Vec<i64>>>,
    /// Per frame: instance id per object.
    pub object_instance_ids: Vec<Option<Vec<i64>>>,
    /// Per frame: stored sequence path (shard-tar component included).
    pub sequence_name: Vec<String>,
    /// `[K]` source frame ids.
    pub frame_id: Array1<i64>,
    /// `[K]` capture timestamps.
    pub timestamp_ns: Array1<i64>,
}

fn decode_tensor(
    entries: &BTreeMap<String, Payload>,
    field: &'static str,
) -> Result<Option<TensorData>, AdapterError> {
    match entries.get(field) {
        Some(payload) => Ok(Some(payload.decode_tensor()?)),
        None => Ok(None),
    }
}

fn require_tensor(
    entries: &BTreeMap<String, Payload>,
    field: &'static str,
) -> Result<TensorData, AdapterError> {
    decode_tensor(entries, field)?.ok_or(AdapterError::MissingField(field))
}

fn ragged_f32<D>(
    entries: &BTreeMap<String, Payload>,
    field: &'static str,
    frames: usize,
) -> Result<Vec<Option<ndarray::Array<f32, D>>>, AdapterError>
where
    D: ndarray::Dimension,
{
    let Some(tensor) = decode_tensor(entries, field)? else {
        return Ok(vec![None; frames]);
    };
    let TensorData::RaggedF32(list) = tensor else {
        return Err(AdapterError::WrongPayload { field });
    };
    if list.len() != frames {
        warn!(field, frames, entries = list.len(), "annotation list length differs from frame count");
    }
    list.into_iter()
        .map(|entry| {
            entry
                .map(|t| {
                    t.into_dimensionality::<D>().map_err(|e| {
                        AdapterError::MalformedInput(format!("field `{field}`: {e}"))
                    })
                })
                .transpose()
        })
        .collect()
}

fn ragged_i64(
    entries: &BTreeMap<String, Payload>,
    field: &'static str,
    frames: usize,
) -> Result<Vec<Option<Vec<i64>>>, AdapterError> {
    let Some(tensor) = decode_tensor(entries, field)? else {
        return Ok(vec![None; frames]);
    };
    let TensorData::RaggedI64(list) = tensor else {
        return Err(AdapterError::WrongPayload { field });
    };
    Ok(list
        .into_iter()
        .map(|entry| entry.map(|t| t.into_iter().collect()))
        .collect())
}

impl FlatSample {
    /// Number of camera frames K.
    pub fn frame_count(&self) -> usize {
        self.images.shape()[0]
    }

    /// Lift a renamed payload map into typed tensors.
    ///
    /// `images`, `camera_params`, `sequence_name`, `frame_id` and
    /// `timestamp_ns` are required; annotation fields default to
    /// all-frames-absent when missing.
    pub fn from_entries(entries: &BTreeMap<String, Payload>) -> Result<Self, AdapterError> {
        let TensorData::F32(images) = require_tensor(entries, "images")? else {
            return Err(AdapterError::WrongPayload { field: "images" });
        };
        let images = images
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| AdapterError::MalformedInput(format!("field `images`: {e}")))?;
        let frames = images.shape()[0];

        let TensorData::F32(camera_params) = require_tensor(entries, "camera_params")? else {
            return Err(AdapterError::WrongPayload { field: "camera_params" });
        };
        let camera_params = camera_params
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| AdapterError::MalformedInput(format!("field `camera_params`: {e}")))?;

        let TensorData::I64(frame_id) = require_tensor(entries, "frame_id")? else {
            return Err(AdapterError::WrongPayload { field: "frame_id" });
        };
        let frame_id = frame_id
            .into_dimensionality::<ndarray::Ix1>()
            .map_err(|e| AdapterError::MalformedInput(format!("field `frame_id`: {e}")))?;

        let TensorData::I64(timestamp_ns) = require_tensor(entries, "timestamp_ns")? else {
            return Err(AdapterError::WrongPayload { field: "timestamp_ns" });
        };
        let timestamp_ns = timestamp_ns
            .into_dimensionality::<ndarray::Ix1>()
            .map_err(|e| AdapterError::MalformedInput(format!("field `timestamp_ns`: {e}")))?;

        let sequence_name = match entries.get("sequence_name") {
            Some(Payload::Json(serde_json::Value::Array(names))) => names
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or(AdapterError::WrongPayload { field: "sequence_name" })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(Payload::Text(name)) => vec![name.clone(); frames],
            Some(_) => return Err(AdapterError::WrongPayload { field: "sequence_name" }),
            None => return Err(AdapterError::MissingField("sequence_name")),
        };

        Ok(Self {
            images,
            camera_params,
            ts_camera_object: ragged_f32(entries, "ts_camera_object", frames)?,
            object_dimensions: ragged_f32(entries, "object_dimensions", frames)?,
            bb2ds_x0x1y0y1: ragged_f32(entries, "bb2ds_x0x1y0y1", frames)?,
            object_category_ids: ragged_i64(entries, "object_category_ids", frames)?,
            object_instance_ids: ragged_i64(entries, "object_instance_ids", frames)?,
            sequence_name,
            frame_id,
            timestamp_ns,
        })
    }
}
