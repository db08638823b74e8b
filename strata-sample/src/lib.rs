//! Strata Sample Crate
//!
//! Canonical data model for one timestamp-aligned bundle of multi-sensor
//! capture data (camera frame bursts, IMU, trajectory, semidense points,
//! ground truth), plus the flattening encoder that turns a sample into a
//! flat key→payload mapping ready for shard archival.
//!
//! ## Modules
//!
//! - [`types`]: leaf sensor entities with shared-length invariants
//! - [`sample`]: the per-timestamp sample aggregate
//! - [`payload`]: wire payload values (JPEG image, tensor blob, text, JSON)
//! - [`flatten`]: table-driven flattening encoder and key grammar

pub mod flatten;
pub mod payload;
pub mod sample;
pub mod types;

pub use flatten::FlattenError;
pub use payload::{ImagePayload, Payload, PayloadError, TensorData};
pub use sample::CaptureSample;
pub use types::{CameraFrameGroup, ImuStream, SampleError, SemidensePoints, TrajectoryStream};
