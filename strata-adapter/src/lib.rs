//! Strata Adapter Crate
//!
//! Consumes reloaded flattened capture samples and emits unbatched,
//! per-camera-frame training instances for a 3D object-detection pipeline.
//! The adapter is a lazy, single-pass transform: archive reads, shard
//! splitting, and batching all live in external collaborators that feed it
//! pre-decoded in-memory tensors and pull records off the iterator.
//!
//! ## Modules
//!
//! - [`keymap`]: archive-key selection/rename tables and typed sample
//!   reconstitution
//! - [`camera`]: pinhole intrinsic matrix construction
//! - [`config`]: filter thresholds and category-id remapping
//! - [`pipeline`]: the per-frame training-instance stream

pub mod camera;
pub mod config;
pub mod keymap;
pub mod pipeline;

pub use camera::{intrinsic_matrices, intrinsic_matrix};
pub use config::AdapterConfig;
pub use keymap::{FlatSample, KeyMap};
pub use pipeline::{AdapterError, FrameRecord, InstanceSet, TrainingInstances, collate_as_list};
