//! Strata
//!
//! Multi-sensor capture samples for 3D object-detection training. This
//! umbrella crate re-exports the two workspace members:
//!
//! - [`sample`]: canonical per-timestamp sample model and its flattened
//!   archive encoding
//! - [`adapter`]: geometric adapter pipeline turning reloaded flattened
//!   samples into per-frame training instances

pub use strata_adapter as adapter;
pub use strata_sample as sample;
