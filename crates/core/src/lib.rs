//! Domain model for the VA calibration control panel.
//!
//! Pure types and transforms: task identity and status, the calibration
//! result payload (with its scalar-or-sequence normalization), the
//! submission request, and the result renderer. No I/O lives here.

pub mod error;
pub mod normalize;
pub mod render;
pub mod request;
pub mod result;
pub mod task;
pub mod types;
