//! traylens — facility meal-tray capture pipeline.
//!
//! Staff photograph meal trays; each photo is resized, uploaded to blob
//! storage, recorded against a user, analyzed by a vision-language model and
//! the estimated leftovers are attached to the record. [`pipeline`] holds
//! the per-image chain and batch orchestration, [`session`] the continuous
//! capture flow driven by scanned identity tokens.

pub mod config;
pub mod export;
pub mod pipeline;
pub mod records;
pub mod session;
pub mod state;
pub mod storage;
pub mod vision;

#[cfg(test)]
pub(crate) mod testutil;

pub use pipeline::{BatchReport, ImageOutcome, Orchestrator, PipelineError, PipelineOptions};
pub use records::{Facility, ImageRecord, Meal, MealLabel, RecordStore, StoreError, User};
pub use session::{CaptureSession, SessionEvent, SessionState};
