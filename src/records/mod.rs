pub mod memory;
pub mod rtdb;
mod store;
mod types;

pub use memory::MemoryStore;
pub use rtdb::RtdbStore;
pub use store::{RecordStore, StoreError};
pub use types::{Facility, ImageRecord, Meal, MealLabel, User};
