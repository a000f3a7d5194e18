//! Group store - group records and initial roster enrollment

pub mod store;
pub mod types;

pub use store::GroupStore;
pub use types::{Group, GroupSummary};
