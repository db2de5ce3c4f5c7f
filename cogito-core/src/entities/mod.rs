//! Projected entities.
//!
//! Entities are plain values owned by the projection. Views sent to
//! clients are assembled from them at read time, joining transfers onto
//! their deposit and the other way around.

mod activity;
mod deposit;
mod transfer;

pub use activity::UserActivity;
pub use deposit::Deposit;
pub use transfer::{StageMark, Transfer};
