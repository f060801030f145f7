//! Dreaming orchestration domain types.

mod event;
mod model;
mod state;

pub use event::DreamEvent;
pub use model::{
    DreamingCycleOptions, DreamingCycleReport, DreamingSettings, DreamingStats, ScheduleEntry,
    ScheduleOptions, ScheduleOutcome, ScheduleReport,
};
pub use state::DreamingState;
