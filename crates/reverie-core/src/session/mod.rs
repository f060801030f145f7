//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Recorded session types (`Session`, `Frame`, `Failure`, `FailureMark`)
//! - `repository`: Repository trait for session persistence

mod model;
mod repository;

pub use model::{Failure, FailureMark, Frame, Session};
pub use repository::SessionRepository;
