pub mod invalidation;
pub mod resume;
pub mod state;
pub mod store;

pub use invalidation::{SessionField, owned_fields, reset_to_phase, validate_ownership_table};
pub use resume::{ResumeChoice, apply_resume_choice};
pub use state::*;
pub use store::{SessionLock, SessionStore};
