//! CLI command implementations.
//!
//! | Module     | Commands handled        |
//! |------------|-------------------------|
//! | `run`      | `Run` (the default)     |
//! | `sessions` | `List`, `Archive`       |

pub mod run;
pub mod sessions;

pub use run::cmd_run;
pub use sessions::{cmd_archive, cmd_list};
