//! UID/GID transitions for privilege dropping.
//!
//! setresgid MUST be called BEFORE setresuid.

mod transition;
mod validation;

pub use transition::transition_to_unprivileged;
pub use validation::validate_ids;
