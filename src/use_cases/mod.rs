//! Use cases (orchestration)
//!
//! This module contains use cases that orchestrate operations across multiple ports.
//! Use cases coordinate between adapters and logic to fulfill business requirements.

mod enroll;
mod issue_credential;
mod replay_secret;
mod unlock;

pub use enroll::{enroll, EnrollConfig, EnrollState, Enrollment};
pub use issue_credential::{issue_credential, IssuedCredential, PIN_PROMPT};
pub use replay_secret::replay_secret;
pub use unlock::{list_tokens, unlock, unlock_with_record, UnlockConfig, UnlockState, Unlocked};
