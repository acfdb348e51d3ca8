pub mod canon;
pub mod delta;
pub mod error;
pub mod event;
pub mod hash;
pub mod types;
pub mod validate;

pub use error::{Conflict, Error, Result, StateError, ValidationError, VersionControlError};
pub use types::*;
