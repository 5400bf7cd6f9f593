#![forbid(unsafe_code)]

pub mod error;
pub mod insights;
pub mod model;
pub mod time;

pub use error::{Conflict, EntityKind, NotFound, ValidationError};
pub use time::Clock;
