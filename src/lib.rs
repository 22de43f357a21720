pub mod checker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod publish;
pub mod validation;
pub mod zone;

pub use error::{ConfigError, Result, ZoneError};
pub use model::{IncludeEdge, ZoneId, ZoneKind, ZoneNode, ZoneStatus};
