pub mod error;
pub mod types;
pub mod value;

pub use error::{CacheError, DriverError, DriverResult, EngineError, Result};
pub use types::{Identifier, InstanceKey, Row, TableSpace};
pub use value::Value;
