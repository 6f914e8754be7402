//! Row models and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` DTO for inserts where the table accepts writes

pub mod location;
pub mod model_metadata;
pub mod prediction;
pub mod processed;
pub mod raw;
