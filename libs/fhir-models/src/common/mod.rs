//! Version-agnostic FHIR models
//!
//! Types that work across FHIR R4, R4B, and R5

pub mod bundle;
pub mod care_plan;
pub mod care_team;
pub mod datatypes;
pub mod error;
pub mod subscription;
pub mod task;

// Re-export commonly used types
pub use bundle::*;
pub use care_plan::*;
pub use care_team::*;
pub use datatypes::*;
pub use error::{Error, Result};
pub use subscription::*;
pub use task::*;
