//! FHIR data models for care coordination
//!
//! This crate provides strongly-typed Rust views of the FHIR resources that a
//! care-coordination orchestrator reads and writes: CarePlan, CareTeam, Task,
//! Bundle and the topic-based SubscriptionNotification envelope.
//!
//! # Design Philosophy
//!
//! - **Version-agnostic core**: only the fields the orchestrator reasons about are typed
//! - **Lossless**: every other property is captured in a flattened `extensions` map, so a
//!   resource read from the store can be modified and written back without dropping data
//! - **Compatible**: works alongside `serde_json::Value`-based code
//!
//! # Example
//!
//! ```rust
//! use carelink_models::common::{Task, TaskStatus};
//! use serde_json::json;
//!
//! let task: Task = serde_json::from_value(json!({
//!     "resourceType": "Task",
//!     "id": "t1",
//!     "status": "accepted",
//!     "intent": "order",
//!     "owner": {"identifier": {"system": "urn:oid:2.16.528.1.1007.3.3", "value": "B"}}
//! }))
//! .unwrap();
//!
//! assert_eq!(task.status, TaskStatus::Accepted);
//! assert!(task.extensions.contains_key("intent"));
//! ```

pub mod common;

// Re-export commonly used types
pub use common::*;
