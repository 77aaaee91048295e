//! CareLink - care-coordination orchestrator
//!
//! Sits in front of a FHIR resource server and keeps multi-organization care plans
//! consistent:
//! - Task writes update the CarePlan's CareTeam in the same transaction
//! - Every Task and CareTeam change is pushed to the organizations involved
//! - Access to resources is decided by a Rego policy over the caller and the patient's
//!   care plans

#![allow(
    clippy::large_enum_variant,      // Error variants carry full upstream context
    clippy::question_mark,           // let-else vs ? operator is a style preference
)]

pub mod api;
pub mod auth;
pub mod careteam;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod policy;
pub mod request_context;
pub mod services;
pub mod state;
pub mod subscriptions;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
