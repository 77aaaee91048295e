//! Domain helpers over raw FHIR JSON payloads

pub mod fhir;

pub use fhir::{is_resource_type, local_reference, parse_query, resource_id, resource_type};
