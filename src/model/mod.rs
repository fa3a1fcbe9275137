//! Core data model for normalized messages and their JSON document form.

pub mod message;
