//! HTTP handlers, one module per resource.

pub mod browse;
pub mod health;
pub mod scan;
