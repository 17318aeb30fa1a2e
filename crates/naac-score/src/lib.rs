//! Provisional NAAC accreditation scoring: metric responses in, weighted
//! criterion scores and grade bands out.

pub mod config;
pub mod error;
pub mod scoring;
pub mod telemetry;
