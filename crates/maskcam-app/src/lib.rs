//! maskcam-app — the inference pipeline engine, its configuration, and the
//! presentation surface the display layer reads.

pub mod config;
pub mod engine;
pub mod view;
