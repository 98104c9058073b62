//! HTTP helpers for key document retrieval and freshness.

pub mod cache_control;
pub mod client;
