//! Integration tests for the deployment pipeline.
//!
//! Every test drives `Pipeline` end to end against a `MockRunner`, so no
//! kubectl, helm or tiller binary is needed.
//!
//! # Test Categories
//!
//! - `pipeline_e2e`: full runs, step ordering and failure short-circuits
//! - `dry_run`: the dry-run gate across all steps
//! - `tiller_lifecycle`: Tiller is stopped on success and on failure


mod pipeline_e2e;
mod tiller_lifecycle;
