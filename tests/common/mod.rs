//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - PostgreSQL and Elasticsearch testcontainer setup
//! - Row and engine fixtures over the in-memory source and index

#![allow(dead_code)]

pub mod containers;
pub mod fixtures;

pub use containers::*;
pub use fixtures::*;
