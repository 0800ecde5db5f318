//! Core data structures for vector search.
//!
//! This module contains the fundamental vector representation and the
//! distance metrics used by every index strategy.

pub mod distance;
pub mod vector;
