//! Shared utility modules used across annflow components.

pub mod simd;
