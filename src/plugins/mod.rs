//! Workflows built on the core engine.

pub mod architect;
