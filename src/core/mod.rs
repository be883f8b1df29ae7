//! Core modules for the architect engine.
//!
//! Schema, store, mutation parsing and application, snapshot rendering, and
//! the shared primitives the workflows build on.

pub mod assets;
pub mod config;
pub mod error;
pub mod literal;
pub mod model;
pub mod mutation;
pub mod output;
pub mod render;
pub mod repomap;
pub mod schemas;
pub mod store;
pub mod summary;
pub mod time;
