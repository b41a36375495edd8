//! Storage for salesman: run history and distance matrix files.
//!
//! Run history sits behind the [`RunStore`] trait with a JSON file
//! implementation.

#![warn(missing_docs)]

pub mod store;
pub mod json_store;
pub mod matrix_file;

pub use store::{Result, RunStore, StorageError};
pub use json_store::JsonRunStore;
pub use matrix_file::{load_matrix, parse_json, parse_text, save_matrix};
