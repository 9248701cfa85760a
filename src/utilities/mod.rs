//! Shared helpers: error types, data file resolution and text utilities.

pub mod errors;
pub mod paths;
pub mod string_utils;
