//! Request handlers for the table API.

mod tables;

pub use tables::*;
