//! CLI command implementations
//!
//! Programming and verification share one code path: a verify run is a
//! program run with the erase and write steps left out.

mod list;
pub mod program;

pub use list::{list_chips, list_programmers};
