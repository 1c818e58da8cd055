//! DDL classification.
//!
//! Turns raw definition text into a typed statement the engines can
//! reason about. Classification is grammar-driven (sqlparser), never
//! regex: anything the grammar cannot place lands in the explicit
//! `Unclassified` variant instead of a best-effort guess.

mod ast;
mod error;
mod parser;

pub use ast::{DdlObject, DdlOperation, DdlStatement};
pub use error::{DdlError, DdlResult};
pub use parser::{classify, parse_strict};
