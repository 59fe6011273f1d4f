pub mod dsl;
mod error;

pub use error::ParseError;
