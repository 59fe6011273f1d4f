pub mod dsl;
pub mod midi;
pub mod rhythm;
