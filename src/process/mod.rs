// src/process/mod.rs

pub mod convert;
pub mod date_parser;
pub mod utils;
pub mod write;

pub use convert::clean;
pub use write::{read_parquet, write_local, write_parquet, LocalArtifact};
