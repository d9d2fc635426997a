pub mod config;
pub mod error;
pub mod types;

pub use error::{ZipvaultError, ZipvaultResult};
pub use types::{CompressionMode, Direction, Granularity};
