pub mod config;
pub mod error;
pub mod storage;
pub mod types;

pub use config::*;
pub use error::*;
pub use storage::*;
pub use types::*;
