mod config;
mod error;
mod logger;
mod types;

pub use config::*;
pub use error::*;
pub use logger::*;
pub use types::*;
