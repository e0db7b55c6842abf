pub mod collab;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use store::{ConfigSnapshot, ConfigStore, StrategyParams};
pub use types::*;
