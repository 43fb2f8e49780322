pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod service;

pub use config::Settings;
pub use context::AppContext;
pub use error::{Error, Result};
