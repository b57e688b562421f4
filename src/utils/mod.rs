pub mod config;
pub mod logging;

pub use config::{load_settings, Settings};
