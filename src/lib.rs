pub mod config;
pub mod dispatcher;
pub mod hunter;
pub mod knowledge;
pub mod matcher;
pub mod models;
pub mod plugins;
pub mod scanner;
pub mod scraper;
pub mod settings;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use hunter::BourbonHunter;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
