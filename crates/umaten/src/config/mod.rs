pub mod loader;
pub mod schema;
pub mod settings;

pub use loader::{load_config, load_config_from_str, validate_config, validate_settings};
pub use schema::{
    CategoryConfig, Config, LoggingConfig, PricingConfig, SchedulerConfig, ScrapingConfig,
    Settings, StatsConfig,
};
pub use settings::SettingsStore;
