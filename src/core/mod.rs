//! Service configuration, live settings and the service itself.

mod builder;
mod live;
mod loader;
mod service;
mod settings;
mod tokens;
mod validation;

pub use builder::HotReloadServiceBuilder;
pub use live::{LiveConfig, Validator};
pub use loader::SettingsLoader;
pub use service::HotReloadService;
pub use settings::{
    AuthSettings, LoggingSettings, ReloadSettings, ServerSettings, ServiceConfig, UnitSettings,
};
pub use tokens::TokenSet;
pub use validation::Validate;
