pub mod config;
pub mod error;
pub mod paths;
pub mod protocol;
pub mod script;

pub use config::{BridgeConfig, Config, ModelDefaults, ProviderConfig, SandboxConfig};
pub use error::{Error, Result};
pub use paths::Paths;
pub use script::{MatchType, PageLocator, ScriptDescriptor};
