pub mod cli;
pub mod config;

// Re-export commonly used types
pub use cli::{Cli, Source};
pub use config::{
    AppConfig, AudioConfig, DecoderConfig, OutputConfig, PortSetting, ScopeConfig, TrimPolicy,
};
