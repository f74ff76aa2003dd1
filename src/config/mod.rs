//! Configuration: TOML settings plus the live view polled by the engine.

mod logging;
mod risk;
mod settings;
mod source;
mod venue;

pub use logging::LoggingConfig;
pub use risk::RiskConfig;
pub use settings::{Config, DetectionConfig, ExecutionConfig, PaperBalanceConfig, PaperConfig};
pub use source::{ConfigSource, DetectionSettings, ExecutionSettings, SharedConfig};
pub use venue::{VenueConfig, VenueKind};
