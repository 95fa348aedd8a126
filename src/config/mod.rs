//! Configuration module
//!
//! - YAML configuration types and loader (`AppConfig`, `load_config`)
//! - Environment-overridable timing constants (`constants`)
//! - Credential store settings (`SupabaseConfig`)

pub mod constants;
mod loader;
pub mod supabase;
mod types;

pub use types::{
    AppConfig, BuilderKind, CycleConfig, ExtendedSettings, HumanizerConfig, HyperliquidSettings,
    RebalanceConfig, UserConfig,
};

pub use loader::{load_config, load_config_from_str};

pub use supabase::{SupabaseConfig, SupabaseConfigError};
