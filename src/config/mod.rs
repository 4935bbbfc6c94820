pub mod app_config;
pub mod validation;

pub use app_config::{AccountConfig, ChunkConfig, CloudConfig, StoreConfig, TransferConfig, CONFIG_VERSION};
