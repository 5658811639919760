mod settings;

pub use settings::{DispatchConfig, LogConfig, Settings};
