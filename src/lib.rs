// Shared components
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain layer
pub mod notification;
pub mod push;
pub mod request;
pub mod storage;

// Dispatch core
pub mod dispatch;
pub mod relay;
