pub mod http_server;
pub mod process;
pub mod service_config;
pub mod service_state;

pub use process::{spawn_service, start_service, ServiceError, ShutdownHandle};
pub use service_config::Config as ServiceConfig;
pub use service_state::State as ServiceState;

/// Daemon-specific build info that uses the daemon's BUILD_FEATURES.
///
/// `common::version::BuildInfo::new()` reads BUILD_FEATURES from common's
/// compile environment, not the daemon's.
pub fn build_info() -> common::version::BuildInfo {
    let mut info = common::version::BuildInfo::new();
    info.build_features = option_env!("BUILD_FEATURES").unwrap_or("none").to_string();
    info
}
