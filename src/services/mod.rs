pub mod platform_service;
pub mod replay_service;

pub use platform_service::DesktopPlatform;
