mod constants;
mod detector;

#[cfg(not(target_os = "linux"))]
pub use constants::bsd;
pub use constants::common;
#[cfg(target_os = "linux")]
pub use constants::linux;
pub use detector::{BsdInfo, LinuxInfo, Platform, PlatformInfo, detect_platform};
