//! Platform Configuration Sources
//!
//! A platform is where a node looks for its initial machine configuration
//! when none was persisted yet. The platform is named on the kernel command
//! line (`talos.platform=`, default `metal`).
//!
//! # Example
//!
//! ```no_run
//! use platform::{Cmdline, PlatformConfigurator, PlatformError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cmdline = Cmdline::read("/proc/cmdline").await?;
//! let platform = platform::from_cmdline(&cmdline)?;
//! match platform.configuration().await {
//!     Ok(bytes) => println!("{}: {} bytes", platform.name(), bytes.len()),
//!     Err(PlatformError::NoConfigSource) => println!("waiting for maintenance"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cmdline;
pub mod error;
pub mod metal;
#[path = "trait.rs"]
pub mod platform_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use cmdline::Cmdline;
pub use error::PlatformError;
pub use metal::MetalPlatform;
pub use platform_trait::PlatformConfigurator;
#[cfg(feature = "test-util")]
pub use mock::MockPlatform;

/// Platform selected by the kernel command line.
pub fn from_cmdline(cmdline: &Cmdline) -> Result<Box<dyn PlatformConfigurator>, PlatformError> {
    match cmdline.get(cmdline::PLATFORM_PARAM).unwrap_or(MetalPlatform::NAME) {
        MetalPlatform::NAME | "" => Ok(Box::new(MetalPlatform::new(cmdline)?)),
        other => Err(PlatformError::Unsupported(other.to_string())),
    }
}
