//! Utilities for driving `osclink` clients against a scripted camera
//! during tests.
//!
//! [`MockDevice`] implements [`osclink::Connector`] over
//! `tokio::io::duplex` streams, records every request it receives and
//! answers with responses built by the [`wire`] helpers.
//!
//! ```rust
//! use osclink::{PreviewSession, config::PreviewConfig};
//! use osclink_testing::{MockDevice, Reply, wire};
//!
//! # async fn example() -> osclink::Result<()> {
//! let device = MockDevice::new([Reply::Respond(wire::preview_stream(&[b"jpeg"]))]);
//! let mut session = PreviewSession::new(
//!     device.clone(),
//!     MockDevice::endpoint(),
//!     PreviewConfig::default(),
//! );
//! let frame = session.next_frame().await?;
//! assert_eq!(frame.map(|f| f.length()), Some(4));
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod fs;
pub mod logging;
pub mod wire;

pub use device::{DUPLEX_CAPACITY, MockDevice, RecordedRequest, Reply};
pub use fs::TempFile;
pub use logging::{LoggerHandle, logger};
