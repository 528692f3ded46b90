//! Browser engines, the session pool and screenshot sinks.
//!
//! Available engines:
//! - `MockBrowser` - Scripted pages for tests (always available)
//! - `ChromiumEngine` - Headless Chromium over CDP (requires `chromium` feature)

pub mod mock;
pub mod pool;
pub mod screenshots;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use mock::{MockBrowser, MockBrowserCall, MockFailure, MockPage};
pub use pool::{SessionLease, SessionPool};
pub use screenshots::DirectorySink;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumConfig, ChromiumEngine};
