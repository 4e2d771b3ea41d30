//! Metrics provider library
//!
//! Exposes system-metric queries as named asynchronous operations. The
//! coordinator and its workers only see the `MetricsProvider` trait; the
//! sysinfo-backed implementation lives behind it.

pub mod collectors;
pub mod error;
pub mod sysinfo_provider;
pub mod traits;

pub use error::{ProviderError, ProviderResult};
pub use sysinfo_provider::SysinfoProvider;
pub use traits::{validate_surface, MetricsProvider, MockMetricsProvider};
