//! Thin typed wrappers around individual API URLs.
//!
//! Each group borrows the client it was created from; endpoints never reach
//! back into client internals beyond the shared request engine.

mod analytics;
mod control;
mod devices;
mod firmware;
mod plants;

pub use analytics::AnalyticsEndpoints;
pub use control::ControlEndpoints;
pub use devices::DeviceEndpoints;
pub use firmware::FirmwareEndpoints;
pub use plants::PlantEndpoints;
