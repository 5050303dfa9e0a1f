//! Backend connectivity monitoring for AgroDash

pub mod probe;
pub mod status;

pub use probe::{HealthProbe, HttpHealthProbe};
pub use status::{
    transition, Connectivity, MonitorSettings, NetworkEvent, ServerStatus, ServerStatusMonitor,
    StatusEvent,
};
