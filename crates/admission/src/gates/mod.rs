//! The six admission gates, in pipeline order

mod caps;
mod device;
mod geo;
mod ip;
mod limitation;
mod velocity;

pub use caps::CapsGate;
pub use device::DeviceGate;
pub use geo::GeoGate;
pub use ip::IpGate;
pub use limitation::LimitationGate;
pub use velocity::VelocityGate;
