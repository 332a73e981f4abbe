pub mod core;
pub mod platform;
pub mod protocol;

pub use core::config::PlatformConfig;
pub use core::errors::PlatformError;
pub use core::kernel::{LinkState, Outbound, TungsteniteLink, WireTransport};
pub use platform::Platform;
pub use protocol::{Channel, ChannelHook, Event, EventHook, Value, ValueArray, ValueData};
