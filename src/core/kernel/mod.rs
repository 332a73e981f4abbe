pub mod ws;

pub use ws::{LinkState, Outbound, TungsteniteLink, WireTransport};
