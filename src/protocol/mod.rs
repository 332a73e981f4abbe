pub mod array;
pub mod channel;
pub mod event;
pub mod scan;
pub mod value;

pub use array::ValueArray;
pub use channel::{Channel, ChannelHook, VerifyFn};
pub use event::{Event, EventHook};
pub use value::{Value, ValueData};
