pub mod channel;
pub mod directory;
pub mod hub;
pub mod transport;

pub use channel::{ChannelError, LocationUpdate, OrderChannel, RATE_LIMIT_WINDOW};
pub use directory::{DieselOrderDirectory, OrderDirectory};
pub use hub::LocalHub;
pub use transport::{ChannelEvent, ConnectionId, LocationSample, LocationSource, Transport};
