pub mod bt_discovery;
pub mod rfcomm;
pub mod serial;
pub mod tcp;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use bt_discovery::{BtDiscovery, DiscoveryConfig, SPP_UUID};
pub use rfcomm::{RfcommConfig, RfcommConnector, RfcommTransportStream, DEFAULT_RFCOMM_CHANNEL};
pub use serial::{SerialConfig, SerialConnector, SerialTransportStream, DEFAULT_BAUD_RATE};
pub use tcp::{TcpConnector, TcpTransportStream};
pub use traits::{TransportConnector, TransportStream};
