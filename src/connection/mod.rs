//! Connection core: the persistent link, its liveness monitor and the
//! reconnect coordinator

pub mod emitter;
pub mod manager;
mod monitor;
mod reconnect;

#[cfg(test)]
pub(crate) mod testing;

pub use emitter::EventEmitter;
pub use manager::{ConnectionManager, LinkConfig};
