//! Host side of the SimpleSerial protocol for side-channel capture rigs.
//!
//! The protocol engine ([`proto`]) frames commands, decodes responses and runs
//! the ack handshake over any [`transport::Transport`]. [`session::TargetSession`]
//! ties it to a capture board so every exchange can be traced.

pub mod board;
pub mod error;
pub mod frame;
pub mod history;
pub mod port;
pub mod proto;
pub mod session;
pub mod settings;
pub mod stats;
pub mod transport;

#[cfg(test)]
mod mock;

pub use error::{BoardError, ContractError, Error, ProtocolError};
pub use frame::CommandFrame;
pub use proto::{CommandInfo, Exchange, Protocol, ProtocolVersion};
pub use session::{SessionConfig, TargetSession};
