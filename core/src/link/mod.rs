//! Link layer: everything that crosses the wire between neighbors
//!
//! - Protocol: the two message kinds and their encoding
//! - Sender: one-shot TCP delivery behind the [`LinkSender`] seam
//! - Listener: inbound accept loop and message dispatch
//! - Disseminator: the periodic snapshot flood

pub mod disseminator;
pub mod listener;
pub mod protocol;
pub mod sender;

pub use disseminator::{Disseminator, RoundReport};
pub use listener::{dispatch, Delivery, Listener};
pub use protocol::{WireError, WireMessage, CHANGE_TOKEN};
pub use sender::{LinkSender, SendError, TcpLinkSender};
