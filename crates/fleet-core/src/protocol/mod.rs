//! The JSON streaming protocol.
//!
//! Every frame on a streaming connection is a JSON object with a `"type"`
//! discriminator.  [`messages`] defines one enum per direction so it is a
//! compile-time error to send a server-only message from a client and vice
//! versa.

pub mod messages;

pub use messages::{ClientMessage, ServerMessage};
