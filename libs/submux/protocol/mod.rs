//! Wire protocol for the graphql-transport-ws subprotocol.

pub mod frame;

pub use frame::{ClientFrame, DecodeError, ServerFrame, SubscribePayload};
