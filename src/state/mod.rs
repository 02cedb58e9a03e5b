//! Process-global server state: clients, channels and the registry that
//! keeps them consistent.

mod channel;
mod client;
mod registry;

pub use channel::{Channel, MemberStatus};
pub use client::{Client, ClientId, ClientKind, NetworkHandle, UserState};
pub use registry::Registry;
