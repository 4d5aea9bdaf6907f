use super::allocator::ClientIdentity;
use std::net::Ipv4Addr;

/// Conditions the allocation and transaction layers report to the protocol
/// handlers. None of them is fatal for the server.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The relay address does not belong to any configured pool.
    #[error("Address {0} does not belong to any known network")]
    UnknownNetwork(Ipv4Addr),

    #[error("Client {client} has no address allocated in {network}")]
    NoAllocation {
        network: Ipv4Addr,
        client: ClientIdentity,
    },

    #[error("No free addresses left in {0}")]
    PoolExhausted(Ipv4Addr),

    /// The address can not be handed out in its pool, or it is not the
    /// address the client holds.
    #[error("Address {0} is not valid for the client")]
    InvalidAddress(Ipv4Addr),

    #[error("No transaction with id {0:#010x}")]
    NoTransaction(u32),
}
