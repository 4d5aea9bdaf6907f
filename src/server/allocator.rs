use super::error::Error;
use super::pool::AddressPool;
use crate::dhcp::{hex_join, ClientIdentifier, DhcpPacket, Options};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the epoch, as stored in allocations.
pub fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Key of every allocation and transaction lookup. The Client Identifier
/// option takes precedence over the hardware address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClientIdentity {
    Hardware { htype: u8, addr: Vec<u8> },
    SpecialId(ClientIdentifier),
}

impl ClientIdentity {
    pub fn from_request(request: &DhcpPacket, options: &Options) -> Self {
        match options.client_identifier() {
            Some(ci) => ClientIdentity::SpecialId(ci),
            None => ClientIdentity::Hardware {
                htype: request.htype,
                addr: request.client_hw_addr().to_vec(),
            },
        }
    }
}

impl Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hardware { addr, .. } => write!(f, "{}", hex_join(addr)),
            Self::SpecialId(ci) => write!(f, "id {}", ci),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedAddress {
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub dns_servers: Arc<Vec<Ipv4Addr>>,
    pub routers: Arc<Vec<Ipv4Addr>>,
    pub lease_time: u32,
    /// Unix seconds of the allocation or its last renewal.
    pub allocated_at: u32,
}

impl AllocatedAddress {
    fn from_pool(pool: &AddressPool, ip: Ipv4Addr, allocated_at: u32) -> Self {
        return Self {
            ip,
            mask: pool.mask(),
            dns_servers: Arc::clone(pool.dns_servers()),
            routers: Arc::clone(pool.routers()),
            lease_time: pool.lease_time(),
            allocated_at,
        };
    }

    pub fn expires_at(&self) -> u64 {
        return self.allocated_at as u64 + self.lease_time as u64;
    }

    pub fn is_expired(&self, now: u32) -> bool {
        return now as u64 >= self.expires_at();
    }
}

#[derive(Debug, Default)]
struct NetworkAllocations {
    by_client: BTreeMap<ClientIdentity, AllocatedAddress>,
    in_use: BTreeMap<Ipv4Addr, ClientIdentity>,
}

/// Allocations keyed by network and then by client. The inner table of a
/// network is created on its first allocation and dropped with its last one.
#[derive(Debug, Default)]
pub struct AllocationTable {
    networks: BTreeMap<Ipv4Addr, NetworkAllocations>,
}

impl AllocationTable {
    pub fn get(
        &self,
        network: Ipv4Addr,
        client: &ClientIdentity,
    ) -> Option<&AllocatedAddress> {
        return self.networks.get(&network)?.by_client.get(client);
    }

    pub fn get_mut(
        &mut self,
        network: Ipv4Addr,
        client: &ClientIdentity,
    ) -> Option<&mut AllocatedAddress> {
        return self.networks.get_mut(&network)?.by_client.get_mut(client);
    }

    pub fn contains(&self, network: Ipv4Addr, client: &ClientIdentity) -> bool {
        return self.get(network, client).is_some();
    }

    pub fn is_in_use(&self, network: Ipv4Addr, ip: Ipv4Addr) -> bool {
        return self
            .networks
            .get(&network)
            .map(|n| n.in_use.contains_key(&ip))
            .unwrap_or(false);
    }

    /// Installs the allocation, replacing the one the client had in the
    /// network. Fails if another client holds the address.
    pub fn insert(
        &mut self,
        network: Ipv4Addr,
        client: ClientIdentity,
        address: AllocatedAddress,
    ) -> Result<(), Error> {
        let allocations = self.networks.entry(network).or_default();

        if let Some(holder) = allocations.in_use.get(&address.ip) {
            if *holder != client {
                return Err(Error::InvalidAddress(address.ip));
            }
        }

        allocations.in_use.insert(address.ip, client.clone());
        if let Some(previous) = allocations.by_client.insert(client, address)
        {
            let ip = previous.ip;
            let still_used = allocations.by_client.values().any(|a| a.ip == ip);
            if !still_used {
                allocations.in_use.remove(&ip);
            }
        }

        return Ok(());
    }

    pub fn remove(
        &mut self,
        network: Ipv4Addr,
        client: &ClientIdentity,
    ) -> Option<AllocatedAddress> {
        let allocations = self.networks.get_mut(&network)?;
        let address = allocations.by_client.remove(client)?;
        allocations.in_use.remove(&address.ip);

        if allocations.by_client.is_empty() {
            self.networks.remove(&network);
        }

        return Some(address);
    }

    pub fn len(&self) -> usize {
        return self.networks.values().map(|n| n.by_client.len()).sum();
    }

    pub fn is_empty(&self) -> bool {
        return self.networks.is_empty();
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (Ipv4Addr, &ClientIdentity, &AllocatedAddress)>
    {
        self.networks.iter().flat_map(|(network, allocations)| {
            allocations
                .by_client
                .iter()
                .map(move |(client, address)| (*network, client, address))
        })
    }
}

/// Owns the pools and the allocation table and makes every allocation
/// decision.
#[derive(Debug)]
pub struct AddressAllocator {
    local_network: Ipv4Addr,
    pools: BTreeMap<Ipv4Addr, AddressPool>,
    table: AllocationTable,
    revision: u64,
}

impl AddressAllocator {
    pub fn new(local_network: Ipv4Addr, pools: Vec<AddressPool>) -> Self {
        let pools = pools.into_iter().map(|p| (p.network(), p)).collect();

        return Self {
            local_network,
            pools,
            table: AllocationTable::default(),
            revision: 0,
        };
    }

    pub fn pools(&self) -> impl Iterator<Item = &AddressPool> {
        self.pools.values()
    }

    pub fn pool(&self, network: Ipv4Addr) -> Result<&AddressPool, Error> {
        return self
            .pools
            .get(&network)
            .ok_or(Error::UnknownNetwork(network));
    }

    /// Network of the client: the local one when the message was not
    /// relayed, otherwise the pool that contains the relay address.
    pub fn resolve_network(&self, relay: Ipv4Addr) -> Result<Ipv4Addr, Error> {
        if relay.is_unspecified() {
            return Ok(self.local_network);
        }

        return self
            .pools
            .values()
            .find(|pool| pool.may_contain(relay))
            .map(|pool| pool.network())
            .ok_or(Error::UnknownNetwork(relay));
    }

    pub fn has_allocation(
        &self,
        network: Ipv4Addr,
        client: &ClientIdentity,
    ) -> bool {
        return self.table.contains(network, client);
    }

    pub fn get_allocation(
        &self,
        network: Ipv4Addr,
        client: &ClientIdentity,
    ) -> Result<&AllocatedAddress, Error> {
        return self.table.get(network, client).ok_or_else(|| {
            Error::NoAllocation {
                network,
                client: client.clone(),
            }
        });
    }

    /// Address for the client. An existing allocation is returned as is,
    /// otherwise the requested address is taken if it is free, otherwise
    /// the lowest free address of the pool.
    pub fn allocate(
        &mut self,
        network: Ipv4Addr,
        client: &ClientIdentity,
        requested: Option<Ipv4Addr>,
    ) -> Result<AllocatedAddress, Error> {
        if let Some(address) = self.table.get(network, client) {
            return Ok(address.clone());
        }

        let pool = self.pool(network)?;
        let table = &self.table;
        let is_free = |ip: &Ipv4Addr| {
            pool.is_allocatable(*ip) && !table.is_in_use(network, *ip)
        };

        let ip = match requested.filter(|ip| is_free(ip)) {
            Some(ip) => ip,
            None => pool
                .addresses()
                .find(|ip| !table.is_in_use(network, *ip))
                .ok_or(Error::PoolExhausted(network))?,
        };

        let address = AllocatedAddress::from_pool(pool, ip, unix_time());
        self.table
            .insert(network, client.clone(), address.clone())?;
        self.revision += 1;

        return Ok(address);
    }

    /// Restarts the lease of the client, which must hold `ip`.
    pub fn renew(
        &mut self,
        network: Ipv4Addr,
        client: &ClientIdentity,
        ip: Ipv4Addr,
    ) -> Result<AllocatedAddress, Error> {
        let address = match self.table.get_mut(network, client) {
            Some(address) => address,
            None => {
                return Err(Error::NoAllocation {
                    network,
                    client: client.clone(),
                })
            }
        };

        if address.ip != ip {
            return Err(Error::InvalidAddress(ip));
        }

        address.allocated_at = unix_time();
        self.revision += 1;

        return Ok(address.clone());
    }

    pub fn free(
        &mut self,
        network: Ipv4Addr,
        client: &ClientIdentity,
    ) -> Option<AllocatedAddress> {
        let address = self.table.remove(network, client)?;
        self.revision += 1;
        return Some(address);
    }

    /// Frees every allocation whose lease is over at `now`.
    pub fn expire(
        &mut self,
        now: u32,
    ) -> Vec<(Ipv4Addr, ClientIdentity, AllocatedAddress)> {
        let expired: Vec<(Ipv4Addr, ClientIdentity)> = self
            .table
            .iter()
            .filter(|(_, _, address)| address.is_expired(now))
            .map(|(network, client, _)| (network, client.clone()))
            .collect();

        let mut freed = Vec::new();
        for (network, client) in expired {
            if let Some(address) = self.free(network, &client) {
                freed.push((network, client, address));
            }
        }

        return freed;
    }

    /// Reinstalls a previously saved allocation. The mask, lease time and
    /// lists come from the current pool configuration.
    pub fn restore(
        &mut self,
        network: Ipv4Addr,
        client: ClientIdentity,
        ip: Ipv4Addr,
        allocated_at: u32,
    ) -> Result<(), Error> {
        let pool = self.pool(network)?;
        if !pool.is_allocatable(ip) || self.table.is_in_use(network, ip) {
            return Err(Error::InvalidAddress(ip));
        }

        let address = AllocatedAddress::from_pool(pool, ip, allocated_at);
        self.table.insert(network, client, address)?;
        self.revision += 1;

        return Ok(());
    }

    pub fn allocations(
        &self,
    ) -> impl Iterator<Item = (Ipv4Addr, &ClientIdentity, &AllocatedAddress)>
    {
        self.table.iter()
    }

    pub fn allocation_count(&self) -> usize {
        return self.table.len();
    }

    /// Increases on every change of the allocation table.
    pub fn revision(&self) -> u64 {
        return self.revision;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::PoolDescriptor;
    use std::collections::HashSet;

    const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);
    const REMOTE: Ipv4Addr = Ipv4Addr::new(10, 1, 0, 0);

    fn pool(network: Ipv4Addr, mask: Ipv4Addr) -> AddressPool {
        let desc = PoolDescriptor {
            network,
            mask,
            range_start: None,
            range_end: None,
            dns_servers: vec![Ipv4Addr::new(8, 8, 8, 8)],
            routers: vec![SERVER_IP],
            lease_time: 3600,
        };
        return AddressPool::new(&desc, SERVER_IP);
    }

    fn allocator() -> AddressAllocator {
        AddressAllocator::new(
            LOCAL,
            vec![
                pool(LOCAL, Ipv4Addr::new(255, 255, 255, 248)),
                pool(REMOTE, Ipv4Addr::new(255, 255, 255, 0)),
            ],
        )
    }

    fn hw(last: u8) -> ClientIdentity {
        ClientIdentity::Hardware {
            htype: 1,
            addr: vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, last],
        }
    }

    #[test]
    fn resolve_local_and_relayed_networks() {
        let alloc = allocator();

        assert_eq!(alloc.resolve_network(Ipv4Addr::UNSPECIFIED), Ok(LOCAL));
        assert_eq!(
            alloc.resolve_network(Ipv4Addr::new(10, 1, 0, 254)),
            Ok(REMOTE)
        );
        assert_eq!(
            alloc.resolve_network(Ipv4Addr::new(192, 168, 0, 1)),
            Err(Error::UnknownNetwork(Ipv4Addr::new(192, 168, 0, 1)))
        );
    }

    #[test]
    fn allocate_is_idempotent() {
        let mut alloc = allocator();

        let first = alloc.allocate(LOCAL, &hw(1), None).unwrap();
        let second = alloc.allocate(LOCAL, &hw(1), None).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(alloc.allocation_count(), 1);
    }

    #[test]
    fn allocations_share_pool_lists() {
        let mut alloc = allocator();

        let a = alloc.allocate(LOCAL, &hw(1), None).unwrap();
        let b = alloc.allocate(LOCAL, &hw(2), None).unwrap();

        assert!(Arc::ptr_eq(&a.dns_servers, &b.dns_servers));
        assert!(Arc::ptr_eq(&a.routers, &b.routers));

        alloc.free(LOCAL, &hw(1));
        assert_eq!(b.dns_servers.as_slice(), &[Ipv4Addr::new(8, 8, 8, 8)]);
    }

    #[test]
    fn allocated_addresses_are_unique_until_exhaustion() {
        let mut alloc = allocator();
        let mut seen = HashSet::new();

        // .0 network, .1 server, .7 broadcast
        for i in 0..5 {
            let address = alloc.allocate(LOCAL, &hw(i), None).unwrap();
            assert!(seen.insert(address.ip));
        }

        assert_eq!(
            alloc.allocate(LOCAL, &hw(10), None),
            Err(Error::PoolExhausted(LOCAL))
        );
    }

    #[test]
    fn free_then_reallocate_avoids_held_addresses() {
        let mut alloc = allocator();
        let a = alloc.allocate(LOCAL, &hw(1), None).unwrap();
        let b = alloc.allocate(LOCAL, &hw(2), None).unwrap();

        assert!(alloc.free(LOCAL, &hw(1)).is_some());
        assert!(alloc.free(LOCAL, &hw(1)).is_none());
        assert!(!alloc.has_allocation(LOCAL, &hw(1)));

        let c = alloc.allocate(LOCAL, &hw(3), None).unwrap();
        assert_eq!(c.ip, a.ip);

        let again = alloc.allocate(LOCAL, &hw(1), None).unwrap();
        assert_ne!(again.ip, b.ip);
        assert_ne!(again.ip, c.ip);
    }

    #[test]
    fn requested_address_is_preferred_when_free() {
        let mut alloc = allocator();
        let requested = Ipv4Addr::new(10, 0, 0, 5);

        let a = alloc.allocate(LOCAL, &hw(1), Some(requested)).unwrap();
        assert_eq!(a.ip, requested);

        let b = alloc.allocate(LOCAL, &hw(2), Some(requested)).unwrap();
        assert_eq!(b.ip, Ipv4Addr::new(10, 0, 0, 2));

        let c = alloc.allocate(LOCAL, &hw(3), Some(SERVER_IP)).unwrap();
        assert_eq!(c.ip, Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn allocations_are_per_network() {
        let mut alloc = allocator();

        let local = alloc.allocate(LOCAL, &hw(1), None).unwrap();
        let remote = alloc.allocate(REMOTE, &hw(1), None).unwrap();

        assert_eq!(local.ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(remote.ip, Ipv4Addr::new(10, 1, 0, 1));
        assert_eq!(remote.mask, Ipv4Addr::new(255, 255, 255, 0));
        assert!(alloc.has_allocation(REMOTE, &hw(1)));
        assert!(!alloc.has_allocation(REMOTE, &hw(2)));
    }

    #[test]
    fn unknown_network_is_reported() {
        let mut alloc = allocator();
        let other = Ipv4Addr::new(172, 16, 0, 0);

        assert_eq!(
            alloc.allocate(other, &hw(1), None),
            Err(Error::UnknownNetwork(other))
        );
        assert!(matches!(
            alloc.get_allocation(other, &hw(1)),
            Err(Error::NoAllocation { .. })
        ));
    }

    #[test]
    fn renew_checks_the_held_address() {
        let mut alloc = allocator();
        let a = alloc.allocate(LOCAL, &hw(1), None).unwrap();

        assert_eq!(alloc.renew(LOCAL, &hw(1), a.ip).unwrap().ip, a.ip);
        assert_eq!(
            alloc.renew(LOCAL, &hw(1), Ipv4Addr::new(10, 0, 0, 6)),
            Err(Error::InvalidAddress(Ipv4Addr::new(10, 0, 0, 6)))
        );
        assert_eq!(
            alloc.renew(LOCAL, &hw(2), a.ip),
            Err(Error::NoAllocation {
                network: LOCAL,
                client: hw(2),
            })
        );
    }

    #[test]
    fn expired_allocations_are_freed() {
        let mut alloc = allocator();
        let a = alloc.allocate(LOCAL, &hw(1), None).unwrap();

        assert!(alloc.expire(a.allocated_at).is_empty());

        let freed = alloc.expire(a.allocated_at + a.lease_time);
        assert_eq!(freed.len(), 1);
        assert_eq!(freed[0].1, hw(1));
        assert!(!alloc.has_allocation(LOCAL, &hw(1)));
    }

    #[test]
    fn restore_rejects_taken_addresses() {
        let mut alloc = allocator();
        let ip = Ipv4Addr::new(10, 0, 0, 4);

        alloc.restore(LOCAL, hw(1), ip, 100).unwrap();
        assert_eq!(alloc.get_allocation(LOCAL, &hw(1)).unwrap().ip, ip);
        assert_eq!(
            alloc.restore(LOCAL, hw(2), ip, 100),
            Err(Error::InvalidAddress(ip))
        );
        assert_eq!(
            alloc.restore(LOCAL, hw(3), Ipv4Addr::new(10, 0, 0, 7), 100),
            Err(Error::InvalidAddress(Ipv4Addr::new(10, 0, 0, 7)))
        );
    }

    #[test]
    fn special_id_and_hardware_are_distinct_clients() {
        let mut alloc = allocator();
        let special = ClientIdentity::SpecialId(ClientIdentifier {
            id_type: 1,
            id: vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, 1],
        });

        let a = alloc.allocate(LOCAL, &hw(1), None).unwrap();
        let b = alloc.allocate(LOCAL, &special, None).unwrap();
        assert_ne!(a.ip, b.ip);
    }

    #[test]
    fn revision_tracks_changes() {
        let mut alloc = allocator();
        let start = alloc.revision();

        alloc.allocate(LOCAL, &hw(1), None).unwrap();
        let after_alloc = alloc.revision();
        assert!(after_alloc > start);

        alloc.allocate(LOCAL, &hw(1), None).unwrap();
        assert_eq!(alloc.revision(), after_alloc);

        alloc.free(LOCAL, &hw(9));
        assert_eq!(alloc.revision(), after_alloc);
    }
}
