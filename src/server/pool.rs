use super::config::PoolDescriptor;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// One configured network. The DNS and router lists are shared with every
/// address allocated from the pool.
#[derive(Debug)]
pub struct AddressPool {
    network: Ipv4Addr,
    mask: Ipv4Addr,
    first: u32,
    last: u32,
    dns_servers: Arc<Vec<Ipv4Addr>>,
    routers: Arc<Vec<Ipv4Addr>>,
    lease_time: u32,
    reserved: BTreeSet<Ipv4Addr>,
}

impl AddressPool {
    /// `server_ip` is never handed out if it falls inside the pool.
    pub fn new(descriptor: &PoolDescriptor, server_ip: Ipv4Addr) -> Self {
        let network = u32::from(descriptor.network);
        let mask = u32::from(descriptor.mask);
        let broadcast = network | !mask;

        let first = match descriptor.range_start {
            Some(ip) => u32::from(ip),
            None => network.saturating_add(1),
        };
        let last = match descriptor.range_end {
            Some(ip) => u32::from(ip),
            None => broadcast.saturating_sub(1),
        };

        let mut reserved = BTreeSet::new();
        reserved.insert(Ipv4Addr::from(network));
        reserved.insert(Ipv4Addr::from(broadcast));
        reserved.insert(server_ip);
        reserved.extend(descriptor.routers.iter().copied());
        reserved.extend(descriptor.dns_servers.iter().copied());

        return Self {
            network: descriptor.network,
            mask: descriptor.mask,
            first,
            last,
            dns_servers: Arc::new(descriptor.dns_servers.clone()),
            routers: Arc::new(descriptor.routers.clone()),
            lease_time: descriptor.lease_time,
            reserved,
        };
    }

    pub fn network(&self) -> Ipv4Addr {
        return self.network;
    }

    pub fn mask(&self) -> Ipv4Addr {
        return self.mask;
    }

    pub fn lease_time(&self) -> u32 {
        return self.lease_time;
    }

    pub fn dns_servers(&self) -> &Arc<Vec<Ipv4Addr>> {
        return &self.dns_servers;
    }

    pub fn routers(&self) -> &Arc<Vec<Ipv4Addr>> {
        return &self.routers;
    }

    pub fn start_ip(&self) -> Ipv4Addr {
        return Ipv4Addr::from(self.first);
    }

    pub fn end_ip(&self) -> Ipv4Addr {
        return Ipv4Addr::from(self.last);
    }

    /// Whether the address belongs to the pool network.
    pub fn may_contain(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        return u32::from(ip) & mask == u32::from(self.network);
    }

    /// Whether the address may be handed out to a client.
    pub fn is_allocatable(&self, ip: Ipv4Addr) -> bool {
        let ip_int = u32::from(ip);
        return self.may_contain(ip)
            && ip_int >= self.first
            && ip_int <= self.last
            && !self.reserved.contains(&ip);
    }

    /// Allocatable addresses, in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        (self.first..=self.last)
            .map(Ipv4Addr::from)
            .filter(move |ip| self.is_allocatable(*ip))
    }
}
