use crate::args;
use crate::dhcp::MAX_OPTION_ADDRESSES;
use crate::helpers::get_iface_ipv4_network;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LEASE_TIME: u32 = 3600;

fn default_lease_time() -> u32 {
    DEFAULT_LEASE_TIME
}

/// One configured subnet, as read from the pools file or built from the
/// command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
    #[serde(default)]
    pub range_start: Option<Ipv4Addr>,
    #[serde(default)]
    pub range_end: Option<Ipv4Addr>,
    #[serde(default)]
    pub dns_servers: Vec<Ipv4Addr>,
    #[serde(default)]
    pub routers: Vec<Ipv4Addr>,
    #[serde(default = "default_lease_time")]
    pub lease_time: u32,
}

impl PoolDescriptor {
    pub fn validate(&self) -> Result<(), String> {
        let network = u32::from(self.network);
        let mask = u32::from(self.mask);

        let inverted = !mask;
        if inverted & inverted.wrapping_add(1) != 0 {
            return Err(format!("Invalid mask {}", self.mask));
        }

        if network & mask != network {
            return Err(format!(
                "Network {} is not aligned to mask {}",
                self.network, self.mask
            ));
        }

        let in_network = |ip: Ipv4Addr| u32::from(ip) & mask == network;
        for bound in self.range_start.iter().chain(self.range_end.iter()) {
            if !in_network(*bound) {
                return Err(format!(
                    "Range bound {} is outside of {}/{}",
                    bound, self.network, self.mask
                ));
            }
        }

        if let (Some(start), Some(end)) = (self.range_start, self.range_end) {
            if u32::from(start) > u32::from(end) {
                return Err(format!(
                    "Range start {} is greater than range end {}",
                    start, end
                ));
            }
        }

        if self.lease_time == 0 {
            return Err(format!("Lease time of {} must be > 0", self.network));
        }

        if self.dns_servers.len() > MAX_OPTION_ADDRESSES
            || self.routers.len() > MAX_OPTION_ADDRESSES
        {
            return Err(format!(
                "Too many DNS servers or routers in {} (max {})",
                self.network, MAX_OPTION_ADDRESSES
            ));
        }

        return Ok(());
    }

    /// Whether both networks share any address. Networks aligned to their
    /// masks either nest or are disjoint, so checking under the wider mask
    /// is enough.
    pub fn overlaps(&self, other: &PoolDescriptor) -> bool {
        let mask = u32::from(self.mask) & u32::from(other.mask);
        return u32::from(self.network) & mask
            == u32::from(other.network) & mask;
    }
}

#[derive(Debug, Deserialize)]
struct PoolsFile {
    pools: Vec<PoolDescriptor>,
}

pub fn parse_pools(json: &str) -> Result<Vec<PoolDescriptor>, String> {
    let file: PoolsFile = serde_json::from_str(json)
        .map_err(|e| format!("Invalid pools file: {}", e))?;

    validate_pools(&file.pools)?;

    return Ok(file.pools);
}

pub fn load_pools(path: &Path) -> Result<Vec<PoolDescriptor>, String> {
    let json = fs::read_to_string(path).map_err(|e| {
        format!("Unable to read pools file {}: {}", path.display(), e)
    })?;

    return parse_pools(&json);
}

pub fn validate_pools(pools: &[PoolDescriptor]) -> Result<(), String> {
    if pools.is_empty() {
        return Err(format!("No address pools configured"));
    }

    for pool in pools {
        pool.validate()?;
    }

    for (i, pool) in pools.iter().enumerate() {
        for other in &pools[i + 1..] {
            if pool.overlaps(other) {
                return Err(format!(
                    "Network {}/{} overlaps with {}/{}",
                    pool.network, pool.mask, other.network, other.mask
                ));
            }
        }
    }

    return Ok(());
}

pub struct ServerConfig {
    pub my_ip: Ipv4Addr,
    pub net_mask: Ipv4Addr,
    pub pools: Vec<PoolDescriptor>,
    pub lease_file: Option<PathBuf>,
    pub transaction_ttl: Duration,
    pub max_transactions: usize,
}

impl ServerConfig {
    /// Network of the clients that reach the server without a relay.
    pub fn local_network(&self) -> Ipv4Addr {
        return Ipv4Addr::from(u32::from(self.my_ip) & u32::from(self.net_mask));
    }
}

pub fn generate_server_config(
    args: &args::Arguments,
) -> Result<ServerConfig, String> {
    let iface = &args.iface;
    let iface_net = get_iface_ipv4_network(&iface).ok_or_else(|| {
        format!("Unable to get the network of {} interface", iface.name)
    })?;

    let my_ip = iface_net.ip();
    let net_mask = args.net_mask.unwrap_or_else(|| iface_net.mask());

    let pools = match &args.config {
        Some(path) => load_pools(path)?,
        None => {
            let pool = local_pool(args, my_ip, net_mask);
            validate_pools(std::slice::from_ref(&pool))?;
            vec![pool]
        }
    };

    let srv_conf = ServerConfig {
        my_ip,
        net_mask,
        pools,
        lease_file: args.lease_file.clone(),
        transaction_ttl: args.transaction_ttl,
        max_transactions: args.max_transactions,
    };

    let local_network = srv_conf.local_network();
    if !srv_conf.pools.iter().any(|p| p.network == local_network) {
        warn!(
            "No pool for the local network {}, only relayed clients will be served",
            local_network
        );
    }

    return Ok(srv_conf);
}

/// Single pool for the server network, filled with the command line
/// values or the defaults derived from the interface.
fn local_pool(
    args: &args::Arguments,
    my_ip: Ipv4Addr,
    mask: Ipv4Addr,
) -> PoolDescriptor {
    let network = Ipv4Addr::from(u32::from(my_ip) & u32::from(mask));

    let routers = match &args.routers {
        Some(ips) => ips.clone(),
        None => vec![my_ip],
    };

    let dns_servers = match &args.dns {
        Some(ips) => ips.clone(),
        None => vec![my_ip],
    };

    return PoolDescriptor {
        network,
        mask,
        range_start: args.start_ip,
        range_end: args.end_ip,
        dns_servers,
        routers,
        lease_time: args.lease_time.unwrap_or(DEFAULT_LEASE_TIME),
    };
}
