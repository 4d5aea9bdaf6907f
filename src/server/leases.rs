use super::allocator::{AddressAllocator, AllocatedAddress, ClientIdentity};
use crate::dhcp::{
    parse_ipv4, ClientIdentifier, IResult, MAX_OPTION_ADDRESSES,
};
use log::{debug, info, warn};
use nom::bytes::complete::take;
use nom::combinator::verify;
use nom::multi::count;
use nom::number::complete::{be_u32, be_u8};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

const HARDWARE_KIND: u8 = 0;
const SPECIAL_ID_KIND: u8 = 1;

/// An allocation as read back from the lease file.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseRecord {
    pub network: Ipv4Addr,
    pub client: ClientIdentity,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub lease_time: u32,
    pub allocated_at: u32,
    pub dns_servers: Vec<Ipv4Addr>,
    pub routers: Vec<Ipv4Addr>,
}

fn encode_addrs(raw: &mut Vec<u8>, addrs: &[Ipv4Addr]) {
    raw.extend(&(addrs.len() as u32).to_be_bytes());
    for addr in addrs {
        raw.extend(&addr.octets());
    }
}

pub fn encode_record(
    network: Ipv4Addr,
    client: &ClientIdentity,
    address: &AllocatedAddress,
) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend(&network.octets());

    let (kind, id_type, id) = match client {
        ClientIdentity::Hardware { htype, addr } => {
            (HARDWARE_KIND, *htype, addr.as_slice())
        }
        ClientIdentity::SpecialId(ci) => {
            (SPECIAL_ID_KIND, ci.id_type, ci.id.as_slice())
        }
    };
    raw.push(kind);
    raw.push(id_type);
    raw.push(id.len() as u8);
    raw.extend(id);

    raw.extend(&address.ip.octets());
    raw.extend(&address.mask.octets());
    raw.extend(&address.lease_time.to_be_bytes());
    raw.extend(&address.allocated_at.to_be_bytes());
    encode_addrs(&mut raw, &address.dns_servers);
    encode_addrs(&mut raw, &address.routers);

    return raw;
}

fn parse_addrs(raw: &[u8]) -> IResult<&[u8], Vec<Ipv4Addr>> {
    let (raw, n) =
        verify(be_u32, |n: &u32| *n as usize <= MAX_OPTION_ADDRESSES)(raw)?;
    return count(parse_ipv4, n as usize)(raw);
}

fn parse_identity(raw: &[u8]) -> IResult<&[u8], ClientIdentity> {
    let (raw, kind) =
        verify(be_u8, |k: &u8| *k == HARDWARE_KIND || *k == SPECIAL_ID_KIND)(
            raw,
        )?;
    let (raw, id_type) = be_u8(raw)?;
    let (raw, len) = be_u8(raw)?;
    let (raw, id) = take(len)(raw)?;

    let client = match kind {
        HARDWARE_KIND => ClientIdentity::Hardware {
            htype: id_type,
            addr: id.to_vec(),
        },
        _ => ClientIdentity::SpecialId(ClientIdentifier {
            id_type,
            id: id.to_vec(),
        }),
    };

    return Ok((raw, client));
}

pub fn parse_record(raw: &[u8]) -> IResult<&[u8], LeaseRecord> {
    let (raw, network) = parse_ipv4(raw)?;
    let (raw, client) = parse_identity(raw)?;
    let (raw, ip) = parse_ipv4(raw)?;
    let (raw, mask) = parse_ipv4(raw)?;
    let (raw, lease_time) = be_u32(raw)?;
    let (raw, allocated_at) = be_u32(raw)?;
    let (raw, dns_servers) = parse_addrs(raw)?;
    let (raw, routers) = parse_addrs(raw)?;

    return Ok((
        raw,
        LeaseRecord {
            network,
            client,
            ip,
            mask,
            lease_time,
            allocated_at,
            dns_servers,
            routers,
        },
    ));
}

/// Parses records until the data runs out. A malformed or truncated record
/// ends the parsing, keeping the records read before it.
pub fn parse_records(mut raw: &[u8]) -> Vec<LeaseRecord> {
    let mut records = Vec::new();

    while !raw.is_empty() {
        match parse_record(raw) {
            Ok((rest, record)) => {
                records.push(record);
                raw = rest;
            }
            Err(_) => {
                warn!(
                    "Malformed lease record, ignoring the last {} bytes",
                    raw.len()
                );
                break;
            }
        }
    }

    return records;
}

/// Writes every allocation to `path`, through a temporary file so a crash
/// never leaves a half written lease file.
pub fn save_leases(
    path: &Path,
    allocator: &AddressAllocator,
) -> Result<(), String> {
    let mut raw = Vec::new();
    for (network, client, address) in allocator.allocations() {
        raw.extend(encode_record(network, client, address));
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");

    fs::write(&tmp_path, &raw).map_err(|e| {
        format!("Unable to write {}: {}", Path::new(&tmp_path).display(), e)
    })?;
    fs::rename(&tmp_path, path).map_err(|e| {
        format!("Unable to replace {}: {}", path.display(), e)
    })?;

    debug!(
        "Saved {} leases to {}",
        allocator.allocation_count(),
        path.display()
    );
    return Ok(());
}

/// Restores the allocations saved in `path`, returning how many. A missing
/// file is not an error. The mask, lease time and lists of every restored
/// allocation come from the configured pool.
pub fn load_leases(
    path: &Path,
    allocator: &mut AddressAllocator,
) -> Result<usize, String> {
    if !path.exists() {
        info!("No lease file at {}, starting empty", path.display());
        return Ok(0);
    }

    let raw = fs::read(path).map_err(|e| {
        format!("Unable to read lease file {}: {}", path.display(), e)
    })?;

    let mut restored = 0;
    for record in parse_records(&raw) {
        match allocator.restore(
            record.network,
            record.client.clone(),
            record.ip,
            record.allocated_at,
        ) {
            Ok(()) => {
                restored += 1;
                log_changed_parameters(&record, allocator);
            }
            Err(e) => warn!(
                "Skipping lease of {} for {}: {}",
                record.ip, record.client, e
            ),
        }
    }

    info!("Restored {} leases from {}", restored, path.display());
    return Ok(restored);
}

fn log_changed_parameters(record: &LeaseRecord, allocator: &AddressAllocator) {
    let pool = match allocator.pool(record.network) {
        Ok(pool) => pool,
        Err(_) => return,
    };

    if record.mask != pool.mask()
        || record.lease_time != pool.lease_time()
        || record.dns_servers != **pool.dns_servers()
        || record.routers != **pool.routers()
    {
        debug!(
            "Lease of {} restored with the current parameters of {}",
            record.ip, record.network
        );
    }
}
