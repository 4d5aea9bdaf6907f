use clap::ArgMatches;
use pnet::datalink::{self, NetworkInterface};
use std::path::PathBuf;
use std::{net::Ipv4Addr, time::Duration};

pub fn is_u64(v: String) -> Result<(), String> {
    v.parse::<u64>().map_err(|_| {
        format!(
            "Incorrect value '{}' must be an unsigned integer of 64 bits (u64)",
            v
        )
    })?;

    return Ok(());
}

pub fn is_u32(v: String) -> Result<(), String> {
    v.parse::<u32>().map_err(|_| {
        format!(
            "Incorrect value '{}' must be an unsigned integer of 32 bits (u32)",
            v
        )
    })?;

    return Ok(());
}

pub fn is_interface(v: String) -> Result<(), String> {
    let iface = lookup_interface(&v);
    if iface.is_none() {
        return Err(format!("Interface '{}' not found in the system", v));
    }

    return Ok(());
}

pub fn lookup_interface(iface_name: &str) -> Option<NetworkInterface> {
    return datalink::interfaces()
        .into_iter()
        .find(|iface| &iface.name == iface_name);
}

pub fn is_ip(v: String) -> Result<(), String> {
    v.parse::<Ipv4Addr>()
        .map_err(|_| format!("'{}' is not a valid IPv4", v))?;
    return Ok(());
}

pub fn parse_ip(matches: &ArgMatches, name: &str) -> Option<Ipv4Addr> {
    matches.value_of(name).map(|ip| ip.parse().unwrap())
}

pub fn parse_ips(matches: &ArgMatches, name: &str) -> Option<Vec<Ipv4Addr>> {
    match matches.values_of(name) {
        None => None,
        Some(ips) => {
            if ips.len() == 0 {
                return None;
            }
            return Some(
                ips.into_iter().map(|ip| ip.parse().unwrap()).collect(),
            );
        }
    }
}

pub fn parse_path(matches: &ArgMatches, name: &str) -> Option<PathBuf> {
    matches.value_of(name).map(PathBuf::from)
}

pub fn parse_u32(matches: &ArgMatches, name: &str) -> Option<u32> {
    matches.value_of(name).map(|n| n.parse().unwrap())
}

pub fn parse_u64(matches: &ArgMatches, name: &str) -> Option<u64> {
    matches.value_of(name).map(|n| n.parse().unwrap())
}

pub fn parse_secs(matches: &ArgMatches, name: &str) -> Option<Duration> {
    parse_u64(matches, name).map(Duration::from_secs)
}
