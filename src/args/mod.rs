mod helpers;

use clap::{App, Arg, ArgMatches};
use pnet::datalink::NetworkInterface;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TRANSACTION_TTL: &str = "60";
pub const DEFAULT_MAX_TRANSACTIONS: &str = "4096";

const POOL_ARGS: &[&str] =
    &["start-ip", "end-ip", "mask", "router", "dns", "lease-time"];

fn args() -> App<'static, 'static> {
    App::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name("iface")
                .long("iface")
                .short("I")
                .required(true)
                .takes_value(true)
                .validator(helpers::is_interface)
                .help("Interface to listen requests"),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .short("c")
                .takes_value(true)
                .value_name("file")
                .conflicts_with_all(POOL_ARGS)
                .help("JSON file with the address pools to serve"),
        )
        .arg(
            Arg::with_name("start-ip")
                .long("start-ip")
                .short("s")
                .takes_value(true)
                .value_name("ip")
                .validator(helpers::is_ip)
                .help("Start IP of offered IPs"),
        )
        .arg(
            Arg::with_name("end-ip")
                .long("end-ip")
                .short("e")
                .takes_value(true)
                .value_name("ip")
                .validator(helpers::is_ip)
                .help("End IP of offered IPs"),
        )
        .arg(
            Arg::with_name("mask")
                .long("mask")
                .short("m")
                .takes_value(true)
                .value_name("ip")
                .validator(helpers::is_ip)
                .help("Net mask. If none, the interface mask will be used"),
        )
        .arg(
            Arg::with_name("router")
                .long("router")
                .visible_alias("gateway")
                .short("r")
                .takes_value(true)
                .use_delimiter(true)
                .value_name("ip")
                .validator(helpers::is_ip)
                .help("Gateway IP. If none, the DHCP server IP will be used"),
        )
        .arg(
            Arg::with_name("dns")
                .long("dns")
                .short("D")
                .takes_value(true)
                .value_name("ip")
                .use_delimiter(true)
                .validator(helpers::is_ip)
                .help("DNS server IP. If none, the DHCP server IP will be used"),
        )
        .arg(
            Arg::with_name("lease-time")
                .long("lease-time")
                .short("l")
                .takes_value(true)
                .value_name("seconds")
                .validator(helpers::is_u32)
                .help("Lease time of the offered IPs (default 3600)"),
        )
        .arg(
            Arg::with_name("lease-file")
                .long("lease-file")
                .short("f")
                .takes_value(true)
                .value_name("file")
                .help("File to save the leases to, and restore them from at startup"),
        )
        .arg(
            Arg::with_name("transaction-ttl")
                .long("transaction-ttl")
                .short("t")
                .takes_value(true)
                .value_name("seconds")
                .default_value(DEFAULT_TRANSACTION_TTL)
                .validator(helpers::is_u64)
                .help("Seconds an offer waits for its request"),
        )
        .arg(
            Arg::with_name("max-transactions")
                .long("max-transactions")
                .takes_value(true)
                .value_name("n")
                .default_value(DEFAULT_MAX_TRANSACTIONS)
                .validator(helpers::is_u64)
                .help("Maximum number of pending offers"),
        )
        .arg(
            Arg::with_name("no-bind")
                .long("no-bind")
                .help("Avoid binding to the port in the UDP transport layer to indicate the OS that is going to be used (OS could sent ICMP requests indicating that the port is closed)")
        )
        .arg(
            Arg::with_name("verbosity")
                .short("v")
                .multiple(true)
                .help("Increase message verbosity"),
        )
}

pub struct Arguments {
    pub iface: NetworkInterface,
    pub config: Option<PathBuf>,
    pub start_ip: Option<Ipv4Addr>,
    pub end_ip: Option<Ipv4Addr>,
    pub net_mask: Option<Ipv4Addr>,
    pub routers: Option<Vec<Ipv4Addr>>,
    pub dns: Option<Vec<Ipv4Addr>>,
    pub lease_time: Option<u32>,
    pub lease_file: Option<PathBuf>,
    pub transaction_ttl: Duration,
    pub max_transactions: usize,
    pub udp_bind: bool,
    pub verbosity: usize,
}

impl<'a> Arguments {
    pub fn parse_args() -> Self {
        return Self::parse(&args().get_matches());
    }

    pub fn parse(matches: &'a ArgMatches) -> Arguments {
        let iface =
            helpers::lookup_interface(matches.value_of("iface").unwrap())
                .unwrap();

        Self {
            iface,
            config: helpers::parse_path(matches, "config"),
            start_ip: helpers::parse_ip(matches, "start-ip"),
            end_ip: helpers::parse_ip(matches, "end-ip"),
            net_mask: helpers::parse_ip(matches, "mask"),
            routers: helpers::parse_ips(matches, "router"),
            dns: helpers::parse_ips(matches, "dns"),
            lease_time: helpers::parse_u32(matches, "lease-time"),
            lease_file: helpers::parse_path(matches, "lease-file"),
            transaction_ttl: helpers::parse_secs(matches, "transaction-ttl")
                .unwrap(),
            max_transactions: helpers::parse_u64(matches, "max-transactions")
                .unwrap() as usize,
            udp_bind: !matches.is_present("no-bind"),
            verbosity: matches.occurrences_of("verbosity") as usize,
        }
    }
}
