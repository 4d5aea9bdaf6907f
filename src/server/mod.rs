mod allocator;
mod config;
mod error;
mod leases;
mod pool;
mod state_machine;
mod transactions;

pub use state_machine::{Delivery, Reply};

use crate::args;
use crate::dhcp::{self, DhcpMessageTypes, DhcpOption, DhcpPacket};
use crate::transport::TransportChannel;
use allocator::unix_time;
use config::{generate_server_config, ServerConfig};
use log::{debug, error, info, log_enabled, trace, warn, Level};
use socket2::{Domain, Socket, Type};
use state_machine::{handle_message, ServerState};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// How long a read may block, and so how often maintenance runs on an idle
/// network.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Consecutive receive errors tolerated before giving up on the interface.
const MAX_RECV_ERRORS: usize = 10;

pub fn main(args: args::Arguments) -> Result<(), String> {
    let iface = &args.iface;

    let my_mac = iface.mac.ok_or_else(|| {
        format!("Unable to get the MAC of {} interface", iface.name)
    })?;

    let srv_conf = generate_server_config(&args)?;
    let mut state = ServerState::new(&srv_conf);
    log_config(&srv_conf, &state);

    if let Some(path) = &srv_conf.lease_file {
        leases::load_leases(path, &mut state.allocator)?;
    }

    let dhcp_port = dhcp::DHCP_SERVER_PORT;
    let _socket = match args.udp_bind {
        true => Some(open_udp_socket(srv_conf.my_ip, dhcp_port)?),
        false => None,
    };

    let mut channel = TransportChannel::new(iface, Some(RECV_TIMEOUT))
        .map_err(|e| format!("Unable to create a raw socket: {}", e))?;

    let running = Arc::new(AtomicBool::new(true));
    let run_c = running.clone();

    ctrlc::set_handler(move || {
        run_c.store(false, Ordering::SeqCst);
    })
    .map_err(|e| format!("Error setting Ctrl-C handler: {}", e))?;

    let mut saved_revision = state.allocator.revision();
    let mut last_maintenance = Instant::now();
    let mut recv_errors = 0;

    while running.load(Ordering::SeqCst) {
        if last_maintenance.elapsed() >= RECV_TIMEOUT {
            maintain(&mut state);
            last_maintenance = Instant::now();
        }

        let received = match channel.recv_dhcp(dhcp_port) {
            Ok(received) => {
                recv_errors = 0;
                received
            }
            Err(e) => {
                recv_errors += 1;
                if recv_errors >= MAX_RECV_ERRORS {
                    error!("{}, stopping", e);
                    break;
                }
                warn!("{}", e);
                None
            }
        };

        if let Some((ether_mac, request)) = received {
            trace_options("Request", &request);
            if let Some(reply) = handle_message(&request, &mut state) {
                trace_options("Reply", &reply.packet);
                if let Err(e) = channel.send_reply(
                    my_mac,
                    srv_conf.my_ip,
                    ether_mac,
                    &reply,
                ) {
                    warn!(
                        "Unable to send {}: {}",
                        DhcpMessageTypes::name(reply.msg_type)
                            .unwrap_or("reply"),
                        e
                    );
                }
            }
        }

        if state.allocator.revision() != saved_revision {
            persist(&srv_conf, &state);
            saved_revision = state.allocator.revision();
        }
    }

    info!("Stopping, {} leases held", state.allocator.allocation_count());
    if let Some(path) = &srv_conf.lease_file {
        leases::save_leases(path, &state.allocator)?;
    }

    return Ok(());
}

fn log_config(srv_conf: &ServerConfig, state: &ServerState) {
    info!("DHCP: {}", srv_conf.my_ip);
    info!("Mask: {}", srv_conf.net_mask);

    for pool in state.allocator.pools() {
        info!(
            "Pool {}/{}: {}-{}, lease {}s",
            pool.network(),
            pool.mask(),
            pool.start_ip(),
            pool.end_ip(),
            pool.lease_time()
        );
        info!("  DNS: {:?}", pool.dns_servers());
        info!("  Router: {:?}", pool.routers());
    }

    if let Some(path) = &srv_conf.lease_file {
        info!("Lease file: {}", path.display());
    }
}

fn trace_options(direction: &str, packet: &DhcpPacket) {
    if !log_enabled!(Level::Trace) {
        return;
    }

    trace!("{} {:#010x} options:", direction, packet.xid);
    for raw in packet.parse_options().iter() {
        match DhcpOption::decode(raw) {
            Ok(option) => trace!(
                "  {} {}: {}",
                option.code(),
                option.name().unwrap_or("Unknown"),
                option.value_str()
            ),
            Err(_) => trace!("  {}: malformed {:?}", raw.code, raw.data),
        }
    }
}

/// Frees expired leases and forgets stale transactions.
fn maintain(state: &mut ServerState) {
    for (network, client, address) in state.allocator.expire(unix_time()) {
        info!(
            "Lease of {} for {} in {} expired",
            address.ip, client, network
        );
    }

    let evicted = state.transactions.evict_expired();
    if evicted > 0 {
        debug!("Dropped {} stale transactions", evicted);
    }
}

fn persist(srv_conf: &ServerConfig, state: &ServerState) {
    if let Some(path) = &srv_conf.lease_file {
        if let Err(e) = leases::save_leases(path, &state.allocator) {
            warn!("{}", e);
        }
    }
}

fn open_udp_socket(ip: Ipv4Addr, port: u16) -> Result<UdpSocket, String> {
    setup_udp_socket(ip, port).map_err(|e| {
        format!("Error binding to UDP port {}:{} : {}", ip, port, e)
    })
}

fn setup_udp_socket(ip: Ipv4Addr, port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(ip, port)).into())?;
    return Ok(socket.into());
}
