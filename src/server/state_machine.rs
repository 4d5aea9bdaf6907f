use super::allocator::{AddressAllocator, AllocatedAddress, ClientIdentity};
use super::config::ServerConfig;
use super::pool::AddressPool;
use super::transactions::TransactionStore;
use crate::dhcp::{
    DhcpMessageTypes, DhcpOption, DhcpPacket, Options, BOOT_REQUEST,
};
use log::{debug, info, warn};
use std::net::Ipv4Addr;

/// Everything the handlers read and mutate, passed explicitly to
/// `handle_message` for every inbound message.
pub struct ServerState {
    pub my_ip: Ipv4Addr,
    pub allocator: AddressAllocator,
    pub transactions: TransactionStore,
}

impl ServerState {
    pub fn new(srv_conf: &ServerConfig) -> Self {
        let pools = srv_conf
            .pools
            .iter()
            .map(|desc| AddressPool::new(desc, srv_conf.my_ip))
            .collect();

        return Self {
            my_ip: srv_conf.my_ip,
            allocator: AddressAllocator::new(srv_conf.local_network(), pools),
            transactions: TransactionStore::new(
                srv_conf.transaction_ttl,
                srv_conf.max_transactions,
            ),
        };
    }
}

/// Client state deduced from a REQUEST, RFC 2131 section 4.3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Selecting,
    InitReboot,
    Renewing,
    Rebinding,
    Unknown,
}

/// Where the transport must send a reply, RFC 2131 section 4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Unicast to the relay agent, on the server port.
    Relay(Ipv4Addr),
    /// Unicast to the address the client already has.
    Client(Ipv4Addr),
    Broadcast,
    /// Unicast to `yiaddr`, using the client hardware address.
    Hardware(Ipv4Addr),
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub msg_type: u8,
    pub packet: DhcpPacket,
    pub delivery: Delivery,
}

struct Client {
    identity: ClientIdentity,
    network: Ipv4Addr,
}

/// Processes one inbound message. Returns the reply to send, if any.
pub fn handle_message(
    request: &DhcpPacket,
    state: &mut ServerState,
) -> Option<Reply> {
    if request.op != BOOT_REQUEST {
        return None;
    }

    let options = request.parse_options();
    let msg_type = match options.dhcp_msg_type() {
        Some(msg_type) => msg_type,
        None => {
            debug!(
                "Message {:#010x} from {} without type, dropped",
                request.xid,
                request.client_hw_str()
            );
            return None;
        }
    };

    let identity = ClientIdentity::from_request(request, &options);
    let network = match state.allocator.resolve_network(request.giaddr) {
        Ok(network) => network,
        Err(e) => {
            debug!("Message from {} dropped: {}", identity, e);
            return None;
        }
    };
    let client = Client { identity, network };

    match msg_type {
        DhcpMessageTypes::DISCOVER => {
            info!("DISCOVER from {} in {}", client.identity, client.network);
            process_discover(request, &options, &client, state)
        }
        DhcpMessageTypes::REQUEST => {
            info!("REQUEST from {} in {}", client.identity, client.network);
            process_request(request, &options, &client, state)
        }
        DhcpMessageTypes::RELEASE => {
            info!("RELEASE from {} of {}", client.identity, request.ciaddr);
            process_release(request, &client, state);
            None
        }
        _ => {
            debug!(
                "Ignoring {} from {}",
                DhcpMessageTypes::name(msg_type).unwrap_or("unknown message"),
                client.identity
            );
            None
        }
    }
}

/// Evaluated top to bottom, the first match wins.
pub fn classify_request(request: &DhcpPacket, options: &Options) -> ClientState {
    let server_id = match options.dhcp_server_id() {
        Some(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    };
    let ciaddr_set = !request.ciaddr.is_unspecified();
    let yiaddr_set = !request.yiaddr.is_unspecified();

    if server_id.is_some() && !ciaddr_set && yiaddr_set {
        return ClientState::Selecting;
    }

    if server_id.is_none() && !ciaddr_set && yiaddr_set {
        return ClientState::InitReboot;
    }

    if ciaddr_set && !yiaddr_set {
        return ClientState::Renewing;
    }

    if ciaddr_set {
        return ClientState::Rebinding;
    }

    return ClientState::Unknown;
}

fn process_discover(
    request: &DhcpPacket,
    options: &Options,
    client: &Client,
    state: &mut ServerState,
) -> Option<Reply> {
    if state.transactions.exists(request.xid) {
        debug!(
            "Transaction {:#010x} already offered, DISCOVER ignored",
            request.xid
        );
        return None;
    }

    let requested_ip = options.requested_ip_address();
    let address = match state.allocator.allocate(
        client.network,
        &client.identity,
        requested_ip,
    ) {
        Ok(address) => address,
        Err(e) => {
            warn!("No offer for {}: {}", client.identity, e);
            return None;
        }
    };

    info!("OFFER {} to {}", address.ip, client.identity);
    state.transactions.create(request.xid, address.clone());

    return Some(respond(
        request,
        &address,
        DhcpMessageTypes::OFFER,
        state.my_ip,
    ));
}

fn process_request(
    request: &DhcpPacket,
    options: &Options,
    client: &Client,
    state: &mut ServerState,
) -> Option<Reply> {
    let client_state = classify_request(request, options);
    debug!("{} is in state {:?}", client.identity, client_state);

    let reply = match client_state {
        ClientState::Selecting => {
            process_selecting(request, options, client, state)
        }
        ClientState::InitReboot => {
            process_init_reboot(request, options, client, state)
        }
        ClientState::Renewing | ClientState::Rebinding => {
            process_lease_extension(request, client, state)
        }
        ClientState::Unknown => None,
    };

    state.transactions.remove(request.xid);

    return reply;
}

fn process_selecting(
    request: &DhcpPacket,
    options: &Options,
    client: &Client,
    state: &mut ServerState,
) -> Option<Reply> {
    if options.dhcp_server_id() != Some(state.my_ip) {
        info!("{} selected another server", client.identity);
        state.allocator.free(client.network, &client.identity);
        return None;
    }

    let offered = match state.transactions.get(request.xid) {
        Ok(transaction) => transaction.offered.clone(),
        Err(e) => {
            debug!("REQUEST from {} dropped: {}", client.identity, e);
            return None;
        }
    };

    if options.requested_ip_address() != Some(offered.ip) {
        return Some(nak(request, &offered, client, state.my_ip));
    }

    return match state.allocator.renew(
        client.network,
        &client.identity,
        offered.ip,
    ) {
        Ok(address) => Some(ack(request, &address, client, state.my_ip)),
        Err(e) => {
            debug!("Offer to {} no longer valid: {}", client.identity, e);
            Some(nak(request, &offered, client, state.my_ip))
        }
    };
}

fn process_init_reboot(
    request: &DhcpPacket,
    options: &Options,
    client: &Client,
    state: &mut ServerState,
) -> Option<Reply> {
    let requested_ip = match options.requested_ip_address() {
        Some(ip) => ip,
        None => {
            debug!("INIT-REBOOT from {} without address", client.identity);
            return None;
        }
    };

    let current = match state
        .allocator
        .get_allocation(client.network, &client.identity)
    {
        Ok(address) => address.clone(),
        Err(e) => {
            debug!("{}, staying silent", e);
            return None;
        }
    };

    return match state.allocator.renew(
        client.network,
        &client.identity,
        requested_ip,
    ) {
        Ok(address) => Some(ack(request, &address, client, state.my_ip)),
        Err(_) => {
            let mut invalid = current;
            invalid.ip = requested_ip;
            Some(nak(request, &invalid, client, state.my_ip))
        }
    };
}

/// RENEWING and REBINDING: the lease of `ciaddr` is extended if the client
/// holds it, refused if it holds another one, and ignored if it holds none.
fn process_lease_extension(
    request: &DhcpPacket,
    client: &Client,
    state: &mut ServerState,
) -> Option<Reply> {
    let current = match state
        .allocator
        .get_allocation(client.network, &client.identity)
    {
        Ok(address) => address.clone(),
        Err(e) => {
            debug!("{}, staying silent", e);
            return None;
        }
    };

    return match state.allocator.renew(
        client.network,
        &client.identity,
        request.ciaddr,
    ) {
        Ok(address) => Some(ack(request, &address, client, state.my_ip)),
        Err(_) => {
            let mut invalid = current;
            invalid.ip = request.ciaddr;
            Some(nak(request, &invalid, client, state.my_ip))
        }
    };
}

fn process_release(
    request: &DhcpPacket,
    client: &Client,
    state: &mut ServerState,
) {
    let held = state
        .allocator
        .get_allocation(client.network, &client.identity)
        .map(|address| address.ip);

    match held {
        Ok(ip) if ip == request.ciaddr => {
            state.allocator.free(client.network, &client.identity);
        }
        Ok(ip) => debug!(
            "{} released {} but holds {}",
            client.identity, request.ciaddr, ip
        ),
        Err(e) => debug!("{}", e),
    }
}

fn ack(
    request: &DhcpPacket,
    address: &AllocatedAddress,
    client: &Client,
    my_ip: Ipv4Addr,
) -> Reply {
    info!("ACK {} to {}", address.ip, client.identity);
    let mut reply = respond(request, address, DhcpMessageTypes::ACK, my_ip);
    reply.packet.ciaddr = request.ciaddr;
    return reply;
}

fn nak(
    request: &DhcpPacket,
    address: &AllocatedAddress,
    client: &Client,
    my_ip: Ipv4Addr,
) -> Reply {
    info!("NAK {} to {}", address.ip, client.identity);
    return respond(request, address, DhcpMessageTypes::NAK, my_ip);
}

/// Builds an OFFER, ACK or NAK for `address`.
pub fn respond(
    request: &DhcpPacket,
    address: &AllocatedAddress,
    msg_type: u8,
    my_ip: Ipv4Addr,
) -> Reply {
    let mut packet = DhcpPacket::new_reply(request);
    packet.yiaddr = address.ip;
    packet.set_options(&[
        DhcpOption::IpAddressLeaseTime(address.lease_time),
        DhcpOption::DhcpMsgType(msg_type),
        DhcpOption::DhcpServerId(my_ip),
        DhcpOption::SubnetMask(address.mask),
        DhcpOption::Router(address.routers.to_vec()),
        DhcpOption::DomainServer(address.dns_servers.to_vec()),
    ]);

    let delivery = delivery_for(request, msg_type, packet.yiaddr);

    return Reply {
        msg_type,
        packet,
        delivery,
    };
}

pub fn delivery_for(
    request: &DhcpPacket,
    msg_type: u8,
    yiaddr: Ipv4Addr,
) -> Delivery {
    if !request.giaddr.is_unspecified() {
        return Delivery::Relay(request.giaddr);
    }

    if msg_type == DhcpMessageTypes::NAK {
        return Delivery::Broadcast;
    }

    if !request.ciaddr.is_unspecified() {
        return Delivery::Client(request.ciaddr);
    }

    if request.is_broadcast() {
        return Delivery::Broadcast;
    }

    return Delivery::Hardware(yiaddr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::{ClientIdentifier, DhcpOptions, BROADCAST_FLAG};
    use crate::server::config::PoolDescriptor;
    use std::time::Duration;

    const MY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const OTHER_SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 254);
    const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);
    const REMOTE: Ipv4Addr = Ipv4Addr::new(10, 1, 0, 0);
    const MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01];

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr::new(a, b, c, d)
    }

    fn srv_conf(local_mask: Ipv4Addr) -> ServerConfig {
        ServerConfig {
            my_ip: MY_IP,
            net_mask: Ipv4Addr::new(255, 255, 255, 0),
            pools: vec![
                PoolDescriptor {
                    network: LOCAL,
                    mask: local_mask,
                    range_start: None,
                    range_end: None,
                    dns_servers: vec![ip(8, 8, 8, 8), ip(8, 8, 4, 4)],
                    routers: vec![MY_IP],
                    lease_time: 3600,
                },
                PoolDescriptor {
                    network: REMOTE,
                    mask: Ipv4Addr::new(255, 255, 255, 0),
                    range_start: Some(ip(10, 1, 0, 100)),
                    range_end: None,
                    dns_servers: vec![],
                    routers: vec![ip(10, 1, 0, 1)],
                    lease_time: 600,
                },
            ],
            lease_file: None,
            transaction_ttl: Duration::from_secs(60),
            max_transactions: 64,
        }
    }

    fn state() -> ServerState {
        ServerState::new(&srv_conf(Ipv4Addr::new(255, 255, 255, 0)))
    }

    fn message(msg_type: u8, xid: u32, extra: Vec<DhcpOption>) -> DhcpPacket {
        let mut packet = DhcpPacket::new_request();
        packet.xid = xid;
        packet.chaddr[..6].copy_from_slice(&MAC);
        let mut options = vec![DhcpOption::DhcpMsgType(msg_type)];
        options.extend(extra);
        packet.set_options(&options);
        return packet;
    }

    fn discover(xid: u32) -> DhcpPacket {
        message(DhcpMessageTypes::DISCOVER, xid, vec![])
    }

    fn request(xid: u32, server_id: Ipv4Addr, requested: Ipv4Addr) -> DhcpPacket {
        let mut packet = message(
            DhcpMessageTypes::REQUEST,
            xid,
            vec![
                DhcpOption::DhcpServerId(server_id),
                DhcpOption::RequestedIpAddress(requested),
            ],
        );
        packet.yiaddr = requested;
        return packet;
    }

    fn hw_client() -> ClientIdentity {
        ClientIdentity::Hardware {
            htype: 1,
            addr: MAC.to_vec(),
        }
    }

    fn classify(
        server_id: Option<Ipv4Addr>,
        ciaddr: Ipv4Addr,
        yiaddr: Ipv4Addr,
    ) -> ClientState {
        let extra = server_id
            .map(|id| vec![DhcpOption::DhcpServerId(id)])
            .unwrap_or_default();
        let mut packet = message(DhcpMessageTypes::REQUEST, 1, extra);
        packet.ciaddr = ciaddr;
        packet.yiaddr = yiaddr;
        return classify_request(&packet, &packet.parse_options());
    }

    #[test]
    fn classification_table() {
        let zero = Ipv4Addr::UNSPECIFIED;
        let addr = ip(10, 0, 0, 5);

        assert_eq!(classify(Some(MY_IP), zero, addr), ClientState::Selecting);
        assert_eq!(classify(None, zero, addr), ClientState::InitReboot);
        assert_eq!(classify(Some(zero), zero, addr), ClientState::InitReboot);
        assert_eq!(classify(None, addr, zero), ClientState::Renewing);
        assert_eq!(classify(Some(MY_IP), addr, zero), ClientState::Renewing);
        assert_eq!(classify(None, addr, addr), ClientState::Rebinding);
        assert_eq!(classify(None, zero, zero), ClientState::Unknown);
        assert_eq!(classify(Some(MY_IP), zero, zero), ClientState::Unknown);
    }

    #[test]
    fn discover_is_offered() {
        let mut state = state();
        let reply = handle_message(&discover(7), &mut state).unwrap();

        assert_eq!(reply.msg_type, DhcpMessageTypes::OFFER);
        assert_eq!(reply.packet.yiaddr, ip(10, 0, 0, 2));
        assert_eq!(reply.packet.xid, 7);
        assert_eq!(&reply.packet.chaddr[..6], &MAC);
        assert_eq!(reply.delivery, Delivery::Hardware(ip(10, 0, 0, 2)));
        assert!(state.transactions.exists(7));

        let options = reply.packet.parse_options();
        let codes: Vec<u8> = options.iter().map(|o| o.code).collect();
        assert_eq!(codes, vec![1, 3, 6, 51, 53, 54]);
        assert_eq!(
            options.decode(DhcpOptions::IP_ADDRESS_LEASE_TIME),
            Some(DhcpOption::IpAddressLeaseTime(3600))
        );
        assert_eq!(options.dhcp_server_id(), Some(MY_IP));
        assert_eq!(
            options.decode(DhcpOptions::DOMAIN_SERVER),
            Some(DhcpOption::DomainServer(vec![ip(8, 8, 8, 8), ip(8, 8, 4, 4)]))
        );
        assert_eq!(
            reply.packet.options,
            vec![
                51, 4, 0, 0, 0x0e, 0x10, 53, 1, 2, 54, 4, 10, 0, 0, 1, 1, 4,
                255, 255, 255, 0, 3, 4, 10, 0, 0, 1, 6, 8, 8, 8, 8, 8, 8, 8,
                4, 4, 255,
            ]
        );
    }

    #[test]
    fn duplicate_discover_is_ignored() {
        let mut state = state();

        assert!(handle_message(&discover(7), &mut state).is_some());
        assert!(handle_message(&discover(7), &mut state).is_none());
        assert_eq!(state.allocator.allocation_count(), 1);
    }

    #[test]
    fn broadcast_flag_is_honoured() {
        let mut state = state();
        let mut packet = discover(7);
        packet.flags = BROADCAST_FLAG;

        let reply = handle_message(&packet, &mut state).unwrap();
        assert_eq!(reply.delivery, Delivery::Broadcast);
        assert!(reply.packet.is_broadcast());
    }

    #[test]
    fn message_without_type_is_dropped() {
        let mut state = state();
        let mut packet = discover(7);
        packet.options = vec![255];

        assert!(handle_message(&packet, &mut state).is_none());
        assert!(!state.transactions.exists(7));
        assert_eq!(state.allocator.allocation_count(), 0);
    }

    #[test]
    fn replies_are_ignored() {
        let mut state = state();
        let mut packet = discover(7);
        packet.op = 2;

        assert!(handle_message(&packet, &mut state).is_none());
    }

    #[test]
    fn selecting_with_offered_address_is_acked() {
        let mut state = state();
        let offer = handle_message(&discover(7), &mut state).unwrap();
        let offered = offer.packet.yiaddr;

        let reply =
            handle_message(&request(7, MY_IP, offered), &mut state).unwrap();

        assert_eq!(reply.msg_type, DhcpMessageTypes::ACK);
        assert_eq!(reply.packet.yiaddr, offered);
        assert!(!state.transactions.exists(7));
        assert!(state.allocator.has_allocation(LOCAL, &hw_client()));
    }

    #[test]
    fn selecting_with_other_address_is_naked() {
        let mut state = state();
        let offer = handle_message(&discover(7), &mut state).unwrap();

        let reply =
            handle_message(&request(7, MY_IP, ip(10, 0, 0, 9)), &mut state)
                .unwrap();

        assert_eq!(reply.msg_type, DhcpMessageTypes::NAK);
        assert_eq!(reply.packet.yiaddr, offer.packet.yiaddr);
        assert_eq!(reply.delivery, Delivery::Broadcast);
        assert!(!state.transactions.exists(7));
    }

    #[test]
    fn selecting_another_server_frees_the_offer() {
        let mut state = state();
        let offer = handle_message(&discover(7), &mut state).unwrap();

        let reply = handle_message(
            &request(7, OTHER_SERVER, offer.packet.yiaddr),
            &mut state,
        );

        assert!(reply.is_none());
        assert!(!state.allocator.has_allocation(LOCAL, &hw_client()));
        assert!(!state.transactions.exists(7));
    }

    #[test]
    fn selecting_without_transaction_is_silent() {
        let mut state = state();
        handle_message(&discover(7), &mut state).unwrap();

        let reply =
            handle_message(&request(8, MY_IP, ip(10, 0, 0, 2)), &mut state);

        assert!(reply.is_none());
        assert!(state.transactions.exists(7));
    }

    #[test]
    fn init_reboot_with_held_address_is_acked() {
        let mut state = state();
        state
            .allocator
            .allocate(LOCAL, &hw_client(), Some(ip(10, 0, 0, 5)))
            .unwrap();

        let mut packet = message(
            DhcpMessageTypes::REQUEST,
            9,
            vec![DhcpOption::RequestedIpAddress(ip(10, 0, 0, 5))],
        );
        packet.yiaddr = ip(10, 0, 0, 5);

        let reply = handle_message(&packet, &mut state).unwrap();
        assert_eq!(reply.msg_type, DhcpMessageTypes::ACK);
        assert_eq!(reply.packet.yiaddr, ip(10, 0, 0, 5));
    }

    #[test]
    fn init_reboot_mismatch_naks_the_requested_address() {
        let mut state = state();
        state
            .allocator
            .allocate(LOCAL, &hw_client(), Some(ip(10, 0, 0, 5)))
            .unwrap();

        let mut packet = message(
            DhcpMessageTypes::REQUEST,
            9,
            vec![DhcpOption::RequestedIpAddress(ip(10, 0, 0, 9))],
        );
        packet.yiaddr = ip(10, 0, 0, 9);

        let reply = handle_message(&packet, &mut state).unwrap();
        assert_eq!(reply.msg_type, DhcpMessageTypes::NAK);
        assert_eq!(reply.packet.yiaddr, ip(10, 0, 0, 9));
        assert_eq!(
            state.allocator.get_allocation(LOCAL, &hw_client()).unwrap().ip,
            ip(10, 0, 0, 5)
        );
    }

    #[test]
    fn init_reboot_without_allocation_is_silent() {
        let mut state = state();
        let mut packet = message(
            DhcpMessageTypes::REQUEST,
            9,
            vec![DhcpOption::RequestedIpAddress(ip(10, 0, 0, 9))],
        );
        packet.yiaddr = ip(10, 0, 0, 9);

        assert!(handle_message(&packet, &mut state).is_none());
    }

    #[test]
    fn renewing_extends_the_lease() {
        let mut state = state();
        let held = state.allocator.allocate(LOCAL, &hw_client(), None).unwrap();

        let mut packet = message(DhcpMessageTypes::REQUEST, 11, vec![]);
        packet.ciaddr = held.ip;

        let reply = handle_message(&packet, &mut state).unwrap();
        assert_eq!(reply.msg_type, DhcpMessageTypes::ACK);
        assert_eq!(reply.packet.yiaddr, held.ip);
        assert_eq!(reply.packet.ciaddr, held.ip);
        assert_eq!(reply.delivery, Delivery::Client(held.ip));
    }

    #[test]
    fn renewing_foreign_address_is_naked() {
        let mut state = state();
        state.allocator.allocate(LOCAL, &hw_client(), None).unwrap();

        let mut packet = message(DhcpMessageTypes::REQUEST, 11, vec![]);
        packet.ciaddr = ip(10, 0, 0, 50);

        let reply = handle_message(&packet, &mut state).unwrap();
        assert_eq!(reply.msg_type, DhcpMessageTypes::NAK);
        assert_eq!(reply.packet.yiaddr, ip(10, 0, 0, 50));
    }

    #[test]
    fn rebinding_unknown_client_is_silent() {
        let mut state = state();
        let mut packet = message(DhcpMessageTypes::REQUEST, 11, vec![]);
        packet.ciaddr = ip(10, 0, 0, 50);
        packet.yiaddr = ip(10, 0, 0, 50);

        assert!(handle_message(&packet, &mut state).is_none());
    }

    #[test]
    fn unknown_state_consumes_the_transaction() {
        let mut state = state();
        handle_message(&discover(7), &mut state).unwrap();

        let packet = message(
            DhcpMessageTypes::REQUEST,
            7,
            vec![DhcpOption::DhcpServerId(MY_IP)],
        );

        assert!(handle_message(&packet, &mut state).is_none());
        assert!(!state.transactions.exists(7));
    }

    #[test]
    fn relayed_discover_uses_the_relay_pool() {
        let mut state = state();
        let mut packet = discover(21);
        packet.giaddr = ip(10, 1, 0, 1);

        let reply = handle_message(&packet, &mut state).unwrap();
        assert_eq!(reply.packet.yiaddr, ip(10, 1, 0, 100));
        assert_eq!(reply.packet.giaddr, ip(10, 1, 0, 1));
        assert_eq!(reply.delivery, Delivery::Relay(ip(10, 1, 0, 1)));

        let options = reply.packet.parse_options();
        assert!(!options.exists(DhcpOptions::DOMAIN_SERVER));
        assert_eq!(
            options.decode(DhcpOptions::IP_ADDRESS_LEASE_TIME),
            Some(DhcpOption::IpAddressLeaseTime(600))
        );
    }

    #[test]
    fn unknown_relay_is_dropped() {
        let mut state = state();
        let mut packet = discover(21);
        packet.giaddr = ip(192, 168, 7, 1);

        assert!(handle_message(&packet, &mut state).is_none());
        assert!(!state.transactions.exists(21));
    }

    #[test]
    fn client_identifier_keys_the_allocation() {
        let mut state = state();
        let first = message(
            DhcpMessageTypes::DISCOVER,
            1,
            vec![DhcpOption::ClientIdentifier(ClientIdentifier {
                id_type: 0,
                id: b"host-a".to_vec(),
            })],
        );
        let second = message(
            DhcpMessageTypes::DISCOVER,
            2,
            vec![DhcpOption::ClientIdentifier(ClientIdentifier {
                id_type: 0,
                id: b"host-b".to_vec(),
            })],
        );

        let a = handle_message(&first, &mut state).unwrap();
        let b = handle_message(&second, &mut state).unwrap();

        assert_ne!(a.packet.yiaddr, b.packet.yiaddr);
        assert!(!state.allocator.has_allocation(LOCAL, &hw_client()));
    }

    #[test]
    fn exhausted_pool_is_silent() {
        // .0 network, .1 server, .3 broadcast, only .2 is free
        let mut state =
            ServerState::new(&srv_conf(Ipv4Addr::new(255, 255, 255, 252)));
        state
            .allocator
            .allocate(
                LOCAL,
                &ClientIdentity::Hardware {
                    htype: 1,
                    addr: vec![1],
                },
                None,
            )
            .unwrap();

        assert!(handle_message(&discover(3), &mut state).is_none());
        assert!(!state.transactions.exists(3));
    }

    #[test]
    fn release_frees_the_held_address() {
        let mut state = state();
        let held = state.allocator.allocate(LOCAL, &hw_client(), None).unwrap();

        let mut packet = message(DhcpMessageTypes::RELEASE, 5, vec![]);
        packet.ciaddr = ip(10, 0, 0, 99);
        assert!(handle_message(&packet, &mut state).is_none());
        assert!(state.allocator.has_allocation(LOCAL, &hw_client()));

        packet.ciaddr = held.ip;
        assert!(handle_message(&packet, &mut state).is_none());
        assert!(!state.allocator.has_allocation(LOCAL, &hw_client()));
    }
}
