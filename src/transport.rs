use log::{debug, warn};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::udp::{self, MutableUdpPacket, UdpPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;
use pnet::{
    datalink::{
        self, Channel, Config, DataLinkReceiver, DataLinkSender,
        NetworkInterface,
    },
    packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket},
};
use rand::Rng;
use std::io;
use std::{net::Ipv4Addr, time::Duration};

use crate::dhcp::{
    DhcpPacket, BOOT_REQUEST, DHCP_CLIENT_PORT, DHCP_SERVER_PORT,
};
use crate::server::{Delivery, Reply};

pub struct TransportChannel {
    tx: Box<dyn DataLinkSender>,
    rx: Box<dyn DataLinkReceiver>,
}

impl TransportChannel {
    /// Without a timeout `recv_dhcp` blocks until a request arrives.
    pub fn new(
        iface: &NetworkInterface,
        timeout: Option<Duration>,
    ) -> Result<Self, String> {
        let mut config = Config::default();
        config.read_timeout = timeout;
        let (tx, rx) = new_ether_channel(iface, config)?;

        return Ok(Self { tx, rx });
    }

    pub fn build_and_send(
        &mut self,
        src_mac: MacAddr,
        src_ip: Ipv4Addr,
        src_port: u16,
        dst_mac: MacAddr,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        payload: &[u8],
    ) -> Option<Result<(), std::io::Error>> {
        let ether_packet = new_udp_stack(
            src_mac, src_ip, src_port, dst_mac, dst_ip, dst_port, payload,
        );
        return self.send(ether_packet.packet());
    }

    pub fn send(
        &mut self,
        packet: &[u8],
    ) -> Option<Result<(), std::io::Error>> {
        return self.tx.send_to(packet, None);
    }

    /// Sends the reply where its delivery says. `ether_mac` is the source
    /// of the frame that carried the request.
    pub fn send_reply(
        &mut self,
        src_mac: MacAddr,
        src_ip: Ipv4Addr,
        ether_mac: MacAddr,
        reply: &Reply,
    ) -> Result<(), String> {
        let (dst_mac, dst_ip, dst_port) = destination(reply, ether_mac);
        debug!("Sending reply to {} ({}) port {}", dst_ip, dst_mac, dst_port);

        return self
            .build_and_send(
                src_mac,
                src_ip,
                DHCP_SERVER_PORT,
                dst_mac,
                dst_ip,
                dst_port,
                &reply.packet.build(),
            )
            .ok_or("Error sending packet")?
            .map_err(|e| format!("Error sending packet: {}", e));
    }

    /// Next BOOTREQUEST addressed to `port`, with the source MAC of its
    /// frame. `None` when the read timeout expires first.
    pub fn recv_dhcp(
        &mut self,
        port: u16,
    ) -> Result<Option<(MacAddr, DhcpPacket)>, String> {
        return recv_next_dhcp_packet(&mut self.rx, port);
    }
}

/// Link and network destination of a reply, RFC 2131 section 4.1.
pub fn destination(
    reply: &Reply,
    ether_mac: MacAddr,
) -> (MacAddr, Ipv4Addr, u16) {
    match reply.delivery {
        Delivery::Relay(giaddr) => (ether_mac, giaddr, DHCP_SERVER_PORT),
        Delivery::Client(ciaddr) => (ether_mac, ciaddr, DHCP_CLIENT_PORT),
        Delivery::Broadcast => {
            (MacAddr::broadcast(), Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT)
        }
        Delivery::Hardware(yiaddr) => {
            let mac = reply.packet.client_mac().unwrap_or(ether_mac);
            (mac, yiaddr, DHCP_CLIENT_PORT)
        }
    }
}

pub fn new_ether_channel(
    iface: &NetworkInterface,
    config: Config,
) -> Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>), String> {
    let (sender, receiver) = match datalink::channel(iface, config) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => {
            return Err(format!("Error creating channel: Unknown channel type"))
        }
        Err(e) => return Err(format!("Error creating channel: {}", e)),
    };

    return Ok((sender, receiver));
}

pub fn new_udp_stack<'a>(
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    src_port: u16,
    dst_mac: MacAddr,
    dst_ip: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> EthernetPacket<'a> {
    let udp_packet =
        new_udp_packet(src_ip, dst_ip, src_port, dst_port, payload);
    let ipv4_packet = new_ip_udp_packet(src_ip, dst_ip, udp_packet.packet());
    let ether_packet = new_ether_ipv4(src_mac, dst_mac, &ipv4_packet);

    return ether_packet;
}

pub fn new_ether_ipv4<'a>(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    ipv4_packet: &Ipv4Packet<'a>,
) -> EthernetPacket<'a> {
    let payload = ipv4_packet.packet();
    let buf = vec![0u8; EthernetPacket::minimum_packet_size() + payload.len()];
    let mut ethernet_packet = MutableEthernetPacket::owned(buf).unwrap();

    ethernet_packet.set_destination(dst_mac);
    ethernet_packet.set_source(src_mac);
    ethernet_packet.set_ethertype(EtherTypes::Ipv4);
    ethernet_packet.set_payload(payload);

    return ethernet_packet.consume_to_immutable();
}

pub const IPV4_HEADER_LENGTH: u8 = 20;

pub fn new_ip_udp_packet<'a>(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    payload: &[u8],
) -> Ipv4Packet<'a> {
    let buf = vec![0; IPV4_HEADER_LENGTH as usize + payload.len()];

    let mut ip_packet = MutableIpv4Packet::owned(buf).unwrap();
    ip_packet.set_version(4);
    ip_packet.set_header_length(IPV4_HEADER_LENGTH / 4);
    ip_packet.set_dscp(0);
    ip_packet.set_ecn(0);
    ip_packet
        .set_total_length(IPV4_HEADER_LENGTH as u16 + payload.len() as u16);
    ip_packet.set_identification(rand::thread_rng().gen());
    ip_packet.set_flags(0);
    ip_packet.set_fragment_offset(0);
    ip_packet.set_ttl(64);
    ip_packet.set_next_level_protocol(IpNextHeaderProtocols::Udp);
    ip_packet.set_source(src_ip);
    ip_packet.set_destination(dst_ip);
    ip_packet.set_options(&Vec::new());
    ip_packet.set_payload(payload);

    ip_packet.set_checksum(ipv4::checksum(&ip_packet.to_immutable()));

    return ip_packet.consume_to_immutable();
}

pub fn new_udp_packet<'a>(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> UdpPacket<'a> {
    let buf = vec![0; 8 + payload.len()];
    let mut udp_packet = MutableUdpPacket::owned(buf).unwrap();

    udp_packet.set_source(src_port);
    udp_packet.set_destination(dst_port);
    udp_packet.set_length((8 + payload.len()) as u16);
    udp_packet.set_payload(payload);

    udp_packet.set_checksum(udp::ipv4_checksum(
        &udp_packet.to_immutable(),
        &src_ip,
        &dst_ip,
    ));
    return udp_packet.consume_to_immutable();
}

pub fn recv_next_dhcp_packet(
    receiver: &mut Box<dyn DataLinkReceiver>,
    port: u16,
) -> Result<Option<(MacAddr, DhcpPacket)>, String> {
    loop {
        let buf = match receiver.next() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            // a signal, Ctrl-C among them, woke up the read
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(format!("Error receiving packets: {}", e)),
        };

        match extract_dhcp(buf, port) {
            Some(found) => return Ok(Some(found)),
            None => continue,
        }
    }
}

/// The DHCP request inside an Ethernet frame, if the frame carries one to
/// the UDP `port`.
fn extract_dhcp(frame: &[u8], port: u16) -> Option<(MacAddr, DhcpPacket)> {
    let ether_packet = EthernetPacket::new(frame)?;
    if ether_packet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let client_mac = ether_packet.get_source();

    let ip_packet = Ipv4Packet::new(ether_packet.payload())?;
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }

    let udp_packet = UdpPacket::new(ip_packet.payload())?;
    if udp_packet.get_destination() != port {
        return None;
    }

    match DhcpPacket::parse(udp_packet.payload()) {
        Ok((_, dhcp_packet)) => {
            if dhcp_packet.op != BOOT_REQUEST {
                return None;
            }
            return Some((client_mac, dhcp_packet));
        }
        Err(e) => {
            warn!("Error parsing DHCP: {}", e);
            return None;
        }
    }
}
