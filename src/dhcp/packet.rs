use super::err::{Error, IResult};
use super::helpers::{hex_join, parse_ipv4};
use super::options::{serialize, DhcpOption, Options};
use nom::bytes::complete::{tag, take};
use nom::combinator::rest;
use nom::number::complete::{be_u16, be_u32, be_u8};
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

pub const BROADCAST_FLAG: u16 = 0x8000;

pub const DHCP_COOKIE: [u8; 4] = [99, 130, 83, 99];

/// Fixed BOOTP header, without the magic cookie.
pub const DHCP_HEADER_SIZE: usize = 236;

pub const CHADDR_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct DhcpPacket {
    /// Message op code.
    pub op: u8,

    /// Hardware address type, see ARP section in "Assigned Numbers" RFC.
    pub htype: u8,

    /// Hardware address length.
    pub hlen: u8,

    /// Client sets to zero, optionally used by relay agents
    /// when booting via a relay agent.
    pub hops: u8,

    /// Transaction ID, a random number chosen by the
    /// client, used by the client and server to associate
    /// messages and responses between a client and a
    /// server.
    pub xid: u32,

    /// Filled in by client, seconds elapsed since client
    /// began address acquisition or renewal process.
    pub secs: u16,

    /// Used to indicate if message is unicast or broadcast
    pub flags: u16,

    /// Client IP address; only filled in if client is in
    /// BOUND, RENEW or REBINDING state and can respond
    /// to ARP requests.
    pub ciaddr: Ipv4Addr,

    /// 'your' (client) IP address.
    pub yiaddr: Ipv4Addr,

    /// IP address of next server to use in bootstrap;
    /// returned in DHCPOFFER, DHCPACK by server.
    pub siaddr: Ipv4Addr,

    /// Relay agent IP address, used in booting via a
    /// relay agent.
    pub giaddr: Ipv4Addr,

    /// Client hardware address, only the first `hlen` bytes are meaningful.
    pub chaddr: [u8; CHADDR_SIZE],

    /// Options area that follows the magic cookie, as it was captured for
    /// inbound messages or already serialized for replies.
    pub options: Vec<u8>,
}

pub const BOOT_REQUEST: u8 = 1; // From Client;
pub const BOOT_REPLY: u8 = 2; // From Server;

pub const ETHERNET_TYPE: u8 = 1;

pub const ETHERNET_ADDRESS_LEN: u8 = 6;

pub const DHCP_PACKET_MIN_SIZE: usize = 300;

impl DhcpPacket {
    /// Starts the reply to `request`, copying the fields that identify the
    /// client and the path the request came through.
    pub fn new_reply(request: &DhcpPacket) -> Self {
        let mut p = Self::default();
        p.op = BOOT_REPLY;
        p.htype = request.htype;
        p.hlen = request.hlen;
        p.xid = request.xid;
        p.flags = request.flags;
        p.giaddr = request.giaddr;
        p.chaddr = request.chaddr;
        return p;
    }

    pub fn new_request() -> Self {
        let mut p = Self::default();
        p.op = BOOT_REQUEST;
        return p;
    }

    pub fn is_broadcast(&self) -> bool {
        return self.flags & BROADCAST_FLAG != 0;
    }

    /// The meaningful part of `chaddr`.
    pub fn client_hw_addr(&self) -> &[u8] {
        let len = (self.hlen as usize).min(CHADDR_SIZE);
        return &self.chaddr[..len];
    }

    /// Client MAC, only for Ethernet clients.
    pub fn client_mac(&self) -> Option<MacAddr> {
        if self.htype != ETHERNET_TYPE || self.hlen != ETHERNET_ADDRESS_LEN {
            return None;
        }
        let c = &self.chaddr;
        return Some(MacAddr::new(c[0], c[1], c[2], c[3], c[4], c[5]));
    }

    pub fn client_hw_str(&self) -> String {
        return hex_join(self.client_hw_addr());
    }

    pub fn parse_options(&self) -> Options {
        return Options::parse(&self.options, self.options.len());
    }

    pub fn set_options(&mut self, options: &[DhcpOption]) {
        self.options = serialize(options);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut raw = Vec::new();

        raw.push(self.op);
        raw.push(self.htype);
        raw.push(self.hlen);
        raw.push(self.hops);
        raw.extend(&self.xid.to_be_bytes());
        raw.extend(&self.secs.to_be_bytes());
        raw.extend(&self.flags.to_be_bytes());
        raw.extend(&self.ciaddr.octets());
        raw.extend(&self.yiaddr.octets());
        raw.extend(&self.siaddr.octets());
        raw.extend(&self.giaddr.octets());
        raw.extend(&self.chaddr);
        raw.extend(&[0; 64]);
        raw.extend(&[0; 128]);

        raw.extend(&DHCP_COOKIE);
        raw.extend(&self.options);

        while raw.len() < DHCP_PACKET_MIN_SIZE {
            raw.push(0);
        }

        return raw;
    }

    /// Parses the fixed header. Everything after the magic cookie is kept
    /// unparsed as the options area.
    pub fn parse(raw: &[u8]) -> IResult<&[u8], Self> {
        let (raw, op) = be_u8(raw)?;
        let (raw, htype) = be_u8(raw)?;
        let (raw, hlen) = be_u8(raw)?;
        if hlen as usize > CHADDR_SIZE {
            return Err(nom::Err::Error(Error::InvalidHardwareLength(hlen)));
        }
        let (raw, hops) = be_u8(raw)?;
        let (raw, xid) = be_u32(raw)?;
        let (raw, secs) = be_u16(raw)?;
        let (raw, flags) = be_u16(raw)?;
        let (raw, ciaddr) = parse_ipv4(raw)?;
        let (raw, yiaddr) = parse_ipv4(raw)?;
        let (raw, siaddr) = parse_ipv4(raw)?;
        let (raw, giaddr) = parse_ipv4(raw)?;
        let (raw, chaddr_raw) = take(CHADDR_SIZE)(raw)?;

        // Optional server host name, null terminated string.
        let (raw, _sname) = take(64u8)(raw)?;

        // Boot file name, null terminated string; "generic"
        // name or null in DHCPDISCOVER, fully qualified
        // directory-path name in DHCPOFFER.
        let (raw, _file) = take(128u8)(raw)?;

        let (raw, _) = tag(DHCP_COOKIE)(raw)?;

        let (raw, options) = rest(raw)?;

        let mut chaddr = [0; CHADDR_SIZE];
        chaddr.copy_from_slice(chaddr_raw);

        return Ok((
            raw,
            Self {
                op,
                htype,
                hlen,
                hops,
                xid,
                secs,
                flags,
                ciaddr,
                yiaddr,
                siaddr,
                giaddr,
                chaddr,
                options: options.to_vec(),
            },
        ));
    }
}

impl Default for DhcpPacket {
    fn default() -> Self {
        return DhcpPacket {
            op: BOOT_REPLY,
            htype: ETHERNET_TYPE,
            hlen: ETHERNET_ADDRESS_LEN,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::from(0),
            yiaddr: Ipv4Addr::from(0),
            siaddr: Ipv4Addr::from(0),
            giaddr: Ipv4Addr::from(0),
            chaddr: [0; CHADDR_SIZE],
            options: Vec::new(),
        };
    }
}
