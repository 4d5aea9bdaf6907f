use super::err::{Error, IResult};
use super::helpers::{hex_join, parse_ipv4_list, parse_single_ipv4};
use nom::bytes::complete::take;
use nom::combinator::all_consuming;
use nom::error::{ErrorKind, ParseError};
use nom::number::complete::{be_u32, be_u8};
use std::collections::BTreeMap;
use std::{fmt::Display, net::Ipv4Addr};

/// An address list option can not carry more than this, its length being a
/// single byte.
pub const MAX_OPTION_ADDRESSES: usize = 63;

#[derive(PartialEq, Debug, Clone)]
pub enum DhcpOption {
    SubnetMask(Ipv4Addr),
    Router(Vec<Ipv4Addr>),
    DomainServer(Vec<Ipv4Addr>),
    RequestedIpAddress(Ipv4Addr),
    IpAddressLeaseTime(u32),
    DhcpMsgType(u8),
    DhcpServerId(Ipv4Addr),
    ClientIdentifier(ClientIdentifier),
    Unrecognized(RawDhcpOption),
}

impl DhcpOption {
    /// Interprets the value of a raw option according to its code.
    pub fn decode(
        raw: &RawDhcpOption,
    ) -> Result<DhcpOption, nom::Err<Error<&[u8]>>> {
        let data = raw.data.as_slice();
        let option = match raw.code {
            DhcpOptions::SUBNET_MASK => {
                DhcpOption::SubnetMask(parse_single_ipv4(data)?.1)
            }
            DhcpOptions::ROUTER => DhcpOption::Router(parse_ipv4_list(data)?.1),
            DhcpOptions::DOMAIN_SERVER => {
                DhcpOption::DomainServer(parse_ipv4_list(data)?.1)
            }
            DhcpOptions::REQUESTED_IP_ADDRESS => {
                DhcpOption::RequestedIpAddress(parse_single_ipv4(data)?.1)
            }
            DhcpOptions::IP_ADDRESS_LEASE_TIME => {
                DhcpOption::IpAddressLeaseTime(all_consuming(be_u32)(data)?.1)
            }
            DhcpOptions::DHCP_MSG_TYPE => {
                DhcpOption::DhcpMsgType(all_consuming(be_u8)(data)?.1)
            }
            DhcpOptions::DHCP_SERVER_ID => {
                DhcpOption::DhcpServerId(parse_single_ipv4(data)?.1)
            }
            DhcpOptions::CLIENT_IDENTIFIER => {
                DhcpOption::ClientIdentifier(ClientIdentifier::parse(data)?.1)
            }
            _ => DhcpOption::Unrecognized(raw.clone()),
        };
        Ok(option)
    }

    pub fn to_raw(&self) -> RawDhcpOption {
        match self {
            Self::SubnetMask(mask) => RawDhcpOption {
                code: DhcpOptions::SUBNET_MASK,
                data: mask.octets().to_vec(),
            },
            Self::Router(addrs) => {
                RawDhcpOption::from_addrs(DhcpOptions::ROUTER, addrs)
            }
            Self::DomainServer(addrs) => {
                RawDhcpOption::from_addrs(DhcpOptions::DOMAIN_SERVER, addrs)
            }
            Self::RequestedIpAddress(addr) => RawDhcpOption {
                code: DhcpOptions::REQUESTED_IP_ADDRESS,
                data: addr.octets().to_vec(),
            },
            Self::IpAddressLeaseTime(secs) => RawDhcpOption {
                code: DhcpOptions::IP_ADDRESS_LEASE_TIME,
                data: secs.to_be_bytes().to_vec(),
            },
            Self::DhcpMsgType(mtype) => RawDhcpOption {
                code: DhcpOptions::DHCP_MSG_TYPE,
                data: vec![*mtype],
            },
            Self::DhcpServerId(addr) => RawDhcpOption {
                code: DhcpOptions::DHCP_SERVER_ID,
                data: addr.octets().to_vec(),
            },
            Self::ClientIdentifier(ci) => RawDhcpOption {
                code: DhcpOptions::CLIENT_IDENTIFIER,
                data: ci.build(),
            },
            Self::Unrecognized(raw) => raw.clone(),
        }
    }

    pub fn value_str(&self) -> String {
        match self {
            Self::SubnetMask(mask) => format!("{}", mask),
            Self::Router(addrs) => join(addrs, ","),
            Self::DomainServer(addrs) => join(addrs, ","),
            Self::RequestedIpAddress(addr) => format!("{}", addr),
            Self::IpAddressLeaseTime(secs) => format!("{}", secs),
            Self::DhcpMsgType(mtype) => format!(
                "{} {}",
                mtype,
                DhcpMessageTypes::name(*mtype).unwrap_or("Unknown")
            ),
            Self::DhcpServerId(addr) => format!("{}", addr),
            Self::ClientIdentifier(ci) => format!("{}", ci),
            Self::Unrecognized(raw) => format!("{:?}", raw.data),
        }
    }

    pub fn code(&self) -> u8 {
        return self.to_raw().code;
    }

    pub fn name(&self) -> Option<&'static str> {
        return DhcpOptions::name(self.code());
    }

    /// Address lists without entries are left out of a reply instead of
    /// being sent with a zero length.
    pub fn is_empty_list(&self) -> bool {
        matches!(
            self,
            Self::Router(addrs) | Self::DomainServer(addrs) if addrs.is_empty()
        )
    }

    pub fn build(&self) -> Vec<u8> {
        return self.to_raw().build();
    }
}

pub fn join<I: Display>(v: &[I], separator: &str) -> String {
    v.iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join(separator)
}

/// Encodes the options in the given order and terminates them with END.
pub fn serialize(options: &[DhcpOption]) -> Vec<u8> {
    let mut raw = Vec::new();
    for opt in options {
        if opt.is_empty_list() {
            continue;
        }
        raw.extend(&opt.build());
    }
    raw.push(DhcpOptions::END);

    return raw;
}

#[derive(PartialEq, Clone, Debug)]
pub struct RawDhcpOption {
    pub code: u8,
    pub data: Vec<u8>,
}

impl RawDhcpOption {
    pub fn from_addrs(code: u8, addrs: &[Ipv4Addr]) -> Self {
        let mut data = Vec::new();
        for a in addrs.iter().take(MAX_OPTION_ADDRESSES) {
            data.extend(a.octets().iter());
        }

        return Self { code, data };
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, code) = be_u8(input)?;
        let (input, len) = be_u8(input)?;
        let (input, data) = take(len)(input)?;

        return Ok((
            input,
            Self {
                code,
                data: data.to_vec(),
            },
        ));
    }

    pub fn build(&self) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.push(self.code);
        raw.push(self.data.len() as u8);
        raw.extend(&self.data);

        return raw;
    }
}

/// Client Identifier option, defined in
/// https://datatracker.ietf.org/doc/html/rfc2132#section-9.14
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
pub struct ClientIdentifier {
    pub id_type: u8,
    pub id: Vec<u8>,
}

impl ClientIdentifier {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, id_type) = be_u8(input)?;
        if input.is_empty() {
            return Err(nom::Err::Error(Error::from_error_kind(
                input,
                ErrorKind::Eof,
            )));
        }

        return Ok((
            &input[input.len()..],
            Self {
                id_type,
                id: input.to_vec(),
            },
        ));
    }

    pub fn build(&self) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.push(self.id_type);
        raw.extend(&self.id);

        return raw;
    }
}

impl Display for ClientIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.id_type, hex_join(&self.id))
    }
}

macro_rules! get_option {
    ($fn:ident, $code:ident, $option:tt, $type:ty) => {
        pub fn $fn(&self) -> Option<$type> {
            match self.decode(DhcpOptions::$code)? {
                DhcpOption::$option(t) => Some(t),
                _ => None,
            }
        }
    };
}

/// Options of a single inbound message, keyed by code.
///
/// An option that was sent with an empty or malformed value still `exists`,
/// but its typed accessor returns `None`.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct Options {
    options: BTreeMap<u8, RawDhcpOption>,
}

impl Options {
    /// Scans tag-length-value entries until END or PAD is found, the buffer
    /// runs out or `max_len` bytes are consumed. A truncated option stops the
    /// scan and the options parsed so far are kept. A repeated code replaces
    /// the earlier value.
    pub fn parse(raw: &[u8], max_len: usize) -> Self {
        let mut input = &raw[..max_len.min(raw.len())];
        let mut options = BTreeMap::new();

        loop {
            match input.first() {
                None | Some(&DhcpOptions::END) | Some(&DhcpOptions::PAD) => {
                    break
                }
                _ => {}
            }

            match RawDhcpOption::parse(input) {
                Ok((rest, opt)) => {
                    options.insert(opt.code, opt);
                    input = rest;
                }
                Err(_) => break,
            }
        }

        return Self { options };
    }

    pub fn get(&self, code: u8) -> Option<&RawDhcpOption> {
        return self.options.get(&code);
    }

    pub fn exists(&self, code: u8) -> bool {
        return self.options.contains_key(&code);
    }

    pub fn len(&self) -> usize {
        return self.options.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.options.is_empty();
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawDhcpOption> {
        self.options.values()
    }

    /// Typed value of the option, `None` if absent or malformed.
    pub fn decode(&self, code: u8) -> Option<DhcpOption> {
        let raw = self.get(code)?;
        return DhcpOption::decode(raw).ok();
    }

    get_option!(dhcp_msg_type, DHCP_MSG_TYPE, DhcpMsgType, u8);
    get_option!(dhcp_server_id, DHCP_SERVER_ID, DhcpServerId, Ipv4Addr);
    get_option!(
        requested_ip_address,
        REQUESTED_IP_ADDRESS,
        RequestedIpAddress,
        Ipv4Addr
    );
    get_option!(
        client_identifier,
        CLIENT_IDENTIFIER,
        ClientIdentifier,
        ClientIdentifier
    );
}

#[allow(non_snake_case)]
pub mod DhcpOptions {
    pub const PAD: u8 = 0;

    pub const SUBNET_MASK: u8 = 1;

    pub const ROUTER: u8 = 3;

    pub const DOMAIN_SERVER: u8 = 6;

    pub const REQUESTED_IP_ADDRESS: u8 = 50;
    pub const IP_ADDRESS_LEASE_TIME: u8 = 51;

    pub const DHCP_MSG_TYPE: u8 = 53;
    pub const DHCP_SERVER_ID: u8 = 54;

    pub const CLIENT_IDENTIFIER: u8 = 61;

    pub const END: u8 = 255;

    pub fn name(code: u8) -> Option<&'static str> {
        match code {
            PAD => Some("Pad"),
            SUBNET_MASK => Some("Subnet Mask"),
            ROUTER => Some("Router"),
            DOMAIN_SERVER => Some("Domain Server"),
            REQUESTED_IP_ADDRESS => Some("Requested IP Address"),
            IP_ADDRESS_LEASE_TIME => Some("IP Address Lease Time"),
            DHCP_MSG_TYPE => Some("DHCP Message Type"),
            DHCP_SERVER_ID => Some("DHCP Server ID"),
            CLIENT_IDENTIFIER => Some("Client Identifier"),
            END => Some("End"),
            _ => None,
        }
    }
}

#[allow(non_snake_case)]
pub mod DhcpMessageTypes {
    /// Client broadcast to locate available servers.
    pub const DISCOVER: u8 = 1;

    /// Server to client in response to DHCPDISCOVER with offer of
    /// configuration parameters.
    pub const OFFER: u8 = 2;

    /// Client message to servers either (a) requesting offered parameters
    /// from one server and implicitly declining offers from all others,
    /// (b) confirming correctness of previously allocated address after,
    /// e.g., system reboot, or (c) extending the lease on a particular
    /// network address.
    pub const REQUEST: u8 = 3;

    /// Client to server indicating network address is already in use.
    pub const DECLINE: u8 = 4;

    /// Server to client with configuration parameters, including committed
    /// network address.
    pub const ACK: u8 = 5;

    /// Server to client indicating client's notion of network address is
    /// incorrect (e.g., client has moved to new subnet) or client's lease
    /// as expired.
    pub const NAK: u8 = 6;

    /// Client to server relinquishing network address and cancelling
    /// remaining lease.
    pub const RELEASE: u8 = 7;

    /// Client to server, asking only for local configuration parameters;
    /// client already has externally configured network address.
    pub const INFORM: u8 = 8;

    pub fn name(msg_type: u8) -> Option<&'static str> {
        match msg_type {
            DISCOVER => Some("Discover"),
            OFFER => Some("Offer"),
            REQUEST => Some("Request"),
            DECLINE => Some("Decline"),
            ACK => Some("Ack"),
            NAK => Some("Nak"),
            RELEASE => Some("Release"),
            INFORM => Some("Inform"),
            _ => None,
        }
    }
}
