// Adapted from https://github.com/krolaw/dhcp4r

mod err;
mod helpers;
mod options;
mod packet;

pub use err::IResult;
pub use helpers::{hex_join, parse_ipv4};
pub use options::{
    ClientIdentifier, DhcpMessageTypes, DhcpOption, DhcpOptions, Options,
    MAX_OPTION_ADDRESSES,
};
pub use packet::{DhcpPacket, BOOT_REQUEST, BROADCAST_FLAG};

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
