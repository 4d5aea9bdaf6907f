use super::err::IResult;
use nom::combinator::all_consuming;
use nom::multi::many0;
use nom::number::complete::be_u32;
use std::net::Ipv4Addr;

pub fn parse_ipv4(raw: &[u8]) -> IResult<&[u8], Ipv4Addr> {
    be_u32(raw).map(|(r, i)| (r, Ipv4Addr::from(i)))
}

/// Parses a value made only of addresses. Trailing bytes that do not form a
/// whole address make the value invalid.
pub fn parse_ipv4_list(raw: &[u8]) -> IResult<&[u8], Vec<Ipv4Addr>> {
    all_consuming(many0(parse_ipv4))(raw)
}

/// Parses an option value that must be exactly one address.
pub fn parse_single_ipv4(raw: &[u8]) -> IResult<&[u8], Ipv4Addr> {
    all_consuming(parse_ipv4)(raw)
}

pub fn hex_join(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<String>>()
        .join(":")
}
