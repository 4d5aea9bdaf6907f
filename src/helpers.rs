use pnet::{
    datalink::NetworkInterface,
    ipnetwork::{IpNetwork, Ipv4Network},
};

/// First IPv4 network configured in the interface.
pub fn get_iface_ipv4_network(
    iface: &NetworkInterface,
) -> Option<&Ipv4Network> {
    iface.ips.iter().find_map(|ip| match ip {
        IpNetwork::V4(net) => Some(net),
        _ => None,
    })
}
