// Network helper functions for address discovery and resolution.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use if_addrs::get_if_addrs;

use relay_core::address::ChannelAddress;

/// Local address of the route toward `target`. No packets are sent.
pub fn resolve_local_ip_for_target(target: SocketAddr) -> std::io::Result<IpAddr> {
    let socket = std::net::UdpSocket::bind(("0.0.0.0", 0))?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

pub fn resolve_default_route_ip() -> std::io::Result<IpAddr> {
    let socket = std::net::UdpSocket::bind(("0.0.0.0", 0))?;
    socket.connect(("10.254.254.254", 1))?;
    Ok(socket.local_addr()?.ip())
}

pub fn preferred_private_ipv4() -> Option<IpAddr> {
    let ifaces = get_if_addrs().ok()?;
    for iface in ifaces {
        if let if_addrs::IfAddr::V4(v4) = iface.addr {
            let ip = v4.ip;
            if is_private_ipv4(ip) && !ip.is_loopback() && !ip.is_link_local() {
                return Some(IpAddr::V4(ip));
            }
        }
    }
    None
}

pub fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    match octets {
        [10, ..] => true,
        [172, second, ..] if (16..=31).contains(&second) => true,
        [192, 168, ..] => true,
        _ => false,
    }
}

/// Address the simulator should use to reach this agent.
pub async fn agent_ip_for(simulator_host: &str, api_port: u16) -> IpAddr {
    if let Ok(Some(target)) = resolve_first(simulator_host, api_port).await {
        if let Ok(ip) = resolve_local_ip_for_target(target) {
            if !ip.is_unspecified() {
                return ip;
            }
        }
    }
    preferred_private_ipv4()
        .or_else(|| resolve_default_route_ip().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn resolve_channel(address: &ChannelAddress) -> std::io::Result<Option<SocketAddr>> {
    resolve_first(&address.host, address.port).await
}

async fn resolve_first(host: &str, port: u16) -> std::io::Result<Option<SocketAddr>> {
    let mut addrs = tokio::net::lookup_host((host, port)).await?;
    Ok(addrs.next())
}
