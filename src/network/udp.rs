//! UDP socket setup for the broadcast link

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Socket bound to the link port for inbound broadcasts.
///
/// Address and port reuse let several nodes share one host.
pub fn create_receive_socket(port: u16, read_timeout: Duration) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_read_timeout(Some(read_timeout))?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;

    Ok(socket.into())
}

/// Non-blocking socket for outbound broadcasts.
///
/// A full send buffer surfaces as `WouldBlock` instead of stalling the
/// caller.
pub fn create_send_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&addr.into())?;

    Ok(socket.into())
}
