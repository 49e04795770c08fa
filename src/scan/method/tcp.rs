use std::{
    io,
    net::{SocketAddr, TcpStream},
    time::Duration,
};

use super::Connect;

/// Full TCP handshake; the stream is closed right after it's established.
#[derive(Debug, Default)]
pub struct TcpConnect;

impl Connect for TcpConnect {
    fn connect(&self, addr: &SocketAddr, timeout: Duration) -> io::Result<()> {
        TcpStream::connect_timeout(addr, timeout).map(drop)
    }
}
