use std::{fmt::Debug, io, net::SocketAddr, time::Duration};

mod tcp;

pub use tcp::TcpConnect;

/// A single connection attempt bounded by `timeout`.
pub trait Connect: Debug + Sync {
    fn connect(&self, addr: &SocketAddr, timeout: Duration) -> io::Result<()>;
}
