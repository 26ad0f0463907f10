use std::{io, net::SocketAddr, os::fd::AsRawFd as _};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::ListenError;

const LISTEN_BACKLOG: i32 = 1024;

/// A bound, listening TCP socket with `SO_REUSEPORT` enabled.
///
/// Every socket bound this way to the same address joins one kernel group;
/// new connections are spread across the group by the kernel. The kernel only
/// admits sockets that all set the option and were created by the same
/// effective user.
#[derive(Debug)]
pub struct SharedListener {
    socket: Socket,
    local_addr: SocketAddr,
}

impl SharedListener {
    pub fn bind(addr: SocketAddr) -> Result<Self, ListenError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| ListenError::Socket { addr, source })?;

        // Must happen before bind, the kernel ignores it afterwards.
        enable_reuse_port(&socket).map_err(|source| ListenError::Option { addr, source })?;

        socket
            .bind(&addr.into())
            .map_err(|source| ListenError::Bind { addr, source })?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| ListenError::Listen { addr, source })?;

        let local_addr = socket
            .local_addr()
            .and_then(|bound| {
                bound.as_socket().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "not an inet address")
                })
            })
            .map_err(|source| ListenError::Address { addr, source })?;

        let listener = Self { socket, local_addr };
        tracing::debug!(
            listener = %local_addr,
            fd = listener.socket.as_raw_fd(),
            reuse_port = ?listener.reuse_port(),
            "Bound shared listener"
        );
        Ok(listener)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Reads `SO_REUSEPORT` back from the kernel.
    pub fn reuse_port(&self) -> io::Result<bool> {
        reuse_port_enabled(&self.socket)
    }

    /// Moves the socket onto the tokio reactor. Must be called from within a
    /// runtime.
    pub fn into_tokio(self) -> io::Result<tokio::net::TcpListener> {
        self.socket.set_nonblocking(true)?;
        let listener: std::net::TcpListener = self.socket.into();
        tokio::net::TcpListener::from_std(listener)
    }
}

#[cfg(not(any(target_os = "solaris", target_os = "illumos")))]
fn enable_reuse_port(socket: &Socket) -> io::Result<()> {
    socket.set_reuse_port(true)
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
fn enable_reuse_port(_socket: &Socket) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_REUSEPORT is not available on this platform",
    ))
}

#[cfg(not(any(target_os = "solaris", target_os = "illumos")))]
fn reuse_port_enabled(socket: &Socket) -> io::Result<bool> {
    socket.reuse_port()
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
fn reuse_port_enabled(_socket: &Socket) -> io::Result<bool> {
    Ok(false)
}
