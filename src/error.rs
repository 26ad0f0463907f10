use std::{io, net::SocketAddr};

use thiserror::Error;

/// Failures while acquiring a shared listening socket. None of these are
/// retried: the process cannot serve without its listener.
#[derive(Error, Debug)]
pub enum ListenError {
    #[error("Failed to create socket for {addr}: {source}")]
    Socket { addr: SocketAddr, source: io::Error },

    #[error("Failed to enable SO_REUSEPORT for {addr}: {source}")]
    Option { addr: SocketAddr, source: io::Error },

    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("Failed to listen on {addr}: {source}")]
    Listen { addr: SocketAddr, source: io::Error },

    #[error("Failed to read the bound address for {addr}: {source}")]
    Address { addr: SocketAddr, source: io::Error },
}

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Failed to register listener {addr} with the runtime: {source}")]
    Register { addr: SocketAddr, source: io::Error },

    #[error("Failed to accept on {addr}: {source}")]
    Accept { addr: SocketAddr, source: io::Error },

    #[error("Listener task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
