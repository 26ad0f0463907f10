use std::net::SocketAddr;

use clap::Parser;

/// HTTP server sharing its port with other processes through SO_REUSEPORT.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Address to bind. Every co-operating process must use the same one.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,

    /// Number of listeners this process opens on the address; 0 opens one
    /// per physical core.
    #[arg(long, default_value_t = 1)]
    pub listeners: usize,
}

impl Args {
    pub fn listener_count(&self) -> usize {
        match self.listeners {
            0 => num_cpus::get_physical().max(1),
            n => n,
        }
    }
}
