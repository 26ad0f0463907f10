use std::{io, net::SocketAddr, time::Duration};

use nix::errno::Errno;

use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::{net::TcpListener, task::JoinSet};

use crate::{
    cli::Args,
    error::{ListenError, ServeError},
    listener::SharedListener,
    responder::{self, ProcessId},
};

pub fn main(args: Args) -> anyhow::Result<()> {
    let pid = ProcessId::current();
    let count = args.listener_count();

    tracing::info!(
        message = "Starting.",
        pid = %pid,
        euid = %nix::unistd::geteuid(),
        listeners = count,
        addr = %args.addr
    );

    // All binds happen before the runtime starts; any failure aborts startup.
    let listeners = bind_all(args.addr, count)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(listeners, pid))?;
    Ok(())
}

/// Binds `count` co-operating listeners. With port 0 the later ones join the
/// port the kernel picked for the first.
pub fn bind_all(addr: SocketAddr, count: usize) -> Result<Vec<SharedListener>, ListenError> {
    let first = SharedListener::bind(addr)?;
    let addr = first.local_addr();
    let mut listeners = vec![first];
    for _ in 1..count {
        listeners.push(SharedListener::bind(addr)?);
    }
    Ok(listeners)
}

/// Serves every listener until one of them fails.
pub async fn run(listeners: Vec<SharedListener>, pid: ProcessId) -> Result<(), ServeError> {
    let mut tasks = JoinSet::new();
    for listener in listeners {
        let addr = listener.local_addr();
        let listener = listener
            .into_tokio()
            .map_err(|source| ServeError::Register { addr, source })?;
        tasks.spawn(serve(listener, addr, pid));
    }

    println!("HTTP Server with PID: {pid} is running");

    while let Some(finished) = tasks.join_next().await {
        finished??;
    }
    Ok(())
}

const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

pub async fn serve(
    listener: TcpListener,
    addr: SocketAddr,
    pid: ProcessId,
) -> Result<(), ServeError> {
    let server = http1::Builder::new();
    let service = service_fn(move |request| responder::respond(pid, request));

    let mut backoff = ACCEPT_BACKOFF_START;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) if is_dropped_connection(&err) => {
                tracing::debug!(listener = %addr, error = %err, "Dropped connection before accept");
                continue;
            }
            Err(err) if is_resource_exhaustion(&err) => {
                tracing::warn!(
                    listener = %addr,
                    error = %err,
                    retry_in = ?backoff,
                    "Accept failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                continue;
            }
            Err(source) => {
                tracing::error!(listener = %addr, error = %source, "Accept failed");
                return Err(ServeError::Accept { addr, source });
            }
        };
        backoff = ACCEPT_BACKOFF_START;
        tracing::debug!(listener = %addr, peer = %peer, "Accepted connection");

        let connection = server.serve_connection(TokioIo::new(stream), service.clone());
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::warn!(peer = %peer, error = %err, "Connection error");
            }
        });
    }
}

/// The client went away between the handshake and accept.
fn is_dropped_connection(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}

/// Out of descriptors or kernel memory. Clears up once connections close.
fn is_resource_exhaustion(err: &io::Error) -> bool {
    err.raw_os_error().map(Errno::from_raw).is_some_and(|errno| {
        matches!(
            errno,
            Errno::EMFILE | Errno::ENFILE | Errno::ENOBUFS | Errno::ENOMEM
        )
    })
}
