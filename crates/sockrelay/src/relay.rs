//! Read pumps and the bidirectional dispatch loop.
//!
//! Each direction of a relay is driven by an independent pump that reads
//! fixed-size chunks from its connection and publishes them over a
//! capacity-1 channel. A single dispatch loop races both channels and writes
//! each chunk to the opposite connection; whichever direction ends first
//! terminates the relay. A stalled dispatch loop tears the relay down after
//! the publish window instead of dropping chunks.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::pool::ConnectionPool;

/// Read size for each pump iteration
pub const CHUNK_SIZE: usize = 1024;

/// Bound on how long a pump waits for the dispatch loop to take a chunk
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on reclaiming the backend read half once the relay has ended
pub const GRACE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which side of the relay ended first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The client connection reached end-of-stream or failed
    ClientEnded,
    /// The backend connection reached end-of-stream or failed
    BackendEnded,
}

/// Relay bytes between a client and a borrowed backend connection
///
/// Runs until either side ends, then settles the backend connection's pool
/// disposition based on why the relay ended: when the client side ended and
/// the backend read half is reclaimed within the grace window, the stream is
/// reunited and released for reuse; when the backend side ended (end-of-stream
/// or error) the connection is no longer healthy and is discarded. The client
/// connection's halves are dropped (closing it) before this function returns.
pub async fn run(
    pool: &ConnectionPool,
    client: UnixStream,
    backend: TcpStream,
) -> RelayOutcome {
    let (client_read, mut client_write) = client.into_split();
    let (backend_read, mut backend_write) = backend.into_split();

    let (client_tx, client_rx) = mpsc::channel(1);
    let (backend_tx, backend_rx) = mpsc::channel(1);

    let cancel = CancellationToken::new();
    let client_pump = tokio::spawn(pump(client_read, client_tx, cancel.clone()));
    let backend_pump = tokio::spawn(pump(backend_read, backend_tx, cancel.clone()));

    let outcome = dispatch(
        client_rx,
        backend_rx,
        &mut client_write,
        &mut backend_write,
    )
    .await;
    cancel.cancel();

    // The client pump exits via the cancellation token and drops its read
    // half; dropping the write half below closes the client connection.
    drop(client_pump);

    match tokio::time::timeout(GRACE_TIMEOUT, backend_pump).await {
        Ok(Ok(backend_read)) => match outcome {
            RelayOutcome::ClientEnded => match backend_read.reunite(backend_write) {
                Ok(stream) => {
                    pool.release(stream);
                    debug!(pool_size = pool.size(), "Backend connection returned to pool");
                }
                Err(_) => pool.discard(),
            },
            RelayOutcome::BackendEnded => {
                // The backend side ended the relay; its connection is dead
                // and must not be parked for reuse.
                pool.discard();
                debug!(pool_size = pool.size(), "Dead backend connection discarded");
            }
        },
        Ok(Err(_)) => {
            pool.discard();
        }
        Err(_) => {
            trace!("Backend pump did not finish within grace window");
            pool.discard();
        }
    }

    outcome
}

/// Read chunks from one connection and publish them for dispatch
///
/// Ends on end-of-stream, read error, cancellation, or a publish attempt
/// that outlives [`PUBLISH_TIMEOUT`]. Returns the reader so the caller can
/// reunite a split stream.
async fn pump<R>(mut reader: R, tx: mpsc::Sender<Bytes>, cancel: CancellationToken) -> R
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = tokio::select! {
            () = cancel.cancelled() => break,
            res = reader.read(&mut buf) => match res {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    trace!(error = %e, "Pump read ended");
                    break;
                }
            },
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        match tx.send_timeout(chunk, PUBLISH_TIMEOUT).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                // Dispatch loop stalled past the publish window; end the
                // pump so the whole relay tears down rather than dropping
                // the chunk and reading on.
                debug!("Chunk publish timed out, ending pump");
                break;
            }
            Err(SendTimeoutError::Closed(_)) => break,
        }
    }
    reader
}

/// Forward chunks from both pumps until either direction ends
///
/// First-ready-wins between the two channels; within one direction chunks
/// are written in the order they were read. A closed channel or a failed
/// write ends the relay with the outcome of the side that ended.
async fn dispatch<CW, BW>(
    mut client_rx: mpsc::Receiver<Bytes>,
    mut backend_rx: mpsc::Receiver<Bytes>,
    client_write: &mut CW,
    backend_write: &mut BW,
) -> RelayOutcome
where
    CW: AsyncWrite + Unpin,
    BW: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            chunk = client_rx.recv() => match chunk {
                Some(chunk) => {
                    if let Err(e) = backend_write.write_all(&chunk).await {
                        trace!(error = %e, "Backend write failed");
                        return RelayOutcome::BackendEnded;
                    }
                }
                None => return RelayOutcome::ClientEnded,
            },
            chunk = backend_rx.recv() => match chunk {
                Some(chunk) => {
                    if let Err(e) = client_write.write_all(&chunk).await {
                        trace!(error = %e, "Client write failed");
                        return RelayOutcome::ClientEnded;
                    }
                }
                None => return RelayOutcome::BackendEnded,
            },
        }
    }
}
