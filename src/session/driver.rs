//! Session task: the single dispatch loop.
//!
//! ```text
//! transport read ─┐
//! commands ───────┼─► select! ─► Session ─► WriterHandle ─► writer task
//! next deadline ──┘
//! ```
//!
//! When the session stops, the loop closes it and finishes the writer task,
//! and only then emits `Close` and `Disconnect`. A local disconnect lets the
//! writer flush for up to `close_timeout`; any other stop aborts it at once,
//! since the peer may have stopped reading.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

use super::command::{Command, SessionHandle};
use super::{Flow, Session, SessionShared};
use crate::error::Result;
use crate::event::{ClientEvent, DisconnectReason};
use crate::protocol::PacketBuffer;
use crate::writer::spawn_writer_task;

/// A spawned session.
pub(crate) struct SessionParts {
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
    /// Resolves when the handshake completes or fails.
    pub ready: oneshot::Receiver<Result<()>>,
}

/// Start a session over an open transport.
pub(crate) fn spawn_session<S>(stream: S, shared: Arc<SessionShared>) -> SessionParts
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, write_half) = tokio::io::split(stream);
    let (writer, writer_task) = spawn_writer_task(write_half, shared.config.writer.clone());

    let (commands_tx, commands_rx) = mpsc::channel(shared.config.command_capacity);
    let (ready_tx, ready_rx) = oneshot::channel();

    let handle = SessionHandle::new(commands_tx.clone(), shared.state.subscribe());
    let session = Session::new(shared, writer, commands_tx.downgrade(), ready_tx);
    drop(commands_tx);

    let task = tokio::spawn(run(session, reader, commands_rx, writer_task));

    SessionParts {
        handle,
        task,
        ready: ready_rx,
    }
}

async fn run<R>(
    mut session: Session,
    mut reader: R,
    mut commands: mpsc::Receiver<Command>,
    writer_task: JoinHandle<Result<()>>,
) where
    R: AsyncRead + Unpin,
{
    let (read_buffer_size, max_body_size) = {
        let config = &session.shared.config;
        (config.read_buffer_size, config.max_body_size)
    };
    let mut packets = PacketBuffer::with_max_body(max_body_size);
    let mut buf = vec![0u8; read_buffer_size];

    let mut flow = session.start();

    while flow == Flow::Continue {
        let wakeup = session.next_wakeup();

        flow = tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("Transport closed by peer");
                    Flow::Stop(DisconnectReason::PeerClosed)
                }
                Ok(n) => match packets.push(&buf[..n]) {
                    Ok(batch) => session.handle_packets(batch, Instant::now()),
                    Err(e) => {
                        error!("Framing error: {}", e);
                        session.report(ClientEvent::Error(e));
                        Flow::Stop(DisconnectReason::Protocol)
                    }
                },
                Err(e) => {
                    warn!("Transport read failed: {}", e);
                    session.report(ClientEvent::IoError(e.to_string()));
                    Flow::Stop(DisconnectReason::TransportError)
                }
            },
            command = commands.recv() => match command {
                Some(command) => session.handle_command(command, Instant::now()),
                // Every handle is gone
                None => Flow::Stop(DisconnectReason::Local),
            },
            _ = sleep_until_deadline(wakeup) => session.on_timer(Instant::now()),
        };
    }

    let reason = match flow {
        Flow::Stop(reason) => reason,
        Flow::Continue => DisconnectReason::Local,
    };

    let shared = session.close();
    finish_writer(writer_task, reason, shared.config.close_timeout, &shared).await;
    drop(reader);

    debug!(?reason, "Session closed");
    shared.emit(ClientEvent::Close);
    shared.emit(ClientEvent::Disconnect(reason));
}

/// Wait for the writer task to end, aborting it unless this is a local
/// disconnect that drains within `close_timeout`.
async fn finish_writer(
    mut writer_task: JoinHandle<Result<()>>,
    reason: DisconnectReason,
    close_timeout: Duration,
    shared: &SessionShared,
) {
    if reason != DisconnectReason::Local {
        writer_task.abort();
    }

    let result = match tokio::time::timeout(close_timeout, &mut writer_task).await {
        Ok(result) => result,
        Err(_) => {
            warn!(?close_timeout, "Writer did not drain in time, aborting");
            writer_task.abort();
            writer_task.await
        }
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!("Writer finished with error: {}", e);
            shared.emit(ClientEvent::IoError(e.to_string()));
        }
        Err(e) if e.is_cancelled() => debug!("Writer aborted"),
        Err(e) => error!("Writer task failed: {}", e),
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
