//! The request loop that runs inside each worker process

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use provider::MetricsProvider;
use shared::codec::{decode_line, encode_line, LineReader};
use shared::{process_debug, process_error, process_warn, Operation, ProcessId, ReplyOutcome, WorkerMessage, WorkerRequest};

use crate::error::{WorkerError, WorkerResult};

/// Executes requests received over a control channel.
///
/// Requests run concurrently; replies funnel through a single writer task so
/// lines never interleave on the output stream.
pub struct WorkerRuntime<P>
where
    P: MetricsProvider + 'static,
{
    worker_id: u32,
    provider: Arc<P>,
}

impl<P> WorkerRuntime<P>
where
    P: MetricsProvider + 'static,
{
    pub fn new(worker_id: u32, provider: Arc<P>) -> Self {
        Self { worker_id, provider }
    }

    /// Serve requests from `reader` until it reaches EOF.
    ///
    /// The first record written is `{ready, pid}`. On EOF every in-flight
    /// request is allowed to finish and its reply is flushed before returning.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> WorkerResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel::<WorkerMessage>();
        let writer_task = tokio::spawn(write_replies(writer, reply_rx));

        reply_tx
            .send(WorkerMessage::Ready {
                ready: self.worker_id,
                pid: std::process::id(),
            })
            .map_err(|_| WorkerError::ChannelError {
                message: "reply writer stopped before ready".to_string(),
            })?;

        let mut lines = LineReader::new(reader);
        let mut in_flight = JoinSet::new();
        let mut read_error = None;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(Ok(line))) => self.handle_line(&line, &reply_tx, &mut in_flight),
                    Ok(Some(Err(e))) => {
                        process_error!(ProcessId::current(), "❌ Dropping malformed request: {}", e);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        process_error!(ProcessId::current(), "❌ Control channel read failed: {}", e);
                        read_error = Some(e);
                        break;
                    }
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        process_error!(ProcessId::current(), "❌ Request task failed: {}", e);
                    }
                }
            }
        }

        process_debug!(ProcessId::current(), "Input closed, draining {} in-flight requests", in_flight.len());
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                process_error!(ProcessId::current(), "❌ Request task failed: {}", e);
            }
        }

        drop(reply_tx);
        writer_task.await??;

        match read_error {
            Some(e) => Err(WorkerError::IoError(e)),
            None => Ok(()),
        }
    }

    fn handle_line(
        &self,
        line: &str,
        reply_tx: &mpsc::UnboundedSender<WorkerMessage>,
        in_flight: &mut JoinSet<()>,
    ) {
        if line.trim().is_empty() {
            return;
        }

        let request: WorkerRequest = match decode_line(line) {
            Ok(request) => request,
            Err(e) => {
                process_error!(ProcessId::current(), "❌ Dropping malformed request: {}", e);
                return;
            }
        };

        let operation: Operation = match request.operation.parse() {
            Ok(operation) => operation,
            Err(e) => {
                process_warn!(ProcessId::current(), "⚠️ Request {} rejected: {}", request.id, e);
                let _ = reply_tx.send(WorkerMessage::reply(request.id, ReplyOutcome::Error(e.to_string())));
                return;
            }
        };

        let provider = Arc::clone(&self.provider);
        let reply_tx = reply_tx.clone();
        in_flight.spawn(async move {
            let args = request.arg.into_iter().collect();
            let outcome = match provider.call(operation, args).await {
                Ok(res) => ReplyOutcome::Res(res),
                Err(e) => {
                    process_error!(ProcessId::current(), "❌ {} for request {} failed: {}", operation, request.id, e);
                    ReplyOutcome::Error(e.to_string())
                }
            };
            let _ = reply_tx.send(WorkerMessage::reply(request.id, outcome));
        });
    }
}

/// Serialise replies onto the output stream, one line each
async fn write_replies<W>(mut writer: W, mut replies: mpsc::UnboundedReceiver<WorkerMessage>) -> WorkerResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = replies.recv().await {
        let line = match encode_line(&message) {
            Ok(line) => line,
            Err(e) => match &message {
                // Result did not fit on the wire; tell the coordinator instead
                WorkerMessage::Success { id, .. } => {
                    process_error!(ProcessId::current(), "❌ Reply for {} not sendable: {}", id, e);
                    encode_line(&WorkerMessage::reply(id.clone(), ReplyOutcome::Error(e.to_string())))?
                }
                _ => return Err(e.into()),
            },
        };
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
