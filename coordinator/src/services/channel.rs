//! Line-oriented control channel between the coordinator and one worker

use shared::codec::{decode_line, encode_line, LineReader};
use shared::{process_debug, process_error, ProcessId, WorkerId, WorkerMessage, WorkerRequest};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Everything the coordinator hears about a worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A well-formed record arrived from the worker
    Message { worker: WorkerId, message: WorkerMessage },
    /// The worker's output stream ended
    Closed { worker: WorkerId },
    /// The worker process exited
    Exited { worker: WorkerId, code: Option<i32> },
}

impl WorkerEvent {
    pub fn worker(&self) -> WorkerId {
        match self {
            WorkerEvent::Message { worker, .. } | WorkerEvent::Closed { worker } | WorkerEvent::Exited { worker, .. } => {
                *worker
            }
        }
    }
}

/// Attaches coordinator tasks to a worker's byte streams
pub struct ControlChannel;

impl ControlChannel {
    /// Start the writer and reader tasks for one worker.
    ///
    /// Requests sent on the returned sender are written one per line in send
    /// order. Dropping every clone of the sender closes the worker's input.
    /// Each decoded line from `reader` becomes a `WorkerEvent::Message`;
    /// undecodable lines are logged and skipped; end of stream is reported as
    /// `WorkerEvent::Closed`.
    pub fn attach<R, W>(
        worker: WorkerId,
        reader: R,
        writer: W,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> mpsc::UnboundedSender<WorkerRequest>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, requests) = mpsc::unbounded_channel();
        tokio::spawn(write_requests(worker, writer, requests));
        tokio::spawn(read_messages(worker, reader, events));
        outbound
    }
}

async fn write_requests<W>(worker: WorkerId, mut writer: W, mut requests: mpsc::UnboundedReceiver<WorkerRequest>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = requests.recv().await {
        let line = match encode_line(&request) {
            Ok(line) => line,
            Err(e) => {
                process_error!(ProcessId::current(), "❌ Cannot encode request {} for {}: {}", request.id, worker, e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            process_error!(ProcessId::current(), "❌ Write to {} failed: {}", worker, e);
            return;
        }
        if let Err(e) = writer.flush().await {
            process_error!(ProcessId::current(), "❌ Flush to {} failed: {}", worker, e);
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        process_debug!(ProcessId::current(), "Closing input of {}: {}", worker, e);
    }
}

async fn read_messages<R>(worker: WorkerId, reader: R, events: mpsc::UnboundedSender<WorkerEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LineReader::new(reader);
    loop {
        match lines.next_line().await {
            Ok(Some(Ok(line))) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.and_then(|line| decode_line::<WorkerMessage>(&line)) {
                Ok(message) => {
                    if events.send(WorkerEvent::Message { worker, message }).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    process_error!(ProcessId::current(), "❌ Malformed message from {}: {}", worker, e);
                }
            },
            Ok(None) => break,
            Err(e) => {
                process_error!(ProcessId::current(), "❌ Read from {} failed: {}", worker, e);
                break;
            }
        }
    }

    let _ = events.send(WorkerEvent::Closed { worker });
}
