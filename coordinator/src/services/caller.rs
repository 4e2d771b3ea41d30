//! Caller front-end: reply sinks and the line-oriented stdio caller

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use shared::codec::{decode_line, encode_line, LineReader};
use shared::{
    process_debug, process_error, process_info, process_warn, validate_request_id, CallerReply, CallerRequest,
    Operation, ProcessId,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::coordinator::CoordinatorHandle;
use crate::core::Submission;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::traits::ReplySink;

/// How long the stdio caller waits for outstanding replies after input ends
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// `ReplySink` backed by an mpsc channel.
///
/// Detached once the receiving half is dropped.
#[derive(Debug)]
pub struct ChannelReplySink {
    replies: mpsc::UnboundedSender<CallerReply>,
}

impl ChannelReplySink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<CallerReply>) {
        let (replies, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { replies }), rx)
    }
}

impl ReplySink for ChannelReplySink {
    fn is_detached(&self) -> bool {
        self.replies.is_closed()
    }

    fn deliver(&self, reply: CallerReply) {
        let _ = self.replies.send(reply);
    }
}

/// Counters reported when a caller session ends
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallerSummary {
    pub submitted: usize,
    pub replied: usize,
    pub malformed: usize,
    pub rejected: usize,
    pub unanswered: usize,
}

/// Reads `CallerRequest` lines and writes `CallerReply` lines
pub struct StdioCaller {
    handle: CoordinatorHandle,
    drain_timeout: Duration,
}

impl StdioCaller {
    pub fn new(handle: CoordinatorHandle) -> Self {
        Self {
            handle,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Configure post-EOF drain timeout (fluent API)
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Serve one session until `reader` ends or the coordinator stops.
    ///
    /// After end of input, replies still outstanding are awaited for at most
    /// the drain timeout. Requests with an unknown operation, an invalid id or
    /// an id this session is still waiting on are rejected here and never
    /// awaited. A request refused by a full pending table still counts as
    /// unanswered.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> CoordinatorResult<CallerSummary>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (sink, mut replies) = ChannelReplySink::new();
        let sink: Arc<dyn ReplySink> = sink;
        let mut outstanding = HashSet::new();
        let mut summary = CallerSummary::default();
        let mut lines = LineReader::new(reader);

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(Ok(line))) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let submitted = line
                            .map_err(CoordinatorError::from)
                            .and_then(|line| self.submit_line(&line, &sink, &outstanding));
                        match submitted {
                            Ok(id) => {
                                summary.submitted += 1;
                                outstanding.insert(id);
                            }
                            Err(e) if e.is_rejection() => {
                                process_warn!(ProcessId::current(), "⚠️ Rejected caller request: {}", e);
                                summary.rejected += 1;
                            }
                            Err(CoordinatorError::SharedError(e)) => {
                                process_error!(ProcessId::current(), "❌ Malformed caller request: {}", e);
                                summary.malformed += 1;
                            }
                            Err(e) => {
                                process_error!(ProcessId::current(), "❌ Coordinator unavailable: {}", e);
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        process_error!(ProcessId::current(), "❌ Caller input failed: {}", e);
                        break;
                    }
                },
                Some(reply) = replies.recv() => {
                    outstanding.remove(&reply.id);
                    summary.replied += 1;
                    write_reply(&mut writer, &reply).await?;
                },
                _ = self.handle.closed() => {
                    process_debug!(ProcessId::current(), "Coordinator stopped, ending caller session");
                    break;
                }
            }
        }

        if !outstanding.is_empty() {
            process_info!(
                ProcessId::current(),
                "⏳ Waiting up to {:?} for {} outstanding replies",
                self.drain_timeout,
                outstanding.len()
            );
        }
        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        while !outstanding.is_empty() {
            tokio::select! {
                reply = tokio::time::timeout_at(deadline, replies.recv()) => match reply {
                    Ok(Some(reply)) => {
                        outstanding.remove(&reply.id);
                        summary.replied += 1;
                        write_reply(&mut writer, &reply).await?;
                    }
                    Ok(None) | Err(_) => break,
                },
                _ = self.handle.closed() => break,
            }
        }

        summary.unanswered = outstanding.len();
        if summary.unanswered > 0 {
            process_warn!(ProcessId::current(), "⚠️ {} requests left without a reply", summary.unanswered);
        }
        Ok(summary)
    }

    fn submit_line(
        &self,
        line: &str,
        sink: &Arc<dyn ReplySink>,
        outstanding: &HashSet<String>,
    ) -> CoordinatorResult<String> {
        let request: CallerRequest = decode_line(line)?;
        request.operation.parse::<Operation>()?;
        let id = request.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        validate_request_id(&id)?;
        if outstanding.contains(&id) {
            return Err(CoordinatorError::DuplicateRequest { id });
        }
        self.handle
            .submit(Submission::new(request.operation, id.clone(), request.args, Arc::downgrade(sink)))?;
        Ok(id)
    }
}

async fn write_reply<W>(writer: &mut W, reply: &CallerReply) -> CoordinatorResult<()>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_line(reply)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
