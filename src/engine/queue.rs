// Daimon Engine — Cycle Queue
// Channel adapters hand messages to a single consumer task so cycles run
// strictly one at a time. Each submission gets its reply back over a
// oneshot; a failed cycle answers with the fallback sentence.
//
// `drain_inbox` feeds the durable inbound queue (polling adapters) through
// the same consumer. A message is claimed before it is submitted, so a
// duplicate read never yields a second delivery.

use crate::atoms::constants::FALLBACK_REPLY;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::InboundMessage;
use crate::engine::cycle::CycleEngine;
use crate::engine::store::MemoryStore;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// One queued cycle and where to send its reply.
pub struct CycleJob {
    pub message: InboundMessage,
    pub reply: oneshot::Sender<String>,
}

/// Producer handle. Cheap to clone; the consumer stops once every clone is
/// dropped and the queue has drained.
#[derive(Clone)]
pub struct CycleQueue {
    tx: mpsc::Sender<CycleJob>,
}

impl CycleQueue {
    /// Start the consumer task. `capacity` bounds how many messages may wait.
    pub fn spawn(engine: Arc<CycleEngine>, capacity: usize) -> (CycleQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<CycleJob>(capacity.max(1));
        let handle = tokio::spawn(async move {
            info!("[queue] Consumer started (capacity {})", capacity.max(1));
            while let Some(job) = rx.recv().await {
                let reply = match engine.process_message(&job.message).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!(
                            "[queue] Cycle for {}/{} failed: {}",
                            job.message.channel, job.message.thread, e
                        );
                        FALLBACK_REPLY.to_string()
                    }
                };
                if job.reply.send(reply).is_err() {
                    debug!("[queue] Submitter went away before the reply was ready");
                }
            }
            info!("[queue] Consumer stopped");
        });
        (CycleQueue { tx }, handle)
    }

    /// Queue a message and wait for its reply.
    pub async fn submit(&self, message: InboundMessage) -> EngineResult<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CycleJob { message, reply: reply_tx })
            .await
            .map_err(|_| EngineError::Other("cycle queue is closed".into()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::Other("cycle consumer dropped the job".into()))
    }
}

/// Submit up to `limit` pending inbound messages from `store` to `queue`.
/// `deliver` receives each reply. Returns how many messages this call
/// handled; an error means the queue closed mid-drain.
pub async fn drain_inbox<F>(store: &MemoryStore, queue: &CycleQueue, limit: usize, mut deliver: F) -> EngineResult<usize>
where
    F: FnMut(&InboundMessage, &str),
{
    let pending = store.pending_inbound(limit)?;
    let mut handled = 0;
    for record in pending {
        if !store.claim_inbound(&record.source_id)? {
            debug!("[queue] {} already claimed elsewhere", record.source_id);
            continue;
        }
        let reply = queue.submit(record.message.clone()).await?;
        deliver(&record.message, &reply);
        handled += 1;
    }
    if handled > 0 {
        info!("[queue] Drained {} inbound message(s)", handled);
    }
    Ok(handled)
}
