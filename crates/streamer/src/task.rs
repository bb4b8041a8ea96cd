use crate::cancel::CancelToken;
use crate::error::Result;
use crate::streamer::RecursiveStreamer;
use relay_protocol::NodeEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Receiving end of a traversal running on its own task.
///
/// Dropping the stream cancels the traversal; no upstream call starts afterwards.
pub struct EventStream {
    receiver: mpsc::Receiver<Result<NodeEvent>>,
    cancel: CancelToken,
    task: JoinHandle<()>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<Result<NodeEvent>> {
        self.receiver.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Runs `streamer` on a task feeding a bounded channel of `buffer` events.
///
/// Backpressure is the channel: the traversal only advances (and fetches) while the consumer
/// keeps up.
pub fn spawn_stream(mut streamer: RecursiveStreamer, buffer: usize) -> EventStream {
    let (tx, receiver) = mpsc::channel(buffer.max(1));
    let cancel = streamer.cancel_token();
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                biased;
                () = tx.closed() => {
                    task_cancel.cancel();
                    break;
                }
                item = streamer.next() => item,
            };
            let Some(item) = item else {
                break;
            };
            if tx.send(item).await.is_err() {
                task_cancel.cancel();
                break;
            }
        }
        log::debug!(
            "stream task done after {} events, {} fetches",
            streamer.emitted(),
            streamer.fetches()
        );
    });

    EventStream {
        receiver,
        cancel,
        task,
    }
}
