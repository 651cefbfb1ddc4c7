//! The consumer loop for one event stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::broker::{InboundMessage, MessageSource};
use crate::consumer::handler::{Disposition, MessageHandler};
use crate::errors::PipelineError;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const DEFAULT_REDELIVERY_BACKOFF: Duration = Duration::from_secs(1);

/// Lifecycle of a consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Subscribing,
    Polling,
    Dispatching,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Name used in logs.
    pub name: String,
    pub topic: String,
    /// Upper bound of one poll; also how often cancellation is checked.
    pub poll_timeout: Duration,
    /// Pause after a failed message before it is polled again.
    pub redelivery_backoff: Duration,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            redelivery_backoff: DEFAULT_REDELIVERY_BACKOFF,
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_redelivery_backoff(mut self, redelivery_backoff: Duration) -> Self {
        self.redelivery_backoff = redelivery_backoff;
        self
    }
}

/// Counters for one run of a consumer loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub processed: u64,
    pub dropped: u64,
    /// Handler failures; each one is redelivered.
    pub failed: u64,
    pub transport_errors: u64,
}

/// Polls one topic and hands each message to a handler, strictly one at a
/// time. A message's offset is committed only after its handler returned.
pub struct ConsumerLoop {
    config: StreamConfig,
    source: Box<dyn MessageSource>,
    handler: Arc<dyn MessageHandler>,
    state: watch::Sender<ConsumerState>,
}

impl ConsumerLoop {
    pub fn new(
        config: StreamConfig,
        source: Box<dyn MessageSource>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            config,
            source,
            handler,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Follow the loop's state transitions.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ConsumerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(stream = %self.config.name, from = ?previous, to = ?next, "Consumer state changed");
        }
    }

    /// Run until `cancel` fires. Only a failed subscription ends the loop
    /// early; every other failure is logged and consumption continues.
    #[instrument(skip(self, cancel), fields(stream = %self.config.name, topic = %self.config.topic))]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<StreamStats, PipelineError> {
        self.transition(ConsumerState::Subscribing);
        if let Err(e) = self.source.subscribe(&self.config.topic).await {
            error!(error = %e, "Failed to subscribe");
            self.transition(ConsumerState::Stopped);
            return Err(e);
        }

        self.transition(ConsumerState::Polling);
        info!("Consumer loop started");

        let mut stats = StreamStats::default();

        while !cancel.is_cancelled() {
            match self.source.poll(self.config.poll_timeout).await {
                Ok(None) => continue,
                Ok(Some(message)) => {
                    self.transition(ConsumerState::Dispatching);
                    self.process(&message, &mut stats, &cancel).await;
                    self.transition(ConsumerState::Polling);
                }
                Err(e) => {
                    stats.transport_errors += 1;
                    warn!(error = %e, "Failed to receive message");
                    pause(self.config.poll_timeout, &cancel).await;
                }
            }
        }

        self.transition(ConsumerState::ShuttingDown);
        self.source.close().await;
        self.transition(ConsumerState::Stopped);

        info!(
            processed = stats.processed,
            dropped = stats.dropped,
            failed = stats.failed,
            transport_errors = stats.transport_errors,
            "Consumer loop stopped"
        );
        Ok(stats)
    }

    async fn process(&mut self, message: &InboundMessage, stats: &mut StreamStats, cancel: &CancellationToken) {
        debug!(
            partition = message.partition,
            offset = message.offset,
            "Processing message"
        );

        match self.handler.handle(message).await {
            Ok(disposition) => {
                match disposition {
                    Disposition::Processed => stats.processed += 1,
                    Disposition::Dropped(_) => stats.dropped += 1,
                }
                if let Err(e) = self.source.commit(message).await {
                    // Processing already happened; a redelivery after restart is harmless.
                    warn!(offset = message.offset, error = %e, "Failed to commit offset");
                }
            }
            Err(e) => {
                stats.failed += 1;
                error!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to process message; offset not committed, it will be redelivered"
                );
                if let Err(e) = self.source.rewind(message).await {
                    warn!(offset = message.offset, error = %e, "Failed to rewind for redelivery");
                }
                pause(self.config.redelivery_backoff, cancel).await;
            }
        }
    }
}

/// Sleep for `duration` unless cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}
