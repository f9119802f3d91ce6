//! Redis Streams publisher
//!
//! Events are encoded on the caller's task and queued on a bounded channel.
//! A single background task owns the connection and appends them with
//! `XADD <stream> MAXLEN ~ <max_len> * subject <subject> payload <json>`.

use std::future::Future;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use secrecy::ExposeSecret;
use serde::Serialize;
use switchboard_config::EventsConfig;
use switchboard_core::{InferenceRequest, InferenceResponse, PolicyBlock, Provider, RoutingDecision};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::{EncodedEvent, EventKind, InferenceFailure, InferenceSummary};
use crate::{EventError, EventPublisher};

const QUEUE_CAPACITY: usize = 4096;

/// Publishes events to a Redis stream from a background task
pub struct RedisStreamPublisher {
    prefix: String,
    queue: EventQueue,
}

impl RedisStreamPublisher {
    /// Connect to Redis and start the background writer
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or invalid, or the initial
    /// connection fails
    pub async fn connect(config: &EventsConfig) -> Result<Self, EventError> {
        let url = config
            .url
            .as_ref()
            .ok_or_else(|| EventError::Backend("events.url is not configured".to_owned()))?;

        let client = redis::Client::open(url.expose_secret())
            .map_err(|e| EventError::Backend(format!("invalid URL: {e}")))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(config.connect_retries)
            .set_connection_timeout(config.connect_timeout);

        let connection = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| EventError::Backend(format!("connection failed: {e}")))?;

        let stream = config.stream.clone();
        let max_len = config.max_len;

        let queue = EventQueue::spawn(QUEUE_CAPACITY, move |event| {
            let mut connection = connection.clone();
            let stream = stream.clone();
            async move {
                let appended: Result<String, _> = redis::cmd("XADD")
                    .arg(&stream)
                    .arg("MAXLEN")
                    .arg("~")
                    .arg(max_len)
                    .arg("*")
                    .arg("subject")
                    .arg(&event.subject)
                    .arg("payload")
                    .arg(&event.payload)
                    .query_async(&mut connection)
                    .await;

                if let Err(e) = appended {
                    tracing::warn!(error = %e, subject = %event.subject, stream = %stream, "failed to append event");
                }
            }
        });

        Ok(Self {
            prefix: config.subject_prefix.clone(),
            queue,
        })
    }

    fn enqueue<T: Serialize>(&self, kind: EventKind, payload: &T) -> Result<(), EventError> {
        let event = EncodedEvent::encode(kind, &self.prefix, payload)?;
        self.queue.push(event)
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish_policy_block(&self, block: &PolicyBlock) -> Result<(), EventError> {
        self.enqueue(EventKind::PolicyBlock, block)
    }

    async fn publish_router_decision(&self, decision: &RoutingDecision) -> Result<(), EventError> {
        self.enqueue(EventKind::RouterDecision, decision)
    }

    async fn publish_inference_summary(
        &self,
        request: &InferenceRequest,
        response: &InferenceResponse,
    ) -> Result<(), EventError> {
        self.enqueue(EventKind::InferenceSummary, &InferenceSummary::new(request, response))
    }

    async fn publish_inference_error(
        &self,
        request: &InferenceRequest,
        provider: Provider,
        model: &str,
        code: &str,
        message: &str,
    ) -> Result<(), EventError> {
        let failure = InferenceFailure {
            context: &request.context,
            use_case: request.use_case,
            provider,
            model,
            code,
            message,
        };
        self.enqueue(EventKind::InferenceError, &failure)
    }

    async fn close(&self) -> Result<(), EventError> {
        self.queue.close().await
    }
}

impl std::fmt::Debug for RedisStreamPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamPublisher")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Bounded queue drained by one background writer
struct EventQueue {
    tx: Mutex<Option<mpsc::Sender<EncodedEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventQueue {
    fn spawn<F, Fut>(capacity: usize, mut write: F) -> Self
    where
        F: FnMut(EncodedEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::channel::<EncodedEvent>(capacity);

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                write(event).await;
            }
            tracing::debug!("event writer shutting down");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn push(&self, event: EncodedEvent) -> Result<(), EventError> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| EventError::Closed)?
            .clone()
            .ok_or(EventError::Closed)?;

        tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => EventError::QueueFull { subject: event.subject },
            mpsc::error::TrySendError::Closed(_) => EventError::Closed,
        })
    }

    /// Stop accepting events and wait for queued ones to be written
    async fn close(&self) -> Result<(), EventError> {
        drop(self.tx.lock().map_err(|_| EventError::Closed)?.take());

        let worker = self.worker.lock().map_err(|_| EventError::Closed)?.take();
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| EventError::Backend(format!("event writer failed: {e}")))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn unreachable_backend_fails_promptly() {
        let config = EventsConfig {
            enabled: true,
            url: Some("redis://127.0.0.1:1".into()),
            connect_timeout: Duration::from_millis(200),
            connect_retries: 0,
            ..EventsConfig::default()
        };

        let result = tokio::time::timeout(Duration::from_secs(10), RedisStreamPublisher::connect(&config)).await;

        let err = result.expect("connect gave up within the deadline").unwrap_err();
        assert!(matches!(err, EventError::Backend(message) if message.starts_with("connection failed")));
    }

    #[tokio::test]
    async fn missing_url_is_rejected() {
        let config = EventsConfig {
            enabled: true,
            ..EventsConfig::default()
        };

        let err = RedisStreamPublisher::connect(&config).await.unwrap_err();
        assert!(matches!(err, EventError::Backend(message) if message.contains("events.url")));
    }

    fn event(subject: &str) -> EncodedEvent {
        EncodedEvent {
            subject: subject.to_owned(),
            payload: "{}".to_owned(),
        }
    }

    fn recording_queue(capacity: usize, delay: Duration) -> (EventQueue, Arc<Mutex<Vec<String>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&written);

        let queue = EventQueue::spawn(capacity, move |event| {
            let sink = Arc::clone(&sink);
            async move {
                tokio::time::sleep(delay).await;
                sink.lock().unwrap().push(event.subject);
            }
        });

        (queue, written)
    }

    #[tokio::test]
    async fn close_flushes_queued_events_in_order() {
        let (queue, written) = recording_queue(16, Duration::from_millis(5));

        queue.push(event("a")).unwrap();
        queue.push(event("b")).unwrap();
        queue.push(event("c")).unwrap();
        queue.close().await.unwrap();

        assert_eq!(*written.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn push_after_close_fails() {
        let (queue, _written) = recording_queue(4, Duration::ZERO);
        queue.close().await.unwrap();

        assert!(matches!(queue.push(event("late")), Err(EventError::Closed)));
        // closing twice is harmless
        queue.close().await.unwrap();
    }

    #[tokio::test]
    async fn full_queue_reports_dropped_subject() {
        let (queue, _written) = recording_queue(1, Duration::from_secs(5));

        // first event is taken by the writer, second fills the queue
        queue.push(event("first")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(event("second")).unwrap();

        let err = queue.push(event("third")).unwrap_err();
        assert!(matches!(err, EventError::QueueFull { subject } if subject == "third"));
    }
}
