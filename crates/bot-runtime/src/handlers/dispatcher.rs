//! # Chat Dispatcher
//!
//! Subscribes to inbound chat events and hands them to the poll service.
//!
//! ```text
//! Event Bus (Inbound)
//!       │
//!       ▼
//! ┌──────────────────┐  one queue per device  ┌──────────────┐
//! │  ChatDispatcher  │ ─────────────────────→ │ DeviceWorker │ ──→ PollBotApi
//! └──────────────────┘                        └──────────────┘
//! ```
//!
//! Events from one device are handled strictly in arrival order, events from
//! different devices concurrently. A worker with an empty queue exits after
//! the idle period and is respawned by the next event from its device.
//!
//! On shutdown the dispatcher hands over every event already on the bus,
//! then waits for the workers to empty their queues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, debug_span, error, field, info, instrument, warn, Instrument, Span};

use bot_telemetry::{
    metric_inc, HistogramTimer, HANDLER_FAILURES, HANDLING_DURATION, MESSAGES_IGNORED,
    MESSAGES_RECEIVED, REPLIES_SENT, STALE_TALLIES,
};
use poll_engine::{Outcome, PollBotApi, ReplyKind};
use shared_bus::{ChatEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use shared_types::entities::DeviceAddress;

type WorkerMap = Arc<Mutex<HashMap<DeviceAddress, mpsc::UnboundedSender<ChatEvent>>>>;

/// Routes inbound chat events to per-device workers.
pub struct ChatDispatcher {
    api: Arc<dyn PollBotApi>,
    subscription: Subscription,
    idle: Duration,
    workers: WorkerMap,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatDispatcher {
    /// Subscribe to the inbound topic of `bus`.
    pub fn new(api: Arc<dyn PollBotApi>, bus: &InMemoryEventBus, idle: Duration) -> Self {
        let subscription = bus.subscribe(EventFilter::topics(vec![EventTopic::Inbound]));
        Self {
            api,
            subscription,
            idle,
            workers: Arc::new(Mutex::new(HashMap::new())),
            tasks: Vec::new(),
        }
    }

    /// Devices that currently have a worker.
    pub fn active_devices(&self) -> usize {
        self.workers.lock().len()
    }

    /// Dispatch events until `shutdown` fires or the bus closes, then wait
    /// for every worker to finish its queue. Spawn as a background task.
    #[instrument(skip_all, name = "chat_dispatcher")]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Chat dispatcher started");
        loop {
            tokio::select! {
                event = self.subscription.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        info!("Event bus closed, chat dispatcher stopping");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    let mut drained = 0usize;
                    while let Some(event) = self.subscription.try_recv() {
                        self.dispatch(event);
                        drained += 1;
                    }
                    info!(drained, "Chat dispatcher shutting down");
                    break;
                }
            }
        }
        self.join_workers().await;
    }

    /// Close every worker queue and wait for the workers to empty them.
    async fn join_workers(self) {
        // Dropping the senders ends each worker once its queue is empty.
        self.workers.lock().clear();
        let pending = self.tasks.len();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Device worker failed");
            }
        }
        debug!(pending, "Device workers stopped");
    }

    fn dispatch(&mut self, event: ChatEvent) {
        let label = match &event {
            ChatEvent::Paired { .. } => "paired",
            ChatEvent::TextReceived { .. } => "text",
            ChatEvent::TextOutbound { device, .. } => {
                warn!(device = %device, "Outbound event on the inbound subscription");
                return;
            }
        };
        metric_inc!(MESSAGES_RECEIVED, &[label]);

        let device = event.device().clone();
        let mut workers = self.workers.lock();
        let event = match workers.get(&device) {
            Some(tx) => match tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        workers.insert(device.clone(), tx);
        drop(workers);

        debug!(device = %device, "Spawning device worker");
        let worker = DeviceWorker {
            device,
            api: Arc::clone(&self.api),
            rx,
            idle: self.idle,
            workers: Arc::clone(&self.workers),
        };
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(worker.run(event)));
    }
}

struct DeviceWorker {
    device: DeviceAddress,
    api: Arc<dyn PollBotApi>,
    rx: mpsc::UnboundedReceiver<ChatEvent>,
    idle: Duration,
    workers: WorkerMap,
}

impl DeviceWorker {
    async fn run(mut self, first: ChatEvent) {
        handle_event(self.api.as_ref(), first).await;

        loop {
            let event = match timeout(self.idle, self.rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => {
                    // The map lock orders this check against `dispatch`.
                    let pending = {
                        let mut workers = self.workers.lock();
                        match self.rx.try_recv() {
                            Ok(event) => Some(event),
                            Err(_) => {
                                workers.remove(&self.device);
                                None
                            }
                        }
                    };
                    match pending {
                        Some(event) => event,
                        None => break,
                    }
                }
            };
            handle_event(self.api.as_ref(), event).await;
        }
        debug!(device = %self.device, "Device worker stopped");
    }
}

/// Span for one event; inbound text carries its bus message id.
fn event_span(event: &ChatEvent) -> Span {
    let span = debug_span!("chat_event", device = %event.device(), message_id = field::Empty);
    if let Some(id) = event.message_id() {
        span.record("message_id", field::display(id));
    }
    span
}

async fn handle_event(api: &dyn PollBotApi, event: ChatEvent) {
    let span = event_span(&event);
    process_event(api, event).instrument(span).await;
}

async fn process_event(api: &dyn PollBotApi, event: ChatEvent) {
    let _timer = HistogramTimer::new(&HANDLING_DURATION);

    let result = match &event {
        ChatEvent::Paired { device } => api.handle_paired(device).await,
        ChatEvent::TextReceived { device, text, .. } => api.handle_text(device, text).await,
        ChatEvent::TextOutbound { .. } => return,
    };

    match result {
        Ok(Outcome::Ignored) => {
            metric_inc!(MESSAGES_IGNORED);
            debug!(device = %event.device(), "Message ignored");
        }
        Ok(Outcome::Replied { kind }) => {
            metric_inc!(REPLIES_SENT, &[kind.as_str()]);
            if let ReplyKind::BalanceResults { stale: true } = kind {
                metric_inc!(STALE_TALLIES);
            }
        }
        Err(e) => {
            metric_inc!(HANDLER_FAILURES, &[e.kind()]);
            error!(device = %event.device(), error = %e, "Failed to handle chat event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use poll_engine::PollBotError;
    use shared_bus::EventPublisher;

    /// Records calls; texts starting with "slow" take 50ms.
    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl RecordingApi {
        fn calls_for(&self, device: &str) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .filter(|(d, _)| d == device)
                .map(|(_, t)| t.clone())
                .collect()
        }

        fn len(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl PollBotApi for RecordingApi {
        async fn handle_text(
            &self,
            device: &DeviceAddress,
            text: &str,
        ) -> Result<Outcome, PollBotError> {
            if text.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.calls
                .lock()
                .push((device.to_string(), text.to_string()));
            Ok(Outcome::Replied {
                kind: ReplyKind::PollList,
            })
        }

        async fn handle_paired(&self, device: &DeviceAddress) -> Result<Outcome, PollBotError> {
            self.calls
                .lock()
                .push((device.to_string(), "<paired>".to_string()));
            Ok(Outcome::Replied {
                kind: ReplyKind::PollList,
            })
        }
    }

    async fn wait_for(api: &RecordingApi, count: usize) {
        for _ in 0..200 {
            if api.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} calls, saw {}", api.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_device_order_is_kept() {
        let api = Arc::new(RecordingApi::default());
        let bus = InMemoryEventBus::new();
        let dispatcher = ChatDispatcher::new(api.clone(), &bus, Duration::from_secs(60));
        let (_stop, shutdown) = watch::channel(false);
        tokio::spawn(dispatcher.run(shutdown));

        let d1 = DeviceAddress::from("D1");
        let d2 = DeviceAddress::from("D2");
        bus.publish(ChatEvent::text_received(d1.clone(), "slow 1")).await;
        bus.publish(ChatEvent::text_received(d2.clone(), "fast")).await;
        bus.publish(ChatEvent::text_received(d1.clone(), "2")).await;
        bus.publish(ChatEvent::text_received(d1.clone(), "slow 3")).await;

        wait_for(&api, 4).await;
        assert_eq!(api.calls_for("D1"), vec!["slow 1", "2", "slow 3"]);
        // D2 did not wait behind D1's slow message.
        assert_eq!(api.calls.lock()[0].0, "D2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_paired_event_reaches_api() {
        let api = Arc::new(RecordingApi::default());
        let bus = InMemoryEventBus::new();
        let dispatcher = ChatDispatcher::new(api.clone(), &bus, Duration::from_secs(60));
        let (_stop, shutdown) = watch::channel(false);
        tokio::spawn(dispatcher.run(shutdown));

        bus.publish(ChatEvent::Paired {
            device: DeviceAddress::from("D9"),
        })
        .await;

        wait_for(&api, 1).await;
        assert_eq!(api.calls_for("D9"), vec!["<paired>"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_exits_and_respawns() {
        let api = Arc::new(RecordingApi::default());
        let bus = InMemoryEventBus::new();
        let mut dispatcher = ChatDispatcher::new(api.clone(), &bus, Duration::from_secs(1));
        let device = DeviceAddress::from("D1");

        dispatcher.dispatch(ChatEvent::text_received(device.clone(), "polls"));
        assert_eq!(dispatcher.active_devices(), 1);
        wait_for(&api, 1).await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(dispatcher.active_devices(), 0);

        dispatcher.dispatch(ChatEvent::text_received(device, "polls"));
        assert_eq!(dispatcher.active_devices(), 1);
        wait_for(&api, 2).await;
    }

    #[tokio::test]
    async fn test_outbound_events_are_not_dispatched() {
        let api = Arc::new(RecordingApi::default());
        let bus = InMemoryEventBus::new();
        let mut dispatcher = ChatDispatcher::new(api.clone(), &bus, Duration::from_secs(1));

        dispatcher.dispatch(ChatEvent::TextOutbound {
            device: DeviceAddress::from("D1"),
            body: "echo".into(),
        });
        assert_eq!(dispatcher.active_devices(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_handles_every_published_event() {
        let api = Arc::new(RecordingApi::default());
        let bus = InMemoryEventBus::new();
        let dispatcher = ChatDispatcher::new(api.clone(), &bus, Duration::from_secs(60));

        for i in 0..20 {
            let device = DeviceAddress::from(format!("D{}", i % 3));
            bus.publish(ChatEvent::text_received(device, format!("slow {i}")))
                .await;
        }

        // Shut down before the dispatcher has looked at a single event.
        let (stop, shutdown) = watch::channel(false);
        stop.send(true).unwrap();
        dispatcher.run(shutdown).await;

        assert_eq!(api.len(), 20);
        assert_eq!(
            api.calls_for("D1"),
            (0..20)
                .filter(|i| i % 3 == 1)
                .map(|i| format!("slow {i}"))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_queued_events() {
        let api = Arc::new(RecordingApi::default());
        let bus = InMemoryEventBus::new();
        let dispatcher = ChatDispatcher::new(api.clone(), &bus, Duration::from_secs(60));
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(dispatcher.run(shutdown));

        let device = DeviceAddress::from("D1");
        for text in ["slow 1", "slow 2", "slow 3"] {
            bus.publish(ChatEvent::text_received(device.clone(), text)).await;
        }
        wait_for(&api, 1).await;

        stop.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(api.calls_for("D1"), vec!["slow 1", "slow 2", "slow 3"]);
    }

    #[tokio::test]
    async fn test_run_ends_when_bus_closes() {
        let api = Arc::new(RecordingApi::default());
        let bus = InMemoryEventBus::new();
        let dispatcher = ChatDispatcher::new(api.clone(), &bus, Duration::from_secs(60));
        bus.publish(ChatEvent::text_received(DeviceAddress::from("D1"), "polls"))
            .await;
        drop(bus);

        let (_stop, shutdown) = watch::channel(false);
        timeout(Duration::from_secs(1), dispatcher.run(shutdown))
            .await
            .unwrap();
        assert_eq!(api.calls_for("D1"), vec!["polls"]);
    }
}
