//! Event bus for registration, presence and bootstrap events.
//!
//! Managers publish every state change here. Subscribers that need to act
//! synchronously (before the request is answered) register a listener on
//! the manager instead.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Events published by the managers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Lwm2mEvent {
    // ========== Registration Events ==========
    Registered {
        registration_id: String,
        endpoint: String,
        /// Set when this registration replaced a previous one
        replaced: Option<String>,
        timestamp: i64,
    },

    Updated {
        registration_id: String,
        endpoint: String,
        timestamp: i64,
    },

    Deregistered {
        registration_id: String,
        endpoint: String,
        /// Removed by the sweeper rather than by the client
        expired: bool,
        timestamp: i64,
    },

    // ========== Presence Events ==========
    Awake {
        registration_id: String,
        endpoint: String,
        timestamp: i64,
    },

    Sleeping {
        registration_id: String,
        endpoint: String,
        timestamp: i64,
    },

    // ========== Observation Events ==========
    ObservationAdded {
        observation_id: String,
        registration_id: String,
        timestamp: i64,
    },

    ObservationCancelled {
        observation_id: String,
        registration_id: String,
        timestamp: i64,
    },

    // ========== Bootstrap Events ==========
    BootstrapStarted {
        session_id: String,
        endpoint: String,
        timestamp: i64,
    },

    BootstrapRejected {
        endpoint: String,
        code: String,
        timestamp: i64,
    },

    BootstrapFinalized {
        session_id: String,
        endpoint: String,
        timestamp: i64,
    },

    BootstrapFailed {
        session_id: String,
        endpoint: String,
        cause: String,
        timestamp: i64,
    },
}

impl Lwm2mEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "Registered",
            Self::Updated { .. } => "Updated",
            Self::Deregistered { .. } => "Deregistered",
            Self::Awake { .. } => "Awake",
            Self::Sleeping { .. } => "Sleeping",
            Self::ObservationAdded { .. } => "ObservationAdded",
            Self::ObservationCancelled { .. } => "ObservationCancelled",
            Self::BootstrapStarted { .. } => "BootstrapStarted",
            Self::BootstrapRejected { .. } => "BootstrapRejected",
            Self::BootstrapFinalized { .. } => "BootstrapFinalized",
            Self::BootstrapFailed { .. } => "BootstrapFailed",
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Registered { timestamp, .. }
            | Self::Updated { timestamp, .. }
            | Self::Deregistered { timestamp, .. }
            | Self::Awake { timestamp, .. }
            | Self::Sleeping { timestamp, .. }
            | Self::ObservationAdded { timestamp, .. }
            | Self::ObservationCancelled { timestamp, .. }
            | Self::BootstrapStarted { timestamp, .. }
            | Self::BootstrapRejected { timestamp, .. }
            | Self::BootstrapFinalized { timestamp, .. }
            | Self::BootstrapFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Endpoint name, for events that concern one client.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Registered { endpoint, .. }
            | Self::Updated { endpoint, .. }
            | Self::Deregistered { endpoint, .. }
            | Self::Awake { endpoint, .. }
            | Self::Sleeping { endpoint, .. }
            | Self::BootstrapStarted { endpoint, .. }
            | Self::BootstrapRejected { endpoint, .. }
            | Self::BootstrapFinalized { endpoint, .. }
            | Self::BootstrapFailed { endpoint, .. } => Some(endpoint),
            Self::ObservationAdded { .. } | Self::ObservationCancelled { .. } => None,
        }
    }

    pub fn is_registration_event(&self) -> bool {
        matches!(
            self,
            Self::Registered { .. } | Self::Updated { .. } | Self::Deregistered { .. }
        )
    }

    pub fn is_presence_event(&self) -> bool {
        matches!(self, Self::Awake { .. } | Self::Sleeping { .. })
    }

    pub fn is_observation_event(&self) -> bool {
        matches!(
            self,
            Self::ObservationAdded { .. } | Self::ObservationCancelled { .. }
        )
    }

    pub fn is_bootstrap_event(&self) -> bool {
        matches!(
            self,
            Self::BootstrapStarted { .. }
                | Self::BootstrapRejected { .. }
                | Self::BootstrapFinalized { .. }
                | Self::BootstrapFailed { .. }
        )
    }
}

/// Metadata attached to each published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: String,
    /// Component that published
    pub source: String,
    pub timestamp: i64,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Broadcast bus for [`Lwm2mEvent`]s.
///
/// Publishing never blocks. Subscribers that fall behind lose the oldest
/// events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(Lwm2mEvent, EventMetadata)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Returns `true` if at least one subscriber got it.
    pub fn publish(&self, event: Lwm2mEvent) -> bool {
        self.publish_with_source(event, "lwm2m")
    }

    pub fn publish_with_source(&self, event: Lwm2mEvent, source: impl Into<String>) -> bool {
        self.tx.send((event, EventMetadata::new(source))).is_ok()
    }

    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching `filter`.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&Lwm2mEvent) -> bool + Send + 'static,
    {
        FilteredReceiver::new(self.tx.subscribe(), filter)
    }

    pub fn filter(&self) -> FilterBuilder {
        FilterBuilder {
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventBusReceiver {
    rx: broadcast::Receiver<(Lwm2mEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event. Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<(Lwm2mEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<(Lwm2mEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }
}

pub struct FilteredReceiver<F>
where
    F: Fn(&Lwm2mEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(Lwm2mEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&Lwm2mEvent) -> bool + Send,
{
    fn new(rx: broadcast::Receiver<(Lwm2mEvent, EventMetadata)>, filter: F) -> Self {
        Self { rx, filter }
    }

    pub async fn recv(&mut self) -> Option<(Lwm2mEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<(Lwm2mEvent, EventMetadata)> {
        while let Ok((event, meta)) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some((event, meta));
            }
        }
        None
    }
}

/// Ready made filters.
pub struct FilterBuilder {
    tx: broadcast::Sender<(Lwm2mEvent, EventMetadata)>,
}

impl FilterBuilder {
    pub fn registration_events(&self) -> FilteredReceiver<fn(&Lwm2mEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), Lwm2mEvent::is_registration_event)
    }

    pub fn presence_events(&self) -> FilteredReceiver<fn(&Lwm2mEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), Lwm2mEvent::is_presence_event)
    }

    pub fn observation_events(&self) -> FilteredReceiver<fn(&Lwm2mEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), Lwm2mEvent::is_observation_event)
    }

    pub fn bootstrap_events(&self) -> FilteredReceiver<fn(&Lwm2mEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), Lwm2mEvent::is_bootstrap_event)
    }

    /// Events concerning one endpoint.
    pub fn endpoint(
        &self,
        endpoint: impl Into<String>,
    ) -> FilteredReceiver<impl Fn(&Lwm2mEvent) -> bool + Send + 'static> {
        let target = endpoint.into();
        FilteredReceiver::new(self.tx.subscribe(), move |event: &Lwm2mEvent| {
            event.endpoint() == Some(target.as_str())
        })
    }
}
