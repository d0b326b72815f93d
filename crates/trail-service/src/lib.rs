//! The central audit service: validation, identity, per-topic fan-out and
//! lifecycle, plus the buffering decorator for slow sinks.

mod buffer;
mod null_query;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use trail_events::{
    AuditError, Event, EventSink, QueryFilter, QueryFlow, QueryHandler, QuerySummary,
    SchemaRegistry, ServiceConfig,
};

pub use buffer::BufferedSink;
pub use null_query::NullQuerySink;

/// Lifecycle of the audit service. Every call other than `startup` and
/// `shutdown` is only legal in `Running`; `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Starting,
    Running,
    Shutdown,
}

impl ServiceState {
    fn name(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Shutdown => "shut down",
        }
    }
}

/// Generates `_id` values for events that arrive without one.
pub type IdGenerator = dyn Fn() -> String + Send + Sync;

/// One sink's failure during fan-out.
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: String,
    pub error: AuditError,
}

/// Aggregated outcome of one `create`: the assigned identifier plus every
/// per-sink failure. Fan-out never aborts early, so `delivered` counts the
/// sinks that accepted the event.
#[derive(Debug)]
pub struct PublishReceipt {
    pub event_id: String,
    pub delivered: usize,
    pub failures: Vec<SinkFailure>,
}

impl PublishReceipt {
    pub fn fully_delivered(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Supported read-side and mutation verbs of the service surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Query,
}

/// Maps an incoming action verb onto the service operation class.
/// The mutation verbs the service never supports fail `NotSupported`;
/// anything unrecognized fails `BadRequest`.
pub fn classify_action(verb: &str) -> Result<Action, AuditError> {
    match verb {
        "create" => Ok(Action::Create),
        "read" => Ok(Action::Read),
        "query" => Ok(Action::Query),
        "update" | "delete" | "patch" => Err(AuditError::NotSupported(format!(
            "the audit service does not support '{verb}'"
        ))),
        other => Err(AuditError::BadRequest(format!("unknown action '{other}'"))),
    }
}

/// One decoded request, as handed over by whatever wire layer fronts the
/// service.
#[derive(Debug, Default)]
pub struct Request {
    pub action: String,
    pub topic: String,
    /// Payload for `create`.
    pub event: Option<Event>,
    /// Target identifier for `read`.
    pub id: Option<String>,
    /// Row filter for `query`.
    pub filter: QueryFilter,
}

impl Request {
    pub fn create(topic: impl Into<String>, event: Event) -> Self {
        Self {
            action: "create".to_owned(),
            topic: topic.into(),
            event: Some(event),
            ..Self::default()
        }
    }

    pub fn read(topic: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            action: "read".to_owned(),
            topic: topic.into(),
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn query(topic: impl Into<String>, filter: QueryFilter) -> Self {
        Self {
            action: "query".to_owned(),
            topic: topic.into(),
            filter,
            ..Self::default()
        }
    }
}

/// Successful dispatch outcome, by operation class.
#[derive(Debug)]
pub enum Response {
    Created(PublishReceipt),
    Event(Event),
    Matches {
        events: Vec<Event>,
        summary: QuerySummary,
    },
}

/// Assembles an [`AuditService`]: sinks first, then per-topic routes
/// referring to them by name.
pub struct AuditServiceBuilder {
    config: ServiceConfig,
    schemas: SchemaRegistry,
    sinks: Vec<Arc<dyn EventSink>>,
    routes: Vec<(String, String)>,
    id_generator: Option<Box<IdGenerator>>,
}

impl AuditServiceBuilder {
    pub fn new(config: ServiceConfig, schemas: SchemaRegistry) -> Self {
        Self {
            config,
            schemas,
            sinks: Vec::new(),
            routes: Vec::new(),
            id_generator: None,
        }
    }

    pub fn register_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Routes one topic to a registered sink.
    pub fn route_topic(mut self, topic: impl Into<String>, sink_name: impl Into<String>) -> Self {
        self.routes.push((topic.into(), sink_name.into()));
        self
    }

    /// Routes every registered topic to the named sink.
    pub fn route_all_topics(mut self, sink_name: impl Into<String>) -> Self {
        let sink_name = sink_name.into();
        let topics: Vec<String> = self
            .schemas
            .topics()
            .map(|schema| schema.name().to_owned())
            .collect();
        for topic in topics {
            self.routes.push((topic, sink_name.clone()));
        }
        self
    }

    /// Replaces the default UUID generator, mainly for deterministic tests.
    pub fn id_generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.id_generator = Some(Box::new(generator));
        self
    }

    /// Resolves routes and the query sink; the service starts in
    /// `Starting` and accepts traffic only after `startup`.
    pub fn build(self) -> Result<AuditService, AuditError> {
        let by_name: HashMap<String, Arc<dyn EventSink>> = self
            .sinks
            .iter()
            .map(|sink| (sink.name().to_owned(), sink.clone()))
            .collect();

        let mut routes: HashMap<String, Vec<Arc<dyn EventSink>>> = HashMap::new();
        for (topic, sink_name) in self.routes {
            if !self.schemas.contains(&topic) {
                return Err(AuditError::NotSupported(format!(
                    "cannot route unknown topic '{topic}'"
                )));
            }
            let sink = by_name.get(&sink_name).ok_or_else(|| {
                AuditError::BadRequest(format!(
                    "route for topic '{topic}' names unregistered sink '{sink_name}'"
                ))
            })?;
            routes.entry(topic).or_default().push(sink.clone());
        }

        let query_sink: Arc<dyn EventSink> = match &self.config.handler_for_queries {
            Some(name) => match by_name.get(name) {
                Some(sink) => sink.clone(),
                None => {
                    warn!(sink = %name, "designated query sink is not registered, queries will fail");
                    Arc::new(NullQuerySink)
                }
            },
            None => Arc::new(NullQuerySink),
        };

        Ok(AuditService {
            state: RwLock::new(ServiceState::Starting),
            schemas: self.schemas,
            routes,
            sinks: self.sinks,
            query_sink,
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Box::new(|| Uuid::new_v4().to_string())),
        })
    }
}

/// Validates incoming events, assigns identifiers and fans them out to
/// the sinks registered for their topic.
///
/// The handler maps are immutable after `build`, so request tasks share
/// the service without a global lock; only the tiny state word is guarded.
pub struct AuditService {
    state: RwLock<ServiceState>,
    schemas: SchemaRegistry,
    routes: HashMap<String, Vec<Arc<dyn EventSink>>>,
    sinks: Vec<Arc<dyn EventSink>>,
    query_sink: Arc<dyn EventSink>,
    id_generator: Box<IdGenerator>,
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService")
            .field("state", &self.state())
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditService {
    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    fn ensure_running(&self) -> Result<(), AuditError> {
        let state = *self.state.read();
        if state != ServiceState::Running {
            return Err(AuditError::Unavailable(state.name()));
        }
        Ok(())
    }

    /// Brings every sink up and opens the service for traffic. Individual
    /// sink failures are logged, not rethrown.
    pub async fn startup(&self) -> Result<(), AuditError> {
        {
            let state = *self.state.read();
            if state != ServiceState::Starting {
                return Err(AuditError::Unavailable(state.name()));
            }
        }
        for sink in &self.sinks {
            if let Err(err) = sink.startup().await {
                warn!(sink = sink.name(), error = %err, "sink startup failed");
            }
        }
        *self.state.write() = ServiceState::Running;
        info!(sinks = self.sinks.len(), "audit service running");
        Ok(())
    }

    /// Terminal: closes every sink; the service never restarts.
    pub async fn shutdown(&self) -> Result<(), AuditError> {
        {
            let mut state = self.state.write();
            if *state == ServiceState::Shutdown {
                return Ok(());
            }
            *state = ServiceState::Shutdown;
        }
        for sink in &self.sinks {
            if let Err(err) = sink.shutdown().await {
                warn!(sink = sink.name(), error = %err, "sink shutdown failed");
            }
        }
        info!("audit service shut down");
        Ok(())
    }

    /// Validates and publishes one event to every sink registered for the
    /// topic, joining their results into one receipt.
    #[instrument(skip(self, event))]
    pub async fn create(&self, topic: &str, event: Event) -> Result<PublishReceipt, AuditError> {
        self.ensure_running()?;

        if event.transaction_id().is_none() {
            return Err(AuditError::BadRequest(
                "event content is missing 'transactionId'".to_owned(),
            ));
        }
        if event.timestamp().is_none() {
            return Err(AuditError::BadRequest(
                "event content is missing 'timestamp'".to_owned(),
            ));
        }
        self.schemas.get(topic)?;

        let event = if event.id().is_none() {
            event.with_id((self.id_generator)())
        } else {
            event
        };
        let event_id = event.id().expect("identifier assigned above").to_owned();

        let sinks = self.routes.get(topic).map(Vec::as_slice).unwrap_or(&[]);
        let outcomes = join_all(sinks.iter().map(|sink| {
            let event = &event;
            async move { (sink.name().to_owned(), sink.publish(topic, event).await) }
        }))
        .await;

        let mut delivered = 0;
        let mut failures = Vec::new();
        for (sink, outcome) in outcomes {
            match outcome {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(topic, sink = %sink, error = %error, "sink rejected event");
                    failures.push(SinkFailure { sink, error });
                }
            }
        }

        Ok(PublishReceipt {
            event_id,
            delivered,
            failures,
        })
    }

    /// Delegates to the designated query sink.
    pub async fn read(&self, topic: &str, id: &str) -> Result<Event, AuditError> {
        self.ensure_running()?;
        self.schemas.get(topic)?;
        self.query_sink.read(topic, id).await
    }

    /// Delegates to the designated query sink.
    pub async fn query(
        &self,
        topic: &str,
        filter: &QueryFilter,
        handler: &mut QueryHandler<'_>,
    ) -> Result<QuerySummary, AuditError> {
        self.ensure_running()?;
        self.schemas.get(topic)?;
        self.query_sink.query(topic, filter, handler).await
    }

    /// Entry point for callers speaking in request verbs. The mutation
    /// verbs the service never supports fail `NotSupported`, unrecognized
    /// verbs `BadRequest`; the rest route to `create`, `read` and `query`.
    pub async fn dispatch(&self, request: Request) -> Result<Response, AuditError> {
        match classify_action(&request.action)? {
            Action::Create => {
                let event = request.event.ok_or_else(|| {
                    AuditError::BadRequest("create requires an event payload".to_owned())
                })?;
                let receipt = self.create(&request.topic, event).await?;
                Ok(Response::Created(receipt))
            }
            Action::Read => {
                let id = request.id.ok_or_else(|| {
                    AuditError::BadRequest("read requires an event identifier".to_owned())
                })?;
                let event = self.read(&request.topic, &id).await?;
                Ok(Response::Event(event))
            }
            Action::Query => {
                let mut events = Vec::new();
                let summary = self
                    .query(&request.topic, &request.filter, &mut |event| {
                        events.push(event);
                        QueryFlow::Continue
                    })
                    .await?;
                Ok(Response::Matches { events, summary })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use trail_events::{EventBuilder, QueryFlow, TopicSchema};

    struct StubSink {
        name: &'static str,
        delivered: Mutex<Vec<(String, Event)>>,
        fail_publish: AtomicBool,
        fail_startup: AtomicBool,
        started: AtomicBool,
        stopped: AtomicBool,
    }

    impl StubSink {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                delivered: Mutex::new(Vec::new()),
                fail_publish: AtomicBool::new(false),
                fail_startup: AtomicBool::new(false),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl EventSink for StubSink {
        fn name(&self) -> &str {
            self.name
        }

        async fn startup(&self) -> Result<(), AuditError> {
            if self.fail_startup.load(Ordering::SeqCst) {
                return Err(AuditError::Internal("startup exploded".into()));
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), AuditError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn publish(&self, topic: &str, event: &Event) -> Result<(), AuditError> {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(AuditError::Internal("sink exploded".into()));
            }
            self.delivered.lock().push((topic.to_owned(), event.clone()));
            Ok(())
        }

        async fn read(&self, _topic: &str, id: &str) -> Result<Event, AuditError> {
            self.delivered
                .lock()
                .iter()
                .map(|(_, event)| event.clone())
                .find(|event| event.id() == Some(id))
                .ok_or_else(|| AuditError::NotFound(id.to_owned()))
        }

        async fn query(
            &self,
            _topic: &str,
            filter: &QueryFilter,
            handler: &mut QueryHandler<'_>,
        ) -> Result<QuerySummary, AuditError> {
            let mut summary = QuerySummary::default();
            for (_, event) in self.delivered.lock().iter() {
                summary.scanned += 1;
                if filter.matches(event) {
                    summary.matched += 1;
                    if handler(event.clone()) == QueryFlow::Stop {
                        summary.stopped_early = true;
                        break;
                    }
                }
            }
            Ok(summary)
        }
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([TopicSchema::core("access"), TopicSchema::core("activity")])
    }

    fn valid_event(id: Option<&str>) -> Event {
        let builder = EventBuilder::new()
            .timestamp("2024-05-01T00:00:00Z")
            .transaction_id("tx-1");
        match id {
            Some(id) => builder.event_id(id).build(),
            None => builder.build(),
        }
    }

    #[tokio::test]
    async fn only_lifecycle_calls_are_legal_outside_running() {
        let sink = StubSink::new("stub");
        let service = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .register_sink(sink.clone())
            .route_topic("access", "stub")
            .build()
            .unwrap();

        let err = service.create("access", valid_event(None)).await.unwrap_err();
        assert!(matches!(err, AuditError::Unavailable("starting")));

        service.startup().await.unwrap();
        assert!(sink.started.load(Ordering::SeqCst));
        service.create("access", valid_event(None)).await.unwrap();

        service.shutdown().await.unwrap();
        assert!(sink.stopped.load(Ordering::SeqCst));
        let err = service.create("access", valid_event(None)).await.unwrap_err();
        assert!(matches!(err, AuditError::Unavailable("shut down")));

        // shutdown is terminal; startup cannot revive the service
        let err = service.startup().await.unwrap_err();
        assert!(matches!(err, AuditError::Unavailable(_)));
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn create_validates_mandatory_fields_and_topic() {
        let service = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .register_sink(StubSink::new("stub"))
            .route_topic("access", "stub")
            .build()
            .unwrap();
        service.startup().await.unwrap();

        let missing_tx = EventBuilder::new().timestamp("t").build();
        let err = service.create("access", missing_tx).await.unwrap_err();
        assert!(matches!(err, AuditError::BadRequest(_)));

        let missing_ts = EventBuilder::new().transaction_id("tx").build();
        let err = service.create("access", missing_ts).await.unwrap_err();
        assert!(matches!(err, AuditError::BadRequest(_)));

        let err = service
            .create("recon", valid_event(None))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::NotSupported(_)));
    }

    #[tokio::test]
    async fn identifiers_are_generated_when_absent_and_honored_when_present() {
        let sink = StubSink::new("stub");
        let service = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .register_sink(sink.clone())
            .route_topic("access", "stub")
            .id_generator(|| "generated-1".to_owned())
            .build()
            .unwrap();
        service.startup().await.unwrap();

        let receipt = service.create("access", valid_event(None)).await.unwrap();
        assert_eq!(receipt.event_id, "generated-1");

        let receipt = service
            .create("access", valid_event(Some("caller-7")))
            .await
            .unwrap();
        assert_eq!(receipt.event_id, "caller-7");

        let delivered = sink.delivered.lock();
        assert_eq!(delivered[0].1.id(), Some("generated-1"));
        assert_eq!(delivered[1].1.id(), Some("caller-7"));
    }

    #[tokio::test]
    async fn fan_out_reaches_every_sink_and_aggregates_failures() {
        let healthy = StubSink::new("healthy");
        let broken = StubSink::new("broken");
        broken.fail_publish.store(true, Ordering::SeqCst);

        let service = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .register_sink(healthy.clone())
            .register_sink(broken.clone())
            .route_topic("access", "healthy")
            .route_topic("access", "broken")
            .build()
            .unwrap();
        service.startup().await.unwrap();

        let receipt = service.create("access", valid_event(None)).await.unwrap();
        assert_eq!(receipt.delivered, 1);
        assert_eq!(receipt.failures.len(), 1);
        assert_eq!(receipt.failures[0].sink, "broken");
        assert!(!receipt.fully_delivered());
        assert_eq!(healthy.delivered.lock().len(), 1, "failure never aborts fan-out");
    }

    #[tokio::test]
    async fn routes_are_per_topic() {
        let access_sink = StubSink::new("access-sink");
        let activity_sink = StubSink::new("activity-sink");
        let service = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .register_sink(access_sink.clone())
            .register_sink(activity_sink.clone())
            .route_topic("access", "access-sink")
            .route_topic("activity", "activity-sink")
            .build()
            .unwrap();
        service.startup().await.unwrap();

        service.create("access", valid_event(None)).await.unwrap();
        assert_eq!(access_sink.delivered.lock().len(), 1);
        assert!(activity_sink.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn reads_delegate_to_the_designated_query_sink() {
        let sink = StubSink::new("stub");
        let config = ServiceConfig {
            handler_for_queries: Some("stub".to_owned()),
        };
        let service = AuditServiceBuilder::new(config, registry())
            .register_sink(sink.clone())
            .route_topic("access", "stub")
            .build()
            .unwrap();
        service.startup().await.unwrap();

        let receipt = service.create("access", valid_event(None)).await.unwrap();
        let event = service.read("access", &receipt.event_id).await.unwrap();
        assert_eq!(event.transaction_id(), Some("tx-1"));

        let mut count = 0usize;
        let summary = service
            .query("access", &QueryFilter::new(), &mut |_| {
                count += 1;
                QueryFlow::Continue
            })
            .await
            .unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn missing_query_designation_substitutes_the_null_sink() {
        let service = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .register_sink(StubSink::new("stub"))
            .route_topic("access", "stub")
            .build()
            .unwrap();
        service.startup().await.unwrap();

        let err = service.read("access", "any").await.unwrap_err();
        assert!(matches!(err, AuditError::NotSupported(_)));
        assert!(err.to_string().contains("handler_for_queries"));
    }

    #[tokio::test]
    async fn unregistered_query_designee_also_falls_back_to_null() {
        let config = ServiceConfig {
            handler_for_queries: Some("missing".to_owned()),
        };
        let service = AuditServiceBuilder::new(config, registry())
            .register_sink(StubSink::new("stub"))
            .route_topic("access", "stub")
            .build()
            .unwrap();
        service.startup().await.unwrap();

        let err = service.read("access", "any").await.unwrap_err();
        assert!(matches!(err, AuditError::NotSupported(_)));
    }

    #[tokio::test]
    async fn sink_startup_failures_are_logged_not_rethrown() {
        let flaky = StubSink::new("flaky");
        flaky.fail_startup.store(true, Ordering::SeqCst);
        let healthy = StubSink::new("healthy");

        let service = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .register_sink(flaky)
            .register_sink(healthy.clone())
            .route_topic("access", "healthy")
            .build()
            .unwrap();

        service.startup().await.unwrap();
        assert_eq!(service.state(), ServiceState::Running);
        service.create("access", valid_event(None)).await.unwrap();
        assert_eq!(healthy.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_routes_verbs_and_rejects_mutations() {
        let sink = StubSink::new("stub");
        let config = ServiceConfig {
            handler_for_queries: Some("stub".to_owned()),
        };
        let service = AuditServiceBuilder::new(config, registry())
            .register_sink(sink.clone())
            .route_topic("access", "stub")
            .build()
            .unwrap();
        service.startup().await.unwrap();

        let response = service
            .dispatch(Request::create("access", valid_event(Some("d-1"))))
            .await
            .unwrap();
        let Response::Created(receipt) = response else {
            panic!("create must answer with a receipt");
        };
        assert_eq!(receipt.event_id, "d-1");

        let response = service
            .dispatch(Request::read("access", "d-1"))
            .await
            .unwrap();
        let Response::Event(event) = response else {
            panic!("read must answer with the event");
        };
        assert_eq!(event.id(), Some("d-1"));

        let response = service
            .dispatch(Request::query("access", QueryFilter::new()))
            .await
            .unwrap();
        let Response::Matches { events, summary } = response else {
            panic!("query must answer with the matches");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(summary.matched, 1);

        for verb in ["update", "delete", "patch"] {
            let mut request = Request::read("access", "d-1");
            request.action = verb.to_owned();
            let err = service.dispatch(request).await.unwrap_err();
            assert!(matches!(err, AuditError::NotSupported(_)));
        }

        let mut request = Request::read("access", "d-1");
        request.action = "frobnicate".to_owned();
        let err = service.dispatch(request).await.unwrap_err();
        assert!(matches!(err, AuditError::BadRequest(_)));

        let mut request = Request::query("access", QueryFilter::new());
        request.action = "create".to_owned();
        let err = service.dispatch(request).await.unwrap_err();
        assert!(matches!(err, AuditError::BadRequest(_)), "create without a payload");
    }

    #[test]
    fn action_verbs_classify_per_the_contract() {
        assert_eq!(classify_action("create").unwrap(), Action::Create);
        assert_eq!(classify_action("read").unwrap(), Action::Read);
        assert_eq!(classify_action("query").unwrap(), Action::Query);

        for verb in ["update", "delete", "patch"] {
            assert!(matches!(
                classify_action(verb).unwrap_err(),
                AuditError::NotSupported(_)
            ));
        }
        assert!(matches!(
            classify_action("frobnicate").unwrap_err(),
            AuditError::BadRequest(_)
        ));
    }

    #[test]
    fn builder_rejects_bad_routes() {
        let err = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .register_sink(StubSink::new("stub"))
            .route_topic("unknown-topic", "stub")
            .build()
            .unwrap_err();
        assert!(matches!(err, AuditError::NotSupported(_)));

        let err = AuditServiceBuilder::new(ServiceConfig::default(), registry())
            .route_topic("access", "ghost")
            .build()
            .unwrap_err();
        assert!(matches!(err, AuditError::BadRequest(_)));
    }
}
