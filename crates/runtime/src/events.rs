//! Structured client events with hierarchical propagation.
//!
//! Every command emits structured lifecycle events (`commandStarted`,
//! `commandSucceeded`, ...). Events fire on the originating entity's
//! [`EventContext`], then propagate to the parent context, up to the client
//! root, unless a listener stops propagation. Independently of listeners,
//! the logging configuration can route each event kind to stdout/stderr in
//! a formatted or verbose form.
//!
//! The listener registry follows the handler-map pattern: insertion-ordered
//! storage with RAII [`Subscription`] handles that unregister on drop.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use astra_protocol::response::ErrorDescriptor;

use crate::error::InvalidOptionsError;
use crate::timeouts::TimeoutDefaults;

/// The nine event kinds the client emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEventKind {
    CommandStarted,
    CommandSucceeded,
    CommandFailed,
    CommandWarnings,
    AdminCommandStarted,
    AdminCommandPolling,
    AdminCommandSucceeded,
    AdminCommandFailed,
    AdminCommandWarnings,
}

impl ClientEventKind {
    /// All kinds, for `events: 'all'` expansion.
    pub const ALL: [ClientEventKind; 9] = [
        ClientEventKind::CommandStarted,
        ClientEventKind::CommandSucceeded,
        ClientEventKind::CommandFailed,
        ClientEventKind::CommandWarnings,
        ClientEventKind::AdminCommandStarted,
        ClientEventKind::AdminCommandPolling,
        ClientEventKind::AdminCommandSucceeded,
        ClientEventKind::AdminCommandFailed,
        ClientEventKind::AdminCommandWarnings,
    ];

    /// The camelCase wire/config name.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEventKind::CommandStarted => "commandStarted",
            ClientEventKind::CommandSucceeded => "commandSucceeded",
            ClientEventKind::CommandFailed => "commandFailed",
            ClientEventKind::CommandWarnings => "commandWarnings",
            ClientEventKind::AdminCommandStarted => "adminCommandStarted",
            ClientEventKind::AdminCommandPolling => "adminCommandPolling",
            ClientEventKind::AdminCommandSucceeded => "adminCommandSucceeded",
            ClientEventKind::AdminCommandFailed => "adminCommandFailed",
            ClientEventKind::AdminCommandWarnings => "adminCommandWarnings",
        }
    }

    /// The PascalCase display name used by the default formatter.
    pub fn display_name(&self) -> &'static str {
        match self {
            ClientEventKind::CommandStarted => "CommandStarted",
            ClientEventKind::CommandSucceeded => "CommandSucceeded",
            ClientEventKind::CommandFailed => "CommandFailed",
            ClientEventKind::CommandWarnings => "CommandWarnings",
            ClientEventKind::AdminCommandStarted => "AdminCommandStarted",
            ClientEventKind::AdminCommandPolling => "AdminCommandPolling",
            ClientEventKind::AdminCommandSucceeded => "AdminCommandSucceeded",
            ClientEventKind::AdminCommandFailed => "AdminCommandFailed",
            ClientEventKind::AdminCommandWarnings => "AdminCommandWarnings",
        }
    }

    /// Parses a config name; rejects unknown members.
    pub fn parse(name: &str) -> Option<ClientEventKind> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// What kind of entity an event originated from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventTarget {
    Collection,
    Table,
    Keyspace,
    Database,
    /// Client-level events with no narrower target.
    #[default]
    #[serde(rename = "")]
    None,
}

impl fmt::Display for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventTarget::Collection => "collection",
            EventTarget::Table => "table",
            EventTarget::Keyspace => "keyspace",
            EventTarget::Database => "database",
            EventTarget::None => "",
        };
        f.write_str(s)
    }
}

/// One structured client event.
///
/// All kinds share the identity fields; the optional tail fields are
/// populated per kind (`duration_ms` on terminal events, `elapsed_ms` /
/// `interval_ms` on polling events, and so on).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEvent {
    /// Which lifecycle point this event marks.
    pub kind: ClientEventKind,
    /// Unique id shared by all events of one method call.
    pub request_id: String,
    /// The command name (e.g. `insertOne`, `createDatabase`).
    pub name: String,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// The originating entity kind.
    pub target: EventTarget,
    /// Keyspace the command ran against, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<String>,
    /// Collection/table name the command ran against, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Request URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The effective timeouts for the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutDefaults>,
    /// Wall-clock duration of the completed command, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Rendered error message on failure events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Warnings attached to the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<ErrorDescriptor>>,
    /// The serialized command envelope (started events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Value>,
    /// Time since the long-running command started (polling events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Configured polling interval (polling events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

impl ClientEvent {
    /// Creates an event with the identity fields set and all tails empty.
    pub fn new(kind: ClientEventKind, request_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            request_id: request_id.into(),
            name: name.into(),
            timestamp: Utc::now(),
            target: EventTarget::None,
            keyspace: None,
            source: None,
            url: None,
            timeouts: None,
            duration_ms: None,
            error: None,
            warnings: None,
            command: None,
            elapsed_ms: None,
            interval_ms: None,
        }
    }
}

/// Where an event kind's occurrences go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventOutput {
    /// Deliver to registered listeners (with propagation).
    Event,
    /// Print a formatted line to stdout.
    Stdout,
    /// Print a formatted line to stderr.
    Stderr,
    /// Print the full event JSON to stdout.
    StdoutVerbose,
    /// Print the full event JSON to stderr.
    StderrVerbose,
}

impl EventOutput {
    /// Parses a config string; rejects unknown members.
    pub fn parse(s: &str) -> Option<EventOutput> {
        match s {
            "event" => Some(EventOutput::Event),
            "stdout" => Some(EventOutput::Stdout),
            "stderr" => Some(EventOutput::Stderr),
            "stdout:verbose" => Some(EventOutput::StdoutVerbose),
            "stderr:verbose" => Some(EventOutput::StderrVerbose),
            _ => None,
        }
    }

    fn is_stdout(&self) -> bool {
        matches!(self, EventOutput::Stdout | EventOutput::StdoutVerbose)
    }

    fn is_stderr(&self) -> bool {
        matches!(self, EventOutput::Stderr | EventOutput::StderrVerbose)
    }
}

/// Which event kinds a logging layer applies to.
#[derive(Debug, Clone)]
pub enum EventSelector {
    /// Every kind.
    All,
    /// A single kind.
    One(ClientEventKind),
    /// An explicit list.
    Many(Vec<ClientEventKind>),
    /// Kinds whose camelCase name matches the regex.
    Regex(regex::Regex),
}

impl EventSelector {
    /// True if the selector covers `kind`.
    pub fn matches(&self, kind: ClientEventKind) -> bool {
        match self {
            EventSelector::All => true,
            EventSelector::One(k) => *k == kind,
            EventSelector::Many(ks) => ks.contains(&kind),
            EventSelector::Regex(re) => re.is_match(kind.name()),
        }
    }
}

/// One logging layer: a selector plus the outputs it assigns.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    /// Which kinds this layer configures.
    pub events: EventSelector,
    /// The outputs those kinds route to. Later layers override earlier
    /// layers for the kinds they match.
    pub emits: Vec<EventOutput>,
}

/// Layered logging configuration; the options monoid for the logging domain.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Layers in application order.
    pub layers: Vec<LoggingLayer>,
}

impl LoggingConfig {
    /// The identity element: no layers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends `other`'s layers after this config's (right side wins per
    /// event kind at resolution time).
    pub fn concat(mut self, other: LoggingConfig) -> LoggingConfig {
        self.layers.extend(other.layers);
        self
    }

    /// The default configuration: every kind delivered to listeners only.
    pub fn all_to_events() -> Self {
        Self {
            layers: vec![LoggingLayer {
                events: EventSelector::All,
                emits: vec![EventOutput::Event],
            }],
        }
    }

    /// Adds a layer.
    pub fn layer(mut self, events: EventSelector, emits: Vec<EventOutput>) -> Self {
        self.layers.push(LoggingLayer { events, emits });
        self
    }

    /// Folds the layers into a per-kind output table.
    ///
    /// Routing the same kind to both stdout and stderr is a configuration
    /// error.
    pub fn resolve(&self) -> Result<ResolvedLogging, InvalidOptionsError> {
        let mut outputs: HashMap<ClientEventKind, Vec<EventOutput>> = HashMap::new();

        for layer in &self.layers {
            for kind in ClientEventKind::ALL {
                if layer.events.matches(kind) {
                    let mut emits = layer.emits.clone();
                    emits.dedup();
                    outputs.insert(kind, emits);
                }
            }
        }

        for (kind, emits) in &outputs {
            let stdout = emits.iter().any(EventOutput::is_stdout);
            let stderr = emits.iter().any(EventOutput::is_stderr);
            if stdout && stderr {
                return Err(InvalidOptionsError::new(
                    format!("logging.{}", kind.name()),
                    "cannot route the same event to both stdout and stderr",
                ));
            }
        }

        Ok(ResolvedLogging { outputs })
    }
}

/// The folded per-kind output table.
#[derive(Debug, Clone, Default)]
pub struct ResolvedLogging {
    outputs: HashMap<ClientEventKind, Vec<EventOutput>>,
}

impl ResolvedLogging {
    /// The outputs configured for a kind (empty slice when unconfigured).
    pub fn outputs_for(&self, kind: ClientEventKind) -> &[EventOutput] {
        self.outputs.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Propagation control handed to each listener.
#[derive(Debug, Default)]
pub struct EventPropagation {
    stop: bool,
    stop_immediate: bool,
}

impl EventPropagation {
    /// Prevents outer (parent) contexts from seeing the event.
    pub fn stop_propagation(&mut self) {
        self.stop = true;
    }

    /// Also prevents remaining listeners at the current level.
    pub fn stop_immediate_propagation(&mut self) {
        self.stop = true;
        self.stop_immediate = true;
    }

    /// True once [`stop_propagation`](Self::stop_propagation) was called.
    pub fn propagation_stopped(&self) -> bool {
        self.stop
    }
}

/// Unique identifier for event listeners.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

fn next_handler_id() -> HandlerId {
    NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// A registered event listener.
pub type EventListener = Arc<dyn Fn(&ClientEvent, &mut EventPropagation) + Send + Sync>;

type ListenerMap = Mutex<IndexMap<HandlerId, (ClientEventKind, EventListener)>>;

/// RAII handle that unregisters an event listener on drop.
///
/// Holds only a weak reference to the registry, so dropping after the owning
/// entity is gone is a no-op.
pub struct Subscription {
    id: HandlerId,
    dropper: Option<Arc<dyn Fn(HandlerId) + Send + Sync>>,
}

impl Subscription {
    fn from_listener_map(id: HandlerId, listeners: &Arc<ListenerMap>) -> Self {
        let weak: Weak<ListenerMap> = Arc::downgrade(listeners);
        let dropper = Arc::new(move |id: HandlerId| {
            if let Some(map) = weak.upgrade() {
                map.lock().shift_remove(&id);
            }
        });
        Self {
            id,
            dropper: Some(dropper),
        }
    }

    /// This subscription's listener id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Explicitly unsubscribes. Equivalent to dropping.
    pub fn unsubscribe(mut self) {
        if let Some(dropper) = self.dropper.take() {
            (dropper)(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dropper) = self.dropper.take() {
            (dropper)(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.dropper.is_some())
            .finish()
    }
}

/// Per-entity event hub: listeners, a parent link, and the entity's resolved
/// logging configuration.
pub struct EventContext {
    parent: Option<Arc<EventContext>>,
    listeners: Arc<ListenerMap>,
    logging: ResolvedLogging,
}

impl EventContext {
    /// Creates a root context (the client's).
    pub fn root(logging: ResolvedLogging) -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            listeners: Arc::new(Mutex::new(IndexMap::new())),
            logging,
        })
    }

    /// Creates a child context whose events bubble to `self`.
    pub fn child(self: &Arc<Self>, logging: ResolvedLogging) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(self)),
            listeners: Arc::new(Mutex::new(IndexMap::new())),
            logging,
        })
    }

    /// Registers a listener for one event kind on this entity.
    pub fn on<F>(&self, kind: ClientEventKind, listener: F) -> Subscription
    where
        F: Fn(&ClientEvent, &mut EventPropagation) + Send + Sync + 'static,
    {
        let id = next_handler_id();
        self.listeners
            .lock()
            .insert(id, (kind, Arc::new(listener)));
        Subscription::from_listener_map(id, &self.listeners)
    }

    /// Emits an event originating at this entity.
    ///
    /// The origin's logging configuration decides both console printing and
    /// whether listener delivery happens at all; delivery then walks up the
    /// parent chain in emission order unless stopped.
    pub fn emit(&self, event: ClientEvent) {
        let outputs = self.logging.outputs_for(event.kind);
        if outputs.is_empty() {
            return;
        }

        for output in outputs {
            match output {
                EventOutput::Stdout => println!("{}", format_event(&event)),
                EventOutput::Stderr => eprintln!("{}", format_event(&event)),
                EventOutput::StdoutVerbose => println!("{}", verbose_format(&event)),
                EventOutput::StderrVerbose => eprintln!("{}", verbose_format(&event)),
                EventOutput::Event => {}
            }
        }

        if !outputs.contains(&EventOutput::Event) {
            return;
        }

        let mut propagation = EventPropagation::default();
        let mut level: Option<&EventContext> = Some(self);

        while let Some(ctx) = level {
            // Snapshot so listeners may (un)register without deadlocking.
            let snapshot: Vec<EventListener> = ctx
                .listeners
                .lock()
                .values()
                .filter(|(kind, _)| *kind == event.kind)
                .map(|(_, listener)| Arc::clone(listener))
                .collect();

            for listener in snapshot {
                listener(&event, &mut propagation);
                if propagation.stop_immediate {
                    return;
                }
            }

            if propagation.stop {
                return;
            }
            level = ctx.parent.as_deref();
        }
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("listeners", &self.listeners.lock().len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// A custom event-to-line formatter.
pub type EventFormatter = Arc<dyn Fn(&ClientEvent) -> String + Send + Sync>;

static DEFAULT_FORMATTER: Lazy<RwLock<Option<EventFormatter>>> = Lazy::new(|| RwLock::new(None));

/// Replaces the process-wide default event formatter.
pub fn set_default_event_formatter<F>(formatter: F)
where
    F: Fn(&ClientEvent) -> String + Send + Sync + 'static,
{
    *DEFAULT_FORMATTER.write() = Some(Arc::new(formatter));
}

/// Formats an event with the process formatter, or the built-in one.
pub fn format_event(event: &ClientEvent) -> String {
    if let Some(formatter) = DEFAULT_FORMATTER.read().as_ref() {
        return formatter(event);
    }
    builtin_format(event)
}

fn builtin_format(event: &ClientEvent) -> String {
    let ts = event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    let scope = match (&event.keyspace, &event.source) {
        (Some(ks), Some(src)) => format!("({ks}.{src}) "),
        (Some(ks), None) => format!("({ks}) "),
        (None, Some(src)) => format!("({src}) "),
        (None, None) => String::new(),
    };
    format!(
        "{ts} [{}]: {scope}{}",
        event.kind.display_name(),
        format_body(event)
    )
}

fn format_body(event: &ClientEvent) -> String {
    match event.kind {
        ClientEventKind::CommandStarted | ClientEventKind::AdminCommandStarted => {
            event.name.clone()
        }
        ClientEventKind::CommandSucceeded | ClientEventKind::AdminCommandSucceeded => format!(
            "{} ({}ms)",
            event.name,
            event.duration_ms.unwrap_or_default()
        ),
        ClientEventKind::CommandFailed | ClientEventKind::AdminCommandFailed => format!(
            "{} failed: {} ({}ms)",
            event.name,
            event.error.as_deref().unwrap_or("unknown error"),
            event.duration_ms.unwrap_or_default()
        ),
        ClientEventKind::CommandWarnings | ClientEventKind::AdminCommandWarnings => format!(
            "{}: {} warning(s)",
            event.name,
            event.warnings.as_ref().map(Vec::len).unwrap_or_default()
        ),
        ClientEventKind::AdminCommandPolling => format!(
            "{} (elapsed {}ms, interval {}ms)",
            event.name,
            event.elapsed_ms.unwrap_or_default(),
            event.interval_ms.unwrap_or_default()
        ),
    }
}

fn verbose_format(event: &ClientEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| builtin_format(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(kind: ClientEventKind) -> ClientEvent {
        ClientEvent::new(kind, "req-1", "insertOne")
    }

    fn listeners_only() -> ResolvedLogging {
        LoggingConfig::all_to_events().resolve().unwrap()
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in ClientEventKind::ALL {
            assert_eq!(ClientEventKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(ClientEventKind::parse("commandExploded"), None);
    }

    #[test]
    fn output_parse_rejects_unknown() {
        assert_eq!(EventOutput::parse("stdout:verbose"), Some(EventOutput::StdoutVerbose));
        assert_eq!(EventOutput::parse("printer"), None);
    }

    #[test]
    fn stdout_stderr_conflict_is_rejected() {
        let config = LoggingConfig::empty().layer(
            EventSelector::One(ClientEventKind::CommandFailed),
            vec![EventOutput::Stdout, EventOutput::Stderr],
        );
        let err = config.resolve().unwrap_err();
        assert_eq!(err.path, "logging.commandFailed");
    }

    #[test]
    fn later_layers_override_matched_kinds() {
        let config = LoggingConfig::all_to_events().layer(
            EventSelector::One(ClientEventKind::CommandFailed),
            vec![EventOutput::Stderr],
        );
        let resolved = config.resolve().unwrap();
        assert_eq!(
            resolved.outputs_for(ClientEventKind::CommandFailed),
            &[EventOutput::Stderr]
        );
        assert_eq!(
            resolved.outputs_for(ClientEventKind::CommandStarted),
            &[EventOutput::Event]
        );
    }

    #[test]
    fn regex_selector_matches_admin_kinds() {
        let config = LoggingConfig::empty().layer(
            EventSelector::Regex(regex::Regex::new("^adminCommand").unwrap()),
            vec![EventOutput::Event],
        );
        let resolved = config.resolve().unwrap();
        assert!(!resolved.outputs_for(ClientEventKind::AdminCommandPolling).is_empty());
        assert!(resolved.outputs_for(ClientEventKind::CommandStarted).is_empty());
    }

    #[test]
    fn events_bubble_to_parent_contexts() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let root = EventContext::root(listeners_only());
        let child = root.child(listeners_only());

        let order_child = Arc::clone(&order);
        let _sub_child = child.on(ClientEventKind::CommandStarted, move |_, _| {
            order_child.lock().push("child");
        });
        let order_root = Arc::clone(&order);
        let _sub_root = root.on(ClientEventKind::CommandStarted, move |_, _| {
            order_root.lock().push("root");
        });

        child.emit(event(ClientEventKind::CommandStarted));
        assert_eq!(*order.lock(), vec!["child", "root"]);
    }

    #[test]
    fn stop_propagation_halts_outer_levels_only() {
        let calls = Arc::new(AtomicUsize::new(0));

        let root = EventContext::root(listeners_only());
        let child = root.child(listeners_only());

        let _stopper = child.on(ClientEventKind::CommandFailed, |_, propagation| {
            propagation.stop_propagation();
        });
        let calls_sibling = Arc::clone(&calls);
        let _sibling = child.on(ClientEventKind::CommandFailed, move |_, _| {
            calls_sibling.fetch_add(1, Ordering::SeqCst);
        });
        let calls_root = Arc::clone(&calls);
        let _parent = root.on(ClientEventKind::CommandFailed, move |_, _| {
            calls_root.fetch_add(10, Ordering::SeqCst);
        });

        child.emit(event(ClientEventKind::CommandFailed));
        // The sibling at the same level still ran; the parent did not.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_immediate_propagation_halts_siblings_too() {
        let calls = Arc::new(AtomicUsize::new(0));

        let root = EventContext::root(listeners_only());

        let _stopper = root.on(ClientEventKind::CommandFailed, |_, propagation| {
            propagation.stop_immediate_propagation();
        });
        let calls_sibling = Arc::clone(&calls);
        let _sibling = root.on(ClientEventKind::CommandFailed, move |_, _| {
            calls_sibling.fetch_add(1, Ordering::SeqCst);
        });

        root.emit(event(ClientEventKind::CommandFailed));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listeners_only_fire_for_their_kind() {
        let calls = Arc::new(AtomicUsize::new(0));
        let root = EventContext::root(listeners_only());

        let calls_clone = Arc::clone(&calls);
        let _sub = root.on(ClientEventKind::CommandSucceeded, move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        root.emit(event(ClientEventKind::CommandStarted));
        root.emit(event(ClientEventKind::CommandSucceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_subscription_unregisters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let root = EventContext::root(listeners_only());

        let calls_clone = Arc::clone(&calls);
        let sub = root.on(ClientEventKind::CommandStarted, move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        root.emit(event(ClientEventKind::CommandStarted));
        drop(sub);
        root.emit(event(ClientEventKind::CommandStarted));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unconfigured_kinds_are_not_delivered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = LoggingConfig::empty()
            .layer(
                EventSelector::One(ClientEventKind::CommandStarted),
                vec![EventOutput::Event],
            )
            .resolve()
            .unwrap();
        let root = EventContext::root(config);

        let calls_clone = Arc::clone(&calls);
        let _sub = root.on(ClientEventKind::CommandFailed, move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        root.emit(event(ClientEventKind::CommandFailed));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn builtin_format_includes_scope_and_name() {
        let mut e = event(ClientEventKind::CommandSucceeded);
        e.keyspace = Some("default_keyspace".into());
        e.source = Some("users".into());
        e.duration_ms = Some(42);

        let line = builtin_format(&e);
        assert!(line.contains("[CommandSucceeded]"));
        assert!(line.contains("(default_keyspace.users)"));
        assert!(line.contains("insertOne (42ms)"));
    }
}
