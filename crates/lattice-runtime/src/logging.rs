//! Logging setup for the Lattice runtime.
//!
//! A thin layer over `tracing-subscriber`: [`LoggingBuilder`] composes an
//! env-filter with a single fmt layer. The engine narrates its lifecycle —
//! resolved start order, worker spawn, teardown escalation, RPC anomalies —
//! as events and spans; [`SpanEvents`] decides whether span boundaries are
//! echoed too, which is usually only wanted at `debug` and below.
//!
//! A `RUST_LOG` environment variable always wins over anything configured
//! here, so operators can re-filter a deployed runtime without touching its
//! config.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Which span lifecycle events the output includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpanEvents {
    /// Spans are silent; only events are logged.
    #[default]
    None,
    /// Echo span creation and close — enough to follow start/stop phases
    /// and worker lifetimes without enter/exit noise.
    Lifecycle,
    /// Echo every span event. Verbose; for protocol-level debugging.
    Full,
}

impl SpanEvents {
    fn as_fmt_span(self) -> fmt::format::FmtSpan {
        match self {
            SpanEvents::None => fmt::format::FmtSpan::NONE,
            SpanEvents::Lifecycle => fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE,
            SpanEvents::Full => fmt::format::FmtSpan::FULL,
        }
    }
}

/// Builder for the runtime's tracing subscriber.
///
/// ```rust,ignore
/// use lattice_runtime::logging::{LoggingBuilder, SpanEvents};
///
/// LoggingBuilder::new()
///     .level(tracing::Level::DEBUG)
///     .directive("lattice_rpc=trace")
///     .span_events(SpanEvents::Lifecycle)
///     .init();
/// ```
pub struct LoggingBuilder {
    base: String,
    directives: Vec<String>,
    span_events: SpanEvents,
    show_target: bool,
    #[cfg(feature = "json-log")]
    json: bool,
}

impl LoggingBuilder {
    /// Starts a builder at `info` level with spans silent.
    pub fn new() -> Self {
        Self {
            base: "info".to_string(),
            directives: Vec::new(),
            span_events: SpanEvents::default(),
            show_target: false,
            #[cfg(feature = "json-log")]
            json: false,
        }
    }

    /// Sets the base level for everything not named by a directive.
    pub fn level(mut self, level: tracing::Level) -> Self {
        self.base = level.to_string().to_lowercase();
        self
    }

    /// Adds a per-target directive, e.g. `"lattice_engine=debug"`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Selects which span events are echoed.
    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    /// Includes the emitting module path in each line.
    pub fn show_target(mut self, enabled: bool) -> Self {
        self.show_target = enabled;
        self
    }

    /// Emits JSON lines instead of human-readable output.
    #[cfg(feature = "json-log")]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Builds the filter: `RUST_LOG` when set, the configured base level and
    /// directives otherwise. Directives that fail to parse are skipped.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let mut filter = EnvFilter::new(&self.base);
            for directive in &self.directives {
                if let Ok(parsed) = directive.parse() {
                    filter = filter.add_directive(parsed);
                }
            }
            filter
        })
    }

    /// Installs the subscriber.
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber is already set; use
    /// [`try_init`](Self::try_init) when that is a live possibility.
    pub fn init(self) {
        self.try_init()
            .expect("a global tracing subscriber is already installed");
    }

    /// Installs the subscriber, reporting failure instead of panicking.
    pub fn try_init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = self.filter();

        #[cfg(feature = "json-log")]
        if self.json {
            return tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_span_events(self.span_events.as_fmt_span())
                        .with_target(self.show_target),
                )
                .with(filter)
                .try_init()
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>);
        }

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_span_events(self.span_events.as_fmt_span())
                    .with_target(self.show_target),
            )
            .with(filter)
            .try_init()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}
