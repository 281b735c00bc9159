//! # Configuration.
//!
//! Two layers live here:
//!
//! 1. [`ConfigProperties`]: a JSON-object-backed property bag with lenient,
//!    typed accessors and defaults. Flows carry one (their merged config), the
//!    [`Context`](crate::Context) carries the global one.
//! 2. [`EngineConfig`]: the engine's own settings, derived from a
//!    `ConfigProperties` by [`EngineConfig::from_properties`].
//!
//! ## Layering
//! ```text
//! global (context) ──┐
//!                    ├──► merged(global, local) ──► Flow::properties()
//! local  (flow)    ──┘     local wins, null never overrides
//! ```
//!
//! ## Worker-pool default
//! `consumer_threads` falls back to a process-wide default read once from the
//! `threads` environment variable (see [`system_threads`]).

use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key for the number of shard workers.
pub const CONSUMER_THREADS_KEY: &str = "consumer_threads";
/// Key for the per-shard queue capacity (in batches).
pub const QUEUE_CAPACITY_KEY: &str = "queue_capacity";
/// Key for the stats reporting period (seconds).
pub const STATS_INTERVAL_KEY: &str = "stats_interval_secs";
/// Key for the idle sleep of a pull loop that got an empty batch (milliseconds).
pub const IDLE_BACKOFF_KEY: &str = "idle_backoff_ms";
/// Key for the bounded wait when stopping one source (milliseconds).
pub const SOURCE_STOP_TIMEOUT_KEY: &str = "source_stop_timeout_ms";
/// Key for the bounded wait when terminating the worker pool (milliseconds).
pub const POOL_SHUTDOWN_TIMEOUT_KEY: &str = "pool_shutdown_timeout_ms";
/// Key for the lifecycle bus capacity.
pub const BUS_CAPACITY_KEY: &str = "bus_capacity";

/// Environment variable overriding the default worker count.
pub const THREADS_ENV: &str = "threads";
/// Worker count used when the environment says nothing usable.
pub const DEFAULT_THREADS: usize = 4;

/// Property bag with typed accessors.
///
/// Accessors are lenient the way hand-written config files need them to be:
/// `"8"` is a fine integer, `"TRUE"` a fine boolean. A present-but-unusable
/// value yields the default.
///
/// ## Example
/// ```rust
/// use flowvisor::ConfigProperties;
/// use serde_json::json;
///
/// let cfg = ConfigProperties::from_value(json!({
///     "consumer_threads": "8",
///     "verbose": true,
///     "kafka": { "topic": "clicks" }
/// })).unwrap();
///
/// assert_eq!(cfg.get_i32("consumer_threads", 4), 8);
/// assert!(cfg.get_bool("verbose", false));
/// assert_eq!(cfg.get_config("kafka").unwrap().get_str("topic").as_deref(), Some("clicks"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigProperties {
    values: Map<String, Value>,
}

impl ConfigProperties {
    /// Creates an empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing JSON object.
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Wraps a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(values) => Some(Self { values }),
            _ => None,
        }
    }

    /// Sets a property, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a property, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns true if the key is present (even if null).
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Boolean accessor. Strings count as `true` only when they spell it.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            Some(_) => false,
        }
    }

    /// 32-bit integer accessor.
    pub fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.values
            .get(key)
            .and_then(as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(default)
    }

    /// 64-bit integer accessor.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.values.get(key).and_then(as_i64).unwrap_or(default)
    }

    /// Floating-point accessor.
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// String accessor with default. Non-string scalars are rendered as text.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_str(key).unwrap_or_else(|| default.to_string())
    }

    /// String accessor; `None` when missing or null.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Array accessor; empty when missing or not an array.
    pub fn get_array(&self, key: &str) -> &[Value] {
        match self.values.get(key) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Nested config accessor; `None` when missing or not an object.
    pub fn get_config(&self, key: &str) -> Option<ConfigProperties> {
        match self.values.get(key) {
            Some(Value::Object(map)) => Some(Self::from_map(map.clone())),
            _ => None,
        }
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Number of top-level properties.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if there are no properties.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Layers `local` over `self`. Local wins; a local `null` never hides a global value.
    pub fn merged(&self, local: &ConfigProperties) -> ConfigProperties {
        let mut values = self.values.clone();
        for (key, value) in &local.values {
            if value.is_null() && values.contains_key(key) {
                continue;
            }
            values.insert(key.clone(), value.clone());
        }
        Self { values }
    }

    /// Layers configs left to right: later ones override earlier ones.
    pub fn nest<'a>(layers: impl IntoIterator<Item = &'a ConfigProperties>) -> ConfigProperties {
        layers
            .into_iter()
            .fold(ConfigProperties::new(), |acc, layer| acc.merged(layer))
    }
}

impl From<Map<String, Value>> for ConfigProperties {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses the `threads` override: unparseable → [`DEFAULT_THREADS`], below 1 → 1.
pub fn parse_thread_override(raw: Option<&str>) -> usize {
    let n = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_THREADS as i64);
    usize::try_from(n.max(1)).unwrap_or(DEFAULT_THREADS)
}

/// Process-wide default worker count, read once from the environment.
pub fn system_threads() -> usize {
    static THREADS: OnceLock<usize> = OnceLock::new();
    *THREADS.get_or_init(|| parse_thread_override(std::env::var(THREADS_ENV).ok().as_deref()))
}

/// Engine settings.
///
/// ## Field semantics
/// - `consumer_threads`: number of shards (one worker + one queue each), min 1
/// - `queue_capacity`: batches buffered per shard before offers are dropped, min 1
/// - `stats_interval`: period of the throughput report
/// - `idle_backoff`: sleep of a pull loop after an empty batch
/// - `source_stop_timeout`: bounded wait for one source to stop before aborting it
/// - `pool_shutdown_timeout`: bounded wait for the worker pool before aborting it
/// - `bus_capacity`: lifecycle bus ring buffer size, min 1
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Number of shard workers.
    pub consumer_threads: usize,
    /// Per-shard queue capacity, in batches.
    pub queue_capacity: usize,
    /// Throughput report period.
    pub stats_interval: Duration,
    /// Pull-loop sleep after an empty batch.
    pub idle_backoff: Duration,
    /// Bounded wait when stopping a single source.
    pub source_stop_timeout: Duration,
    /// Bounded wait when terminating the worker pool.
    pub pool_shutdown_timeout: Duration,
    /// Lifecycle bus capacity.
    pub bus_capacity: usize,
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - `consumer_threads = system_threads()` (env `threads`, else 4)
    /// - `queue_capacity = 4096`
    /// - `stats_interval = 60s`
    /// - `idle_backoff = 100ms`
    /// - `source_stop_timeout = 5s`
    /// - `pool_shutdown_timeout = 10s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            consumer_threads: system_threads(),
            queue_capacity: 4096,
            stats_interval: Duration::from_secs(60),
            idle_backoff: Duration::from_millis(100),
            source_stop_timeout: Duration::from_secs(5),
            pool_shutdown_timeout: Duration::from_secs(10),
            bus_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Reads engine settings from properties, falling back to [`EngineConfig::default`].
    pub fn from_properties(props: &ConfigProperties) -> Self {
        let d = Self::default();
        let count = |key: &str, default: usize| -> usize {
            let n = props.get_i64(key, default as i64);
            usize::try_from(n.max(1)).unwrap_or(default)
        };
        let millis = |key: &str, default: Duration| -> Duration {
            let n = props.get_i64(key, default.as_millis() as i64);
            Duration::from_millis(u64::try_from(n).unwrap_or(0))
        };
        let secs = props.get_i64(STATS_INTERVAL_KEY, d.stats_interval.as_secs() as i64);

        Self {
            consumer_threads: count(CONSUMER_THREADS_KEY, d.consumer_threads),
            queue_capacity: count(QUEUE_CAPACITY_KEY, d.queue_capacity),
            stats_interval: Duration::from_secs(u64::try_from(secs.max(1)).unwrap_or(60)),
            idle_backoff: millis(IDLE_BACKOFF_KEY, d.idle_backoff),
            source_stop_timeout: millis(SOURCE_STOP_TIMEOUT_KEY, d.source_stop_timeout),
            pool_shutdown_timeout: millis(POOL_SHUTDOWN_TIMEOUT_KEY, d.pool_shutdown_timeout),
            bus_capacity: count(BUS_CAPACITY_KEY, d.bus_capacity),
        }
    }

    /// Shard count clamped to a minimum of 1.
    #[inline]
    pub fn shards(&self) -> usize {
        self.consumer_threads.max(1)
    }

    /// Queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
