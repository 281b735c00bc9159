//! # Demo: two flows, one shared receiver, a logging subscriber.
//!
//! - `clicks` pulls JSON lines from an in-memory generator and decodes them
//!   with the `json` decoder, selected by content type.
//! - `raw-lines` pulls plain text and keeps each line as a string event.
//! - Every third JSON line is malformed to show per-item recovery.
//!
//! Runs until Ctrl-C or for five seconds, whichever comes first.
//!
//! ```text
//! RUST_LOG=info cargo run --example demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use flowvisor::{
    ChannelReceiver, ConfigProperties, Context, DecodeError, DecoderFn, DecoderRef,
    DecoderRegistry, Engine, Event, FlowDefinition, IngestError, LifecycleEvent, LifecycleKind,
    Pull, PullFn, RawEvent, ReceiverDirectory, SOURCE_KIND_KEY, SourceRegistry, Subscribe,
};

/// Logs the lifecycle events worth a human's attention.
struct LifecycleLog;

#[async_trait]
impl Subscribe for LifecycleLog {
    async fn on_event(&self, ev: &LifecycleEvent) {
        match ev.kind {
            LifecycleKind::StatsReported => {
                tracing::info!(total = ev.count.unwrap_or(0), "stats reported");
            }
            LifecycleKind::DecodeFailed | LifecycleKind::BatchDropped => {
                tracing::debug!(kind = ?ev.kind, flow = ?ev.flow, reason = ?ev.reason, "data path");
            }
            kind => tracing::info!(?kind, flow = ?ev.flow, "lifecycle"),
        }
    }

    fn name(&self) -> &'static str {
        "lifecycle-log"
    }
}

fn json_decoder() -> DecoderRef {
    let decoder = DecoderFn::new(|raw: &RawEvent| {
        let value = match raw {
            RawEvent::Value(v) => v.clone(),
            other => serde_json::from_str(&other.as_text()?)
                .map_err(|e| DecodeError::Invalid(e.to_string()))?,
        };
        match value {
            Value::Object(map) => Ok(vec![Event::from_map(map)]),
            Value::Array(items) => Ok(vec![Event::from_array(items)]),
            _ => Err(DecodeError::Invalid("expected an object or array".into())),
        }
    })
    .with_content_types(["application/json"]);
    Arc::new(decoder)
}

fn line_decoder() -> DecoderRef {
    DecoderFn::arc(|raw: &RawEvent| {
        Ok(raw
            .as_text()?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(Event::from_string)
            .collect())
    })
}

/// Endless JSON lines; every third one is malformed.
fn click_source() -> Box<dyn Pull> {
    let mut n = 0_u64;
    PullFn::boxed(move || {
        n += 1;
        let batch: Vec<RawEvent> = (0..4)
            .map(|i| {
                let id = n * 4 + i;
                if id % 3 == 0 {
                    RawEvent::from(format!("{{\"user\": {id}, broken"))
                } else {
                    RawEvent::from(json!({ "user": id, "page": "/home" }).to_string())
                }
            })
            .collect();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, IngestError>(batch)
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (sink, mut rx) = ChannelReceiver::arc("events", 1024);
    let receivers = ReceiverDirectory::new().with(sink);
    let global = ConfigProperties::new()
        .with("consumer_threads", 2)
        .with("stats_interval_secs", 2);
    let ctx = Context::new(global, receivers);

    let mut decoders = DecoderRegistry::new();
    decoders
        .register("json", |_props| Ok(json_decoder()))
        .register("lines", |_props| Ok(line_decoder()));

    let sources = SourceRegistry::new("clicks")
        .with("clicks", |_flow| Ok(click_source()))
        .with("lines", |_flow| {
            let mut served = false;
            Ok(PullFn::boxed(move || {
                let batch = if served {
                    Vec::new()
                } else {
                    served = true;
                    vec![RawEvent::from("alpha\nbeta\n\ngamma")]
                };
                async move { Ok::<_, IngestError>(batch) }
            }))
        });

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LifecycleLog)];
    let engine = Engine::builder("demo", &ctx)
        .with_sources(sources)
        .with_subscribers(subs)
        .build();

    let clicks = FlowDefinition::new("clicks", "demo", "application/json", "events");
    engine.add_flow(clicks.resolve(&ctx, &decoders)?).await?;

    let mut props = Map::new();
    props.insert(SOURCE_KIND_KEY.into(), Value::from("lines"));
    let lines = FlowDefinition::new("raw-lines", "demo", "lines", "events")
        .with_properties(ConfigProperties::from_map(props));
    engine.add_flow(lines.resolve(&ctx, &decoders)?).await?;

    tracing::info!(flows = ?engine.flow_names().await, "flows registered");

    let consumer = tokio::spawn(async move {
        let mut seen = 0_u64;
        while let Some(event) = rx.recv().await {
            seen += 1;
            if seen % 500 == 1 {
                tracing::info!(%event, seen, "sample event");
            }
        }
        seen
    });

    tokio::select! {
        _ = engine.run_until_signal() => {}
        _ = tokio::time::sleep(Duration::from_secs(5)) => engine.shutdown().await,
    }

    let stats = engine.stats();
    tracing::info!(per_shard = ?stats.per_shard, total = stats.total(), "final counters");
    consumer.abort();
    Ok(())
}
