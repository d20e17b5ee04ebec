use std::str::FromStr;

use clap::Parser;
use num_bigint::BigInt;
use tokio_stream::StreamExt;
use valuewire_api::registry::MultiShotEvent;
use valuewire_api::{Node, StreamError};
use valuewire_engine::{EngineError, SessionConfig};

#[derive(Parser)]
#[command(name = "valuewire-demo", about = "value-wire protocol demo")]
struct Cli {
    /// Path to a TOML scenario file.
    #[arg(long, default_value = "demo.toml", env = "VALUEWIRE_DEMO_CONFIG")]
    config: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct DemoConfig {
    #[serde(default = "default_scenario")]
    scenario: String,
}

fn default_scenario() -> String {
    "plain".to_string()
}

impl DemoConfig {
    fn load(path: &str) -> Result<Self, EngineError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DemoConfig { scenario: default_scenario() })
            }
            Err(e) => return Err(EngineError::Io(e)),
        };
        toml::from_str(&content).map_err(|e| EngineError::Config(e.to_string()))
    }
}

fn build_root(scenario: &str) -> Node {
    match scenario {
        "promise" => Node::object([(
            "answer",
            Node::tagged(valuewire_type_promise::Promise::fulfilled_with(async { Node::from(42i64) })),
        )]),
        "rejected-promise" => Node::object([(
            "answer",
            Node::tagged(valuewire_type_promise::Promise::rejected_with(async {
                Node::tagged(valuewire_type_error::TaggedError::new("boom", "producer gave up"))
            })),
        )]),
        "async-iter" => Node::object([(
            "items",
            Node::tagged(valuewire_type_async_iter::AsyncIter(Box::pin(async_stream::stream! {
                for i in 0..3i64 {
                    yield MultiShotEvent::Value(Node::from(i));
                }
                yield MultiShotEvent::End;
            }))),
        )]),
        "bigint" => {
            let googol = format!("1{}", "0".repeat(100));
            Node::object([("googol", Node::tagged(BigInt::from_str(&googol).unwrap()))])
        }
        _ => Node::object([("foo", Node::from("bar"))]),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config, "loading scenario configuration");
    let config = match DemoConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load demo configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(scenario = %config.scenario, "running scenario");

    let mut session_config = SessionConfig::new();
    for entry_fn in [
        valuewire_type_promise::entry,
        valuewire_type_bigint::entry,
        valuewire_type_async_iter::entry,
        valuewire_type_error::entry,
    ] {
        session_config = session_config.register(entry_fn());
    }
    session_config = session_config.on_stream_error(|e: StreamError| {
        tracing::warn!(error = %e, "producer-side fault reported to the host");
    });
    let session = session_config.build();

    let root = build_root(&config.scenario);

    let chunks: Vec<String> = match session.stringify(root) {
        Ok(stream) => Box::pin(stream).collect().await,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode the scenario");
            std::process::exit(1);
        }
    };
    let frame = chunks.concat();
    tracing::info!(bytes = frame.len(), "encoded frame");

    let source = tokio_stream::iter(vec![frame]);
    match session.parse(source).await {
        Ok(root) => tracing::info!(?root, "parsed root"),
        Err(e) => tracing::error!(error = %e, "failed to parse the scenario's own output"),
    }
}
