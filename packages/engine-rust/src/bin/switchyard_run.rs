//! Runs one message through a routes file and reports what happened.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use switchyard_core::{Destination, ErrorKind, Exchange};
use switchyard_engine::logging::{self, LogFormat};
use switchyard_engine::{LogDestination, MockDestination, RouteContext};

#[derive(Parser)]
#[command(
    name = "switchyard-run",
    version,
    about = "Send a message through a Switchyard routes file"
)]
struct Cli {
    /// Path to the routes JSON file
    routes: PathBuf,

    /// Source URI to send the message to
    #[arg(long, default_value = "direct:start")]
    source: String,

    /// Message body
    #[arg(long, default_value = "")]
    body: String,

    /// Message header as NAME=VALUE (repeatable)
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Register a recording mock destination (repeatable)
    #[arg(long = "mock")]
    mocks: Vec<String>,

    /// Register a mock destination that always fails (repeatable)
    #[arg(long = "failing-mock")]
    failing_mocks: Vec<String>,

    /// Register a logging destination (repeatable)
    #[arg(long = "log")]
    logs: Vec<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "SWITCHYARD_LOG_LEVEL")]
    log_level: String,

    /// Log output format (text, json)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format)?;

    let (context, definitions) = RouteContext::from_routes_file(&cli.routes)
        .with_context(|| format!("loading {}", cli.routes.display()))?;

    let mut mocks = Vec::new();
    for uri in &cli.mocks {
        let mock = Arc::new(MockDestination::new(uri.clone()));
        context.destinations().register(mock.clone());
        mocks.push(mock);
    }
    for uri in &cli.failing_mocks {
        let mock = Arc::new(
            MockDestination::new(uri.clone()).failing(ErrorKind::Destination, "forced failure"),
        );
        context.destinations().register(mock.clone());
        mocks.push(mock);
    }
    for uri in &cli.logs {
        context
            .destinations()
            .register(Arc::new(LogDestination::new(uri.clone())));
    }

    for definition in definitions {
        context.define_route(definition)?;
    }
    context.start().await?;

    let exchange = cli
        .headers
        .iter()
        .fold(Exchange::new(cli.body.as_str()), |exchange, (name, value)| {
            exchange.with_header(name.as_str(), value.as_str())
        });

    let result = context.send(&cli.source, exchange).await;
    match &result {
        Ok(exchange) => println!(
            "completed: body={} handled={}",
            exchange.body(),
            exchange.is_handled()
        ),
        Err(err) => println!("failed: {err}"),
    }
    for mock in &mocks {
        let bodies: Vec<String> = mock
            .received_bodies()
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("{}: [{}]", mock.uri(), bodies.join(", "));
    }

    context.stop().await?;
    result.map(|_| ()).map_err(Into::into)
}
