use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing_subscriber::EnvFilter;

use sage_gateway::{
    Config, Directive, DirectiveExtractor, Dispatcher, HomeAssistantClient, InterceptionNode,
    Sanitizer, parse_params,
};

/// Sage - Directive interception and smart-home dispatch for voice assistants
#[derive(Parser)]
#[command(name = "sage", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one turn: read model output from stdin, dispatch directives, print speech
    Intercept,
    /// Show what would be extracted from stdin without calling the backend
    Parse,
    /// Print the effective capability table
    Capabilities,
    /// Call one service directly
    Call {
        /// Service in `domain.service` form (e.g. "light.turn_on")
        service: String,
        /// Entity to act on (e.g. "light.kitchen")
        #[arg(short, long)]
        target: Option<String>,
        /// Extra service data as `key=value`
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,sage_gateway=info",
        1 => "info,sage_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Intercept => intercept(&config).await,
        Command::Parse => parse(&config).await,
        Command::Capabilities => {
            print_capabilities(&config);
            Ok(())
        }
        Command::Call {
            service,
            target,
            params,
        } => call(&config, &service, target.as_deref(), &params).await,
    }
}

/// Feed stdin through the interception node, one line per chunk
async fn intercept(config: &Config) -> anyhow::Result<()> {
    let client = HomeAssistantClient::new(&config.home_assistant)?;
    let node = InterceptionNode::new(Arc::clone(&config.capabilities), Arc::new(client))?;

    let lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let chunks = lines.map_while(|line| match line {
        Ok(line) => Some(line + "\n"),
        Err(e) => {
            tracing::warn!(error = %e, "stopped reading stdin");
            None
        }
    });

    let outcome = node.drain(chunks).await;

    if let Some(speech) = &outcome.speech {
        println!("{speech}");
    }

    // The node never waits on service calls; the process must, or they die with it
    for task in outcome.tasks {
        task.await.ok();
    }

    Ok(())
}

/// Dry run: extract, authorize and sanitize without side effects
async fn parse(config: &Config) -> anyhow::Result<()> {
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;

    let extractor = DirectiveExtractor::new(Arc::clone(&config.capabilities));
    let sanitizer = Sanitizer::new(&config.capabilities)?;

    let directives: Vec<serde_json::Value> = extractor
        .extract(&text)
        .into_iter()
        .map(|d| -> serde_json::Result<serde_json::Value> {
            let authorized = config.capabilities.is_allowed(&d.domain, &d.service);
            let mut value = serde_json::to_value(&d)?;
            value["authorized"] = serde_json::Value::Bool(authorized);
            Ok(value)
        })
        .collect::<serde_json::Result<_>>()?;

    let report = serde_json::json!({
        "directives": directives,
        "speech": sanitizer.sanitize(&text),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn print_capabilities(config: &Config) {
    let table = config.capabilities.table();

    for (domain, services) in &table {
        println!("{domain}: {}", services.join(", "));
    }

    let recognized: Vec<_> = config
        .capabilities
        .known_domains()
        .filter(|d| !table.contains_key(d))
        .collect();
    if !recognized.is_empty() {
        println!("\nrecognized, not dispatchable: {}", recognized.join(", "));
    }
}

/// Dispatch one directive and wait for the backend
async fn call(
    config: &Config,
    service: &str,
    target: Option<&str>,
    params: &[String],
) -> anyhow::Result<()> {
    let (domain, service) = Directive::split_service(service)?;
    let directive = Directive::new(domain, service, target, parse_params(&params.join("|")))?;

    let client = HomeAssistantClient::new(&config.home_assistant)?;
    let dispatcher = Dispatcher::new(Arc::clone(&config.capabilities), Arc::new(client));

    dispatcher.dispatch(&directive).await?;
    println!("{directive}: ok");

    Ok(())
}
