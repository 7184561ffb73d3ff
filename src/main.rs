use clap::Parser;
use redis_enterprise_telemetry::config::Args;
use redis_enterprise_telemetry::cycle::{self, Cycle};
use redis_enterprise_telemetry::telemetry::{JsonPublisher, Publisher};
use tracing_subscriber::EnvFilter;

async fn run(args: &Args) -> anyhow::Result<()> {
    let client = args.client()?;

    match cycle::run(&client, &args.options()).await? {
        Cycle::Skipped => Ok(()),
        Cycle::Collected(integration) => {
            let publisher = JsonPublisher::stdout();
            let mut publisher = if args.pretty {
                publisher.pretty()
            } else {
                publisher
            };
            publisher.publish(&integration)?;
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    // stdout carries the payload
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Collection failed: {:#}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
