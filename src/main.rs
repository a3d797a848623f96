mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;
use tracing::{info, warn};

use sitekick::config::Config;
use sitekick::hooks::{Hooks, Stage};
use sitekick::host::HostIdentity;
use sitekick::observability;
use sitekick::providers::ProviderRegistry;
use sitekick::providers::check::{self, Selection};
use sitekick::runner::Runner;
use sitekick::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    if let Some(Commands::Echo(args)) = &cli.command {
        observability::init_tracing("info");
        return server::run(args.address).await;
    }

    let config = Config::load(cli.global.config_path.clone(), &cli.global.overrides())?;
    observability::init_tracing(&config.logging.level);
    info!(
        queue = %config.queue.path.display(),
        url = %config.push.url,
        gdpr = config.gdpr.enabled,
        "Configuration loaded"
    );

    let host = Arc::new(HostIdentity::detect());
    let registry = ProviderRegistry::with_defaults(host.clone(), config.collect.system_info);

    match cli.command {
        Some(Commands::Check(args)) => {
            let selection = Selection::parse(args.providers.as_deref());
            let reports = check::check(&registry, &selection).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Some(Commands::Send) | None => {
            let runner = Runner::new(Arc::new(config), registry, host).with_hooks(default_hooks());
            let report = runner.run().await?;

            let failed = report.failed();
            if failed > 0 {
                return Err(format!("{failed} provider run(s) failed").into());
            }
        }
        Some(Commands::Echo(_)) => {}
    }

    Ok(())
}

fn default_hooks() -> Hooks {
    let mut hooks = Hooks::new();
    hooks.register(Stage::Finalize, "report-backlog", |ctx| {
        let pending = ctx.queue.pending_count()?;
        if pending > 0 {
            warn!(pending, queue = %ctx.queue.root().display(), "Records left for the next run");
        }
        Ok(())
    });
    hooks
}
