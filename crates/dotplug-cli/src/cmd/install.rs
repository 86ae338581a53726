use anyhow::{Context, Result, bail};
use dotplug_core::{CommandPolicy, Config, Manifest, Scheduler, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;

use crate::InstallArgs;
use crate::ui::{ConsoleReporter, UiActor};

/// Install every application of a manifest.
pub async fn install(args: InstallArgs) -> Result<()> {
    let mut manifest = Manifest::load(&args.manifest)
        .await
        .with_context(|| format!("Failed to load {}", args.manifest.display()))?;
    if args.force {
        for app in &mut manifest.apps {
            app.force = true;
        }
    }

    let config = build_config(&args)?;
    tracing::debug!(?config, "resolved configuration");

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .tcp_nodelay(true)
        .pool_max_idle_per_host(20)
        .build()
        .context("Failed to build HTTP client")?;

    let actor = UiActor::spawn();
    let reporter = Arc::new(ConsoleReporter::new(actor.sender(), args.quiet));
    let scheduler = Scheduler::new(Arc::new(config), client, reporter);

    let result = scheduler.run(manifest.apps).await;
    actor.shutdown();

    let report = result?;
    if report.has_failures() {
        let failed: Vec<_> = report.failures().map(|o| o.name.as_str()).collect();
        bail!("{} failed: {}", plural(failed.len()), failed.join(", "));
    }
    Ok(())
}

/// Environment defaults with command-line overrides applied.
pub fn build_config(args: &InstallArgs) -> Result<Config> {
    let mut config = Config::from_env()?;

    if let Some(path) = &args.archive_root {
        config.archive_root.clone_from(path);
    }
    if let Some(path) = &args.install_root {
        config.install_root.clone_from(path);
    }
    if let Some(path) = &args.bin_dir {
        config.bin_dir.clone_from(path);
    }
    if args.log_dir.is_some() {
        config.log_dir.clone_from(&args.log_dir);
    }
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            bail!("--jobs must be at least 1");
        }
        config.concurrency = jobs;
    }
    if args.best_effort {
        config.command_policy = CommandPolicy::BestEffort;
    }
    if let Some(secs) = args.timeout {
        if secs == 0 {
            bail!("--timeout must be at least 1 second");
        }
        config.app_timeout = Some(Duration::from_secs(secs));
    }

    Ok(config)
}

fn plural(n: usize) -> String {
    if n == 1 {
        "1 application".to_string()
    } else {
        format!("{n} applications")
    }
}
