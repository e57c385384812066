//! Subcommand implementations

use async_trait::async_trait;
use kiln_core::{EventKind, PassReport, PluginEvent, PluginEventHandler, PluginHost};
use kiln_foundation::PluginsConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 라이프사이클 이벤트를 터미널에 출력
struct ConsoleEvents;

#[async_trait]
impl PluginEventHandler for ConsoleEvents {
    fn name(&self) -> &str {
        "console"
    }

    async fn handle(&self, event: &PluginEvent) {
        let manifest = &event.plugin.manifest;
        if manifest.stealth_mode {
            return;
        }

        let symbol = match event.kind {
            EventKind::PluginLoaded => "✓",
            EventKind::PluginUnloaded => "✗",
        };
        println!("  {} {} v{}", symbol, manifest.id, manifest.version);
    }
}

async fn start_host(
    config: PluginsConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<(PluginHost, PassReport)> {
    let host = PluginHost::builder(config).build()?;
    host.event_bus()
        .register_handler(Arc::new(ConsoleEvents))
        .await;

    let report = host.start(cancel).await?;
    Ok((host, report))
}

/// `kiln sync`
pub async fn run_sync(
    config: PluginsConfig,
    cancel: &CancellationToken,
    json: bool,
) -> anyhow::Result<()> {
    let (host, report) = start_host(config, cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    host.shutdown().await;
    Ok(())
}

/// `kiln status`
pub async fn run_status(
    config: PluginsConfig,
    cancel: &CancellationToken,
    all: bool,
) -> anyhow::Result<()> {
    let (host, report) = start_host(config, cancel).await?;
    if report.cancelled {
        println!("Cancelled.");
        return Ok(());
    }

    println!("\n📦 Plugins ({})\n", host.phase());
    println!("{:<30} {:<15} {:<10} {}", "ID", "VERSION", "STATE", "MODULE");
    println!("{}", "-".repeat(75));

    for snapshot in host.registry().snapshots().await {
        if snapshot.manifest.stealth_mode && !all {
            continue;
        }
        println!(
            "{:<30} {:<15} {:<10} {}",
            snapshot.manifest.id,
            snapshot.manifest.version.to_string(),
            snapshot.state.to_string(),
            snapshot.module.as_deref().unwrap_or("-")
        );
    }

    let index = host.registry().module_index().await;
    if !index.is_empty() {
        println!("\n🧩 Modules\n");
        for (module, plugins) in index {
            println!("  {} → {}", module, plugins.join(", "));
        }
    }

    host.shutdown().await;
    Ok(())
}

/// `kiln config`
pub fn print_config(config: &PluginsConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();
    println!("pluginsRoot (effective): {}", config.plugins_root().display());
    println!("cacheDir (effective):    {}", config.cache_dir().display());
    Ok(())
}

fn print_report(report: &PassReport) {
    if report.cancelled {
        println!("\nPass cancelled before loading.");
    }

    println!(
        "\nInstalled {} · skipped {} · loaded {}",
        report.installed.len(),
        report.skipped.len(),
        report.loaded.len()
    );

    for (name, install) in &report.installed {
        println!(
            "  {} → {} ({} extracted, {} up to date)",
            name,
            install.plugin_dir.display(),
            install.extracted.len(),
            install.up_to_date.len()
        );
    }

    for skipped in &report.skipped {
        let hint = if skipped.retryable { " (will retry on reload)" } else { "" };
        println!("  ⚠ {}: {}{}", skipped.name, skipped.reason, hint);
    }

    if report.module_failures > 0 {
        println!("  ⚠ {} module files failed to load", report.module_failures);
    }
}
