use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sweep_core::browser::{ChromiumLauncher, ChromiumSessionFactory};
use sweep_core::sweep::ItemStatus;
use sweep_core::{
    load_sweep_config, Credentials, SiteLogin, SweepConfig, SweepReport, SweepRunner,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] sweep_core::ConfigError),
    #[error("sweep error: {0}")]
    Sweep(#[from] sweep_core::SweepError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("requested provider not listed: {0}")]
    UnknownProvider(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Catalog sweep command-line interface", long_about = None)]
pub struct Cli {
    /// Path to sweep.toml
    #[arg(long, default_value = "configs/sweep.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Overrides `chromium.headless`
    #[arg(long)]
    pub headless: Option<bool>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sweeps the catalog
    Run(RunArgs),
    /// Lists providers as the catalog shows them
    Providers,
    /// Loads and validates the config
    CheckConfig,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Sweep only these providers (repeatable)
    #[arg(long = "provider")]
    pub providers: Vec<String>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_sweep_config(&cli.config)?;

    match &cli.command {
        Commands::CheckConfig => {
            render(&ConfigSummary::from(&config), cli.format)?;
        }
        Commands::Providers => {
            let runner = build_runner(config, cli.headless)?;
            let providers = ProviderList {
                providers: runner.list_providers().await?,
            };
            render(&providers, cli.format)?;
        }
        Commands::Run(args) => {
            let runner = build_runner(config, cli.headless)?;
            let report = runner.run(&args.providers).await?;
            if let Some(missing) = args
                .providers
                .iter()
                .find(|wanted| !report.providers.iter().any(|p| p.provider == wanted.trim()))
            {
                render(&report, cli.format)?;
                return Err(AppError::UnknownProvider(missing.clone()));
            }
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn build_runner(config: SweepConfig, headless: Option<bool>) -> Result<SweepRunner> {
    let credentials = Credentials::from_env(&config.site)?;
    let mut launcher = ChromiumLauncher::new(config.chromium.clone());
    if let Some(headless) = headless {
        launcher = launcher.with_headless(headless);
    }
    let auth = Arc::new(SiteLogin::new(&config));
    Ok(SweepRunner::new(
        Arc::new(config),
        Arc::new(ChromiumSessionFactory::new(launcher)),
        auth,
        credentials,
    ))
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
struct ConfigSummary {
    base_url: String,
    headless: bool,
    failure_budget: u32,
    escalation_interval: u32,
    login_attempts: u32,
    outcome_polls: u32,
    poll_interval_ms: u64,
    screenshot_dir: String,
    skip_leading_providers: usize,
    skip_providers: Vec<String>,
}

impl From<&SweepConfig> for ConfigSummary {
    fn from(config: &SweepConfig) -> Self {
        Self {
            base_url: config.site.base_url.clone(),
            headless: config.chromium.headless,
            failure_budget: config.policy.failure_budget,
            escalation_interval: config.policy.escalation_interval,
            login_attempts: config.policy.login_attempts,
            outcome_polls: config.timing.outcome_polls,
            poll_interval_ms: config.timing.poll_interval_ms,
            screenshot_dir: config.diagnostics.screenshot_dir.display().to_string(),
            skip_leading_providers: config.policy.skip_leading_providers,
            skip_providers: config.policy.skip_providers.clone(),
        }
    }
}

impl DisplayFallback for ConfigSummary {
    fn display(&self) -> String {
        let mut lines = vec![
            "Config OK".to_string(),
            format!("  Site: {}", self.base_url),
            format!("  Headless: {}", self.headless),
            format!(
                "  Failure budget: {} per provider, hard restart every {} failures",
                self.failure_budget, self.escalation_interval
            ),
            format!("  Login attempts: {}", self.login_attempts),
            format!(
                "  Outcome wait: {} polls every {} ms",
                self.outcome_polls, self.poll_interval_ms
            ),
            format!("  Screenshots: {}", self.screenshot_dir),
            format!("  Leading providers skipped: {}", self.skip_leading_providers),
        ];
        if !self.skip_providers.is_empty() {
            lines.push(format!("  Skipped providers: {}", self.skip_providers.join(", ")));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
struct ProviderList {
    providers: Vec<String>,
}

impl DisplayFallback for ProviderList {
    fn display(&self) -> String {
        if self.providers.is_empty() {
            return "No providers listed.".to_string();
        }
        let mut out = String::new();
        for (index, provider) in self.providers.iter().enumerate() {
            let _ = writeln!(out, "{:>3}. {}", index + 1, provider);
        }
        out.trim_end().to_string()
    }
}

impl DisplayFallback for SweepReport {
    fn display(&self) -> String {
        let mut out = format!(
            "Sweep started {} ({}s)\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.duration_secs
        );
        for provider in &self.providers {
            let _ = writeln!(
                out,
                "- {}: {} pages, {} items, {} ok, {} recovered, {} failed, {} timed out, {} errors, {} skipped",
                provider.provider,
                provider.pages_visited,
                provider.items_attempted,
                provider.successes,
                provider.recovered,
                provider.failures,
                provider.timeouts,
                provider.exceptions,
                provider.permanent_skips,
            );
            if provider.halted_by_budget {
                let _ = writeln!(
                    out,
                    "    halted: failure budget reached ({} failures)",
                    provider.failure_budget_used
                );
            }
            if let Some(reason) = &provider.aborted {
                let _ = writeln!(out, "    aborted: {reason}");
            }
            if !provider.navigation_failures.is_empty() {
                let pages: Vec<String> = provider
                    .navigation_failures
                    .iter()
                    .map(|page| page.to_string())
                    .collect();
                let _ = writeln!(out, "    unreachable pages: {}", pages.join(", "));
            }
            if provider.reentries > 0 {
                let _ = writeln!(out, "    catalog context rebuilt {} times", provider.reentries);
            }
            for item in &provider.items {
                if let ItemStatus::Failed { kind } = &item.status {
                    let _ = writeln!(
                        out,
                        "    page {} #{} {}: {}",
                        item.key.page,
                        item.key.index,
                        item.name.as_deref().unwrap_or("?"),
                        kind
                    );
                }
            }
        }
        let _ = write!(
            out,
            "Totals: {} attempted, {} succeeded, {} items retried, {} escalation-counted failures",
            self.items_attempted(),
            self.successes(),
            self.retried_items,
            self.escalation_count
        );
        out
    }
}
