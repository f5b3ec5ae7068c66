use tracing_subscriber::EnvFilter;

pub const DEFAULT_LEVEL: &str = "warn";

/// Filter directives: `RUST_LOG` wins, then the config's `[log] level`, then `warn`.
fn directives(env: Option<String>, configured: Option<&str>) -> String {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

fn build_env_filter(directives: &str) -> anyhow::Result<EnvFilter> {
    // sqlparser logs every parse at debug
    let filter = format!("{directives},sqlparser=warn");
    EnvFilter::try_new(&filter)
        .map_err(|e| anyhow::anyhow!("invalid log filter '{filter}': {e}"))
}

/// Install the global subscriber. Logs go to stderr so stdout stays machine-readable.
pub fn init(configured: Option<&str>) -> anyhow::Result<()> {
    let filter = build_env_filter(&directives(std::env::var("RUST_LOG").ok(), configured))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))?;

    tracing::trace!(target: "sqlscope.cli", "logging initialized");
    Ok(())
}
