use crate::cli::InitArgs;
use std::path::Path;

const TEMPLATE: &str = r#"
version = "1"

[validate]
dialect = "PLpgSQL" # PLpgSQL | MYSQL | TSQL | PLSQL
server_naming = false # dialect uses service names (postgresql, mysql, mssql, oracle)
where_scope = "schema" # schema | statement

[schema]
# Snapshot written by `sqlscope snapshot`, or a raw schema JSON.
path = ".sqlscope/schema.json"

[check]
files = ["queries/**/*.sql"]

[log]
# RUST_LOG takes precedence.
level = "warn"
"#;

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    write_template(&args.config)?;
    println!("wrote {}", args.config.display());
    Ok(())
}

fn write_template(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("refusing to overwrite existing file: {}", path.display());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("failed to create directory {}: {e}", parent.display())
            })?;
        }
    }

    std::fs::write(path, TEMPLATE.trim_start_matches('\n'))
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))
}
