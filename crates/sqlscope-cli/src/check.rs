use crate::cli::CheckArgs;
use crate::config::ProjectConfig;
use colored::Colorize;
use sqlscope::{
    Dialect, NormalizedSchema, SchemaSnapshot, ValidateOptions, ValidationReport, resolve_dialect,
    validate_normalized,
};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    fn label(&self) -> String {
        match self {
            Input::Stdin => "stdin".to_string(),
            Input::File(path) => path.display().to_string(),
        }
    }

    fn read(&self) -> anyhow::Result<String> {
        match self {
            Input::Stdin => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .map_err(|e| anyhow::anyhow!("failed to read stdin: {e}"))?;
                Ok(buf)
            }
            Input::File(path) => std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display())),
        }
    }
}

/// Parse a dialect given on the command line or in the config.
///
/// With `server_naming` the request boundary's lenient mapping applies;
/// otherwise an unknown name is an error.
pub fn dialect_arg(raw: &str, server_naming: bool) -> anyhow::Result<Dialect> {
    if server_naming {
        return Ok(resolve_dialect(raw, true));
    }
    raw.parse::<Dialect>()
        .map_err(|e| anyhow::anyhow!("{e} (expected PLpgSQL, MYSQL, TSQL or PLSQL)"))
}

pub async fn run(args: CheckArgs, project: Option<ProjectConfig>) -> anyhow::Result<()> {
    let schema_path = match (&args.schema, &project) {
        (Some(path), _) => path.clone(),
        (None, Some(project)) => project.schema_path().ok_or_else(|| {
            anyhow::anyhow!("no schema configured; set [schema] path or pass --schema")
        })?,
        (None, None) => anyhow::bail!(
            "failed to load config {}; pass --schema or run `sqlscope init` first",
            args.config.display()
        ),
    };
    let snapshot = SchemaSnapshot::load(&schema_path)
        .map_err(|e| anyhow::anyhow!("failed to load schema {}: {e}", schema_path.display()))?;

    let validate_cfg = project.as_ref().map(|p| p.file.validate.clone()).unwrap_or_default();
    let server_naming = args.server_naming || validate_cfg.server_naming;
    let dialect = match args.dialect.as_deref().or(validate_cfg.dialect.as_deref()) {
        Some(raw) => dialect_arg(raw, server_naming)?,
        None => snapshot.dialect.unwrap_or_default(),
    };
    let options = ValidateOptions::default()
        .with_where_scope(args.where_scope.unwrap_or(validate_cfg.where_scope));

    let inputs = collect_inputs(&args.files, project.as_ref())?;
    tracing::debug!(
        target: "sqlscope.cli",
        %dialect,
        inputs = inputs.len(),
        schema = %schema_path.display(),
        "checking"
    );

    let schema = Arc::new(NormalizedSchema::new(&snapshot.schema));
    let reports = validate_all(&inputs, schema, dialect, options).await?;

    let mut failed = 0usize;
    for (input, report) in inputs.iter().zip(&reports) {
        let label = input.label();
        for error in &report.errors {
            eprintln!("{} {label}: {error}", "[ERROR]".red().bold());
        }
        if !report.is_valid() {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("sql check failed: {failed} of {} inputs have errors", inputs.len());
    }
    eprintln!("{} {} input(s) checked", "ok".green(), inputs.len());
    Ok(())
}

/// Validate every input on the blocking pool; reports come back in input order.
async fn validate_all(
    inputs: &[Input],
    schema: Arc<NormalizedSchema>,
    dialect: Dialect,
    options: ValidateOptions,
) -> anyhow::Result<Vec<ValidationReport>> {
    let mut set = JoinSet::new();
    for (idx, input) in inputs.iter().cloned().enumerate() {
        let schema = Arc::clone(&schema);
        set.spawn_blocking(move || {
            let report = input
                .read()
                .map(|sql| validate_normalized(&sql, &schema, dialect, &options));
            (idx, report)
        });
    }

    let mut reports: Vec<Option<ValidationReport>> = vec![None; inputs.len()];
    while let Some(joined) = set.join_next().await {
        let (idx, report) = joined.map_err(|e| anyhow::anyhow!("validation task failed: {e}"))?;
        reports[idx] = Some(report?);
    }

    Ok(reports.into_iter().flatten().collect())
}

fn collect_inputs(
    files: &[PathBuf],
    project: Option<&ProjectConfig>,
) -> anyhow::Result<Vec<Input>> {
    if !files.is_empty() {
        let mut seen_stdin = false;
        let mut inputs = Vec::with_capacity(files.len());
        for f in files {
            if f == Path::new("-") {
                if seen_stdin {
                    anyhow::bail!("stdin (`-`) may only be given once");
                }
                seen_stdin = true;
                inputs.push(Input::Stdin);
            } else {
                inputs.push(Input::File(f.clone()));
            }
        }
        return Ok(inputs);
    }

    let patterns = project.map(|p| p.file.check.files.as_slice()).unwrap_or_default();
    match project {
        Some(project) if !patterns.is_empty() => Ok(expand_globs(project, patterns)?
            .into_iter()
            .map(Input::File)
            .collect()),
        _ => Ok(vec![Input::Stdin]),
    }
}

fn expand_globs(project: &ProjectConfig, patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: BTreeSet<PathBuf> = BTreeSet::new();

    for p in patterns {
        let abs = project.resolve_path(p);
        let pattern = abs
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("invalid glob pattern: {}", abs.display()))?;

        let mut matched_any = false;
        for entry in
            glob::glob(pattern).map_err(|e| anyhow::anyhow!("invalid glob {pattern}: {e}"))?
        {
            let path = entry.map_err(|e| anyhow::anyhow!("glob error for {pattern}: {e}"))?;
            if path.is_file() {
                matched_any = true;
                files.insert(path);
            }
        }

        if !matched_any {
            anyhow::bail!("glob pattern matched no files: {p}");
        }
    }

    Ok(files.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlscope::Schema;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sqlscope-cli-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn dialect_arg_is_strict_without_server_naming() {
        assert_eq!(dialect_arg("mysql", false).unwrap(), Dialect::MySql);
        assert_eq!(dialect_arg("TSQL", false).unwrap(), Dialect::TSql);
        assert!(dialect_arg("sqlite", false).is_err());
        assert_eq!(dialect_arg("sqlite", true).unwrap(), Dialect::PlPgSql);
        assert_eq!(dialect_arg("oracle", true).unwrap(), Dialect::PlSql);
    }

    #[test]
    fn explicit_files_keep_their_order() {
        let files = vec![PathBuf::from("b.sql"), PathBuf::from("-"), PathBuf::from("a.sql")];
        assert_eq!(
            collect_inputs(&files, None).unwrap(),
            vec![
                Input::File(PathBuf::from("b.sql")),
                Input::Stdin,
                Input::File(PathBuf::from("a.sql")),
            ]
        );
        assert!(collect_inputs(&[PathBuf::from("-"), PathBuf::from("-")], None).is_err());
        assert_eq!(collect_inputs(&[], None).unwrap(), vec![Input::Stdin]);
    }

    #[tokio::test]
    async fn reports_follow_input_order() {
        let dir = temp_dir("order");
        let good = dir.join("good.sql");
        let bad = dir.join("bad.sql");
        std::fs::write(&good, "SELECT id FROM users").unwrap();
        std::fs::write(&bad, "SELECT nope FROM users").unwrap();

        let schema = Arc::new(NormalizedSchema::new(
            &Schema::new().with_table("users", ["id", "name"]),
        ));
        let inputs = vec![
            Input::File(bad.clone()),
            Input::File(good.clone()),
            Input::File(bad),
        ];
        let reports = validate_all(&inputs, schema, Dialect::MySql, ValidateOptions::default())
            .await
            .unwrap();

        let valid: Vec<bool> = reports.iter().map(ValidationReport::is_valid).collect();
        assert_eq!(valid, vec![false, true, false]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let schema = Arc::new(NormalizedSchema::new(&Schema::new()));
        let inputs = vec![Input::File(PathBuf::from("/definitely/not/here.sql"))];
        let err = validate_all(&inputs, schema, Dialect::PlPgSql, ValidateOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
