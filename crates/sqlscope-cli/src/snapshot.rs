use crate::check::dialect_arg;
use crate::cli::SnapshotArgs;
use sqlscope::SchemaSnapshot;

pub fn run(args: SnapshotArgs) -> anyhow::Result<()> {
    let snapshot = build(&args)?;

    match &args.output {
        Some(path) => {
            snapshot
                .save(path)
                .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
            println!(
                "wrote {} ({} tables)",
                path.display(),
                snapshot.schema.tables.len()
            );
        }
        None => {
            let json = serde_json::to_string_pretty(&snapshot)
                .map_err(|e| anyhow::anyhow!("failed to serialize snapshot: {e}"))?;
            println!("{json}");
        }
    }
    Ok(())
}

fn build(args: &SnapshotArgs) -> anyhow::Result<SchemaSnapshot> {
    let data = std::fs::read(&args.schema)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", args.schema.display()))?;
    let mut snapshot = SchemaSnapshot::from_json(&data)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", args.schema.display()))?;

    if let Some(raw) = args.dialect.as_deref() {
        snapshot = snapshot.with_dialect(dialect_arg(raw, args.server_naming)?);
    }
    if let Some(database) = &args.database {
        snapshot = snapshot.with_database(database.clone());
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlscope::Dialect;
    use std::path::PathBuf;

    #[test]
    fn wraps_raw_schema() {
        let dir = std::env::temp_dir().join(format!("sqlscope-snap-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let raw = dir.join("raw.json");
        std::fs::write(
            &raw,
            r#"{"users": {"id": {"dataType": "int", "isMandatory": true}, "recordCount": 4}}"#,
        )
        .unwrap();

        let args = SnapshotArgs {
            schema: raw,
            output: Some(dir.join("out").join("schema.json")),
            dialect: Some("mssql".to_string()),
            server_naming: true,
            database: Some("shop".to_string()),
        };
        run(args.clone()).unwrap();

        let saved = SchemaSnapshot::load(&dir.join("out").join("schema.json")).unwrap();
        assert_eq!(saved.dialect, Some(Dialect::TSql));
        assert_eq!(saved.database.as_deref(), Some("shop"));
        assert_eq!(saved.schema.tables["users"].record_count, Some(4));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        let args = SnapshotArgs {
            schema: PathBuf::from("/definitely/not/here.json"),
            output: None,
            dialect: Some("sqlite".to_string()),
            server_naming: false,
            database: None,
        };
        assert!(build(&args).is_err());
    }
}
