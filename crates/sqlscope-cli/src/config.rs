use serde::Deserialize;
use sqlscope::WhereScope;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub config_dir: PathBuf,
    pub file: ConfigFile,
}

impl ProjectConfig {
    pub fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        let config_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            anyhow::anyhow!(
                "failed to read config file {}: {e}",
                config_path.display()
            )
        })?;

        Self::parse(&raw, config_dir).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse config file {}: {e:#}",
                config_path.display()
            )
        })
    }

    fn parse(raw: &str, config_dir: PathBuf) -> anyhow::Result<Self> {
        let mut table: toml::Table = toml::from_str(raw)?;
        expand_env(table.iter_mut().map(|(_, v)| v))?;
        let file: ConfigFile = toml::Value::Table(table).try_into()?;
        file.validate()?;
        Ok(Self { config_dir, file })
    }

    pub fn resolve_path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir.join(p)
        }
    }

    pub fn schema_path(&self) -> Option<PathBuf> {
        self.file.schema.path.as_ref().map(|p| self.resolve_path(p))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,

    #[serde(default)]
    pub validate: ValidateConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidateConfig {
    pub dialect: Option<String>,
    #[serde(default)]
    pub server_naming: bool,
    #[serde(default)]
    pub where_scope: WhereScope,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckConfig {
    /// Glob patterns, relative to the config file.
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    pub level: Option<String>,
}

impl ConfigFile {
    fn validate(&self) -> anyhow::Result<()> {
        if self.version.trim() != "1" {
            anyhow::bail!("unsupported config version: {}", self.version);
        }
        if let Some(path) = &self.schema.path {
            if path.trim().is_empty() {
                anyhow::bail!("schema.path must not be empty");
            }
        }
        if self.check.files.iter().any(|p| p.trim().is_empty()) {
            anyhow::bail!("check.files must not contain empty patterns");
        }
        Ok(())
    }
}

/// Expand `${VAR}` in every string value of the document, nested ones included.
fn expand_env<'a>(values: impl Iterator<Item = &'a mut toml::Value>) -> anyhow::Result<()> {
    let mut stack: Vec<&mut toml::Value> = values.collect();
    while let Some(value) = stack.pop() {
        match value {
            toml::Value::String(s) => *s = expand_env_vars(s)?,
            toml::Value::Array(items) => stack.extend(items.iter_mut()),
            toml::Value::Table(table) => stack.extend(table.iter_mut().map(|(_, v)| v)),
            _ => {}
        }
    }
    Ok(())
}

fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow::anyhow!("unterminated env var reference in {input:?}"))?;
        let key = &after[..end];
        if key.is_empty() {
            anyhow::bail!("empty env var reference in {input:?}");
        }
        let value = std::env::var(key)
            .map_err(|_| anyhow::anyhow!("missing env var for config expansion: {key}"))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let raw = r#"
version = "1"

[validate]
dialect = "MYSQL"
server_naming = false
where_scope = "statement"

[schema]
path = ".sqlscope/schema.json"

[check]
files = ["queries/**/*.sql"]

[log]
level = "debug"
"#;
        let project = ProjectConfig::parse(raw, PathBuf::from("/srv/app")).unwrap();
        assert_eq!(project.file.validate.dialect.as_deref(), Some("MYSQL"));
        assert_eq!(project.file.validate.where_scope, WhereScope::Statement);
        assert_eq!(
            project.schema_path(),
            Some(PathBuf::from("/srv/app/.sqlscope/schema.json"))
        );
        assert_eq!(project.file.check.files, vec!["queries/**/*.sql"]);
        assert_eq!(project.file.log.level.as_deref(), Some("debug"));
    }

    #[test]
    fn sections_are_optional() {
        let project = ProjectConfig::parse("version = \"1\"", PathBuf::from(".")).unwrap();
        assert_eq!(project.file.validate.where_scope, WhereScope::Schema);
        assert!(project.schema_path().is_none());
        assert!(project.file.check.files.is_empty());
    }

    #[test]
    fn rejects_unknown_version() {
        let err = ProjectConfig::parse("version = \"2\"", PathBuf::from(".")).unwrap_err();
        assert!(err.to_string().contains("unsupported config version"));
    }

    #[test]
    fn expands_env_vars() {
        // PATH is set in every test environment.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("${PATH}/x").unwrap(), format!("{path}/x"));
        assert_eq!(expand_env_vars("plain").unwrap(), "plain");
        assert!(expand_env_vars("${UNTERMINATED").is_err());
        assert!(expand_env_vars("${}").is_err());
        assert!(expand_env_vars("${SQLSCOPE_SURELY_UNSET_VAR}").is_err());
    }

    #[test]
    fn every_string_value_is_expanded() {
        let path = std::env::var("PATH").unwrap();
        let raw = r#"
version = "1"

[validate]
dialect = "${PATH}"

[schema]
path = "${PATH}/schema.json"

[check]
files = ["${PATH}/a/*.sql", "b/*.sql"]

[log]
level = "${PATH}"
"#;
        let project = ProjectConfig::parse(raw, PathBuf::from(".")).unwrap();
        let file = &project.file;
        assert_eq!(file.validate.dialect.as_deref(), Some(path.as_str()));
        assert_eq!(file.schema.path.as_deref(), Some(format!("{path}/schema.json").as_str()));
        assert_eq!(file.check.files, vec![format!("{path}/a/*.sql"), "b/*.sql".to_string()]);
        assert_eq!(file.log.level.as_deref(), Some(path.as_str()));

        let missing = "version = \"1\"\n[schema]\npath = \"${SQLSCOPE_SURELY_UNSET_VAR}\"\n";
        assert!(ProjectConfig::parse(missing, PathBuf::from(".")).is_err());
    }
}
