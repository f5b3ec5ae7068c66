use sqlscope::WhereScope;
use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "sqlscope.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Check,
    Request,
    Init,
    Snapshot,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Check(CheckArgs),
    Request(RequestArgs),
    Init(InitArgs),
    Snapshot(SnapshotArgs),
}

#[derive(Debug, Clone)]
pub struct CheckArgs {
    pub config: PathBuf,
    pub schema: Option<PathBuf>,
    pub dialect: Option<String>,
    pub server_naming: bool,
    pub where_scope: Option<WhereScope>,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RequestArgs {
    pub pretty: bool,
}

#[derive(Debug, Clone)]
pub struct InitArgs {
    pub config: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SnapshotArgs {
    pub schema: PathBuf,
    pub output: Option<PathBuf>,
    pub dialect: Option<String>,
    pub server_naming: bool,
    pub database: Option<String>,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "check" => parse_check(it.map(|s| s.as_str())),
        "request" => parse_request(it.map(|s| s.as_str())),
        "init" => parse_init(it.map(|s| s.as_str())),
        "snapshot" => parse_snapshot(it.map(|s| s.as_str())),
        _ => anyhow::bail!("unknown command: {first}"),
    }
}

/// Value of `--flag <v>` or `--flag=<v>`; `None` when `token` is another flag.
fn flag_value<'a>(
    flag: &str,
    token: &'a str,
    it: &mut impl Iterator<Item = &'a str>,
) -> anyhow::Result<Option<&'a str>> {
    if token == flag {
        let Some(v) = it.next() else {
            anyhow::bail!("{flag} requires a value");
        };
        return Ok(Some(v));
    }
    Ok(token
        .strip_prefix(flag)
        .and_then(|rest| rest.strip_prefix('=')))
}

fn parse_where_scope(v: &str) -> anyhow::Result<WhereScope> {
    match v {
        "schema" => Ok(WhereScope::Schema),
        "statement" => Ok(WhereScope::Statement),
        other => anyhow::bail!("invalid --where-scope: {other} (expected schema|statement)"),
    }
}

fn parse_check<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut schema: Option<PathBuf> = None;
    let mut dialect: Option<String> = None;
    let mut server_naming = false;
    let mut where_scope: Option<WhereScope> = None;
    let mut files: Vec<PathBuf> = Vec::new();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Check)),
            "--server-naming" => server_naming = true,
            _ if token.starts_with("--config") => {
                if let Some(v) = flag_value("--config", token, &mut it)? {
                    config = PathBuf::from(v);
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            _ if token.starts_with("--schema") => {
                if let Some(v) = flag_value("--schema", token, &mut it)? {
                    schema = Some(PathBuf::from(v));
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            _ if token.starts_with("--dialect") => {
                if let Some(v) = flag_value("--dialect", token, &mut it)? {
                    dialect = Some(v.to_string());
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            _ if token.starts_with("--where-scope") => {
                if let Some(v) = flag_value("--where-scope", token, &mut it)? {
                    where_scope = Some(parse_where_scope(v)?);
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            other if other.starts_with('-') && other != "-" => {
                anyhow::bail!("unknown argument: {other}")
            }
            other => files.push(PathBuf::from(other)),
        }
    }

    Ok(Command::Check(CheckArgs {
        config,
        schema,
        dialect,
        server_naming,
        where_scope,
        files,
    }))
}

fn parse_request<'a>(it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut pretty = false;
    for token in it {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Request)),
            "--pretty" => pretty = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(Command::Request(RequestArgs { pretty }))
}

fn parse_init<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Init)),
            _ if token.starts_with("--config") => {
                if let Some(v) = flag_value("--config", token, &mut it)? {
                    config = PathBuf::from(v);
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Init(InitArgs { config }))
}

fn parse_snapshot<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut schema: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut dialect: Option<String> = None;
    let mut server_naming = false;
    let mut database: Option<String> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Snapshot)),
            "--server-naming" => server_naming = true,
            _ if token.starts_with("--schema") => {
                if let Some(v) = flag_value("--schema", token, &mut it)? {
                    schema = Some(PathBuf::from(v));
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            _ if token.starts_with("--output") => {
                if let Some(v) = flag_value("--output", token, &mut it)? {
                    output = Some(PathBuf::from(v));
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            _ if token.starts_with("--dialect") => {
                if let Some(v) = flag_value("--dialect", token, &mut it)? {
                    dialect = Some(v.to_string());
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            _ if token.starts_with("--database") => {
                if let Some(v) = flag_value("--database", token, &mut it)? {
                    database = Some(v.to_string());
                } else {
                    anyhow::bail!("unknown argument: {token}");
                }
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    let Some(schema) = schema else {
        anyhow::bail!("missing --schema: expected `sqlscope snapshot --schema <FILE>`");
    };

    Ok(Command::Snapshot(SnapshotArgs {
        schema,
        output,
        dialect,
        server_naming,
        database,
    }))
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
sqlscope - check SQL against a database schema

USAGE:
  sqlscope <COMMAND> [OPTIONS]

COMMANDS:
  check         Validate SQL files (or stdin) against a schema snapshot
  request       Answer one JSON validation request from stdin
  init          Write a template sqlscope.toml
  snapshot      Wrap a raw schema JSON into a versioned snapshot

Run `sqlscope <command> --help` for more."
            );
        }
        HelpTopic::Check => {
            println!(
                "\
USAGE:
  sqlscope check [OPTIONS] [FILES...]

Reads SQL from stdin when no files are given (or from `-`).

OPTIONS:
  --config <FILE>         Config file path (default: sqlscope.toml)
  --schema <FILE>         Schema snapshot or raw schema JSON (overrides config)
  --dialect <NAME>        PLpgSQL | MYSQL | TSQL | PLSQL (overrides config)
  --server-naming         --dialect uses service names (postgresql, mysql, mssql, oracle)
  --where-scope <MODE>    schema | statement (default: schema)
  -h, --help              Print help"
            );
        }
        HelpTopic::Request => {
            println!(
                "\
USAGE:
  sqlscope request [OPTIONS] < request.json

Reads {{\"content\", \"schema\", \"dialect\", \"fromServer\"}} from stdin and
prints {{\"status\", \"body\"}}.

OPTIONS:
  --pretty              Pretty-print the response
  -h, --help            Print help"
            );
        }
        HelpTopic::Init => {
            println!(
                "\
USAGE:
  sqlscope init [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: sqlscope.toml)
  -h, --help            Print help"
            );
        }
        HelpTopic::Snapshot => {
            println!(
                "\
USAGE:
  sqlscope snapshot --schema <FILE> [OPTIONS]

OPTIONS:
  --schema <FILE>       Raw schema JSON (table -> column -> metadata)
  --output <FILE>       Snapshot path (default: stdout)
  --dialect <NAME>      Record the source database's dialect
  --server-naming       --dialect uses service names
  --database <NAME>     Record a database label
  -h, --help            Print help"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sqlscope")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn no_args_is_help() {
        assert!(matches!(
            parse_args(&args(&[])).unwrap(),
            Command::Help(HelpTopic::Root)
        ));
        assert!(matches!(
            parse_args(&args(&["check", "--help"])).unwrap(),
            Command::Help(HelpTopic::Check)
        ));
    }

    #[test]
    fn parse_check_with_files() {
        let cmd = parse_args(&args(&[
            "check",
            "--config",
            "conf/sqlscope.toml",
            "--dialect=mysql",
            "--server-naming",
            "--where-scope",
            "statement",
            "a.sql",
            "b.sql",
        ]))
        .unwrap();
        let Command::Check(check) = cmd else {
            panic!("expected check");
        };

        assert_eq!(check.config, PathBuf::from("conf/sqlscope.toml"));
        assert_eq!(check.dialect.as_deref(), Some("mysql"));
        assert!(check.server_naming);
        assert_eq!(check.where_scope, Some(WhereScope::Statement));
        assert_eq!(check.schema, None);
        assert_eq!(
            check.files,
            vec![PathBuf::from("a.sql"), PathBuf::from("b.sql")]
        );
    }

    #[test]
    fn check_rejects_bad_flags() {
        assert!(parse_args(&args(&["check", "--where-scope", "tables"])).is_err());
        assert!(parse_args(&args(&["check", "--schema"])).is_err());
        assert!(parse_args(&args(&["check", "--schemas=x"])).is_err());
        assert!(parse_args(&args(&["check", "--verbose"])).is_err());
        assert!(parse_args(&args(&["lint"])).is_err());
    }

    #[test]
    fn stdin_marker_is_a_file_argument() {
        let Command::Check(check) = parse_args(&args(&["check", "-"])).unwrap() else {
            panic!("expected check");
        };
        assert_eq!(check.files, vec![PathBuf::from("-")]);
    }

    #[test]
    fn parse_snapshot_requires_schema() {
        assert!(parse_args(&args(&["snapshot"])).is_err());

        let cmd = parse_args(&args(&[
            "snapshot",
            "--schema",
            "raw.json",
            "--output=.sqlscope/schema.json",
            "--dialect",
            "PLpgSQL",
            "--database",
            "shop",
        ]))
        .unwrap();
        let Command::Snapshot(s) = cmd else {
            panic!("expected snapshot");
        };
        assert_eq!(s.schema, PathBuf::from("raw.json"));
        assert_eq!(s.output, Some(PathBuf::from(".sqlscope/schema.json")));
        assert_eq!(s.dialect.as_deref(), Some("PLpgSQL"));
        assert_eq!(s.database.as_deref(), Some("shop"));
        assert!(!s.server_naming);
    }

    #[test]
    fn parse_init_and_request() {
        let Command::Init(init) = parse_args(&args(&["init"])).unwrap() else {
            panic!("expected init");
        };
        assert_eq!(init.config, PathBuf::from(DEFAULT_CONFIG));

        let Command::Request(req) = parse_args(&args(&["request", "--pretty"])).unwrap() else {
            panic!("expected request");
        };
        assert!(req.pretty);
    }
}
