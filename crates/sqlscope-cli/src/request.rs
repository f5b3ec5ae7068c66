use crate::cli::RequestArgs;
use sqlscope::{ValidateRequest, handle};
use std::io::Read;

pub fn run(args: RequestArgs) -> anyhow::Result<()> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| anyhow::anyhow!("failed to read stdin: {e}"))?;

    println!("{}", respond(&buf, args.pretty)?);
    Ok(())
}

fn respond(raw: &str, pretty: bool) -> anyhow::Result<String> {
    let request: ValidateRequest =
        serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("invalid request JSON: {e}"))?;

    let response = handle(&request);
    tracing::debug!(target: "sqlscope.cli", status = response.status, "request handled");

    let out = if pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    };
    out.map_err(|e| anyhow::anyhow!("failed to serialize response: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_with_status_and_body() {
        let raw = r#"{"content": "SELECT id FROM users", "schema": {"users": {"id": {"dataType": "int"}}}}"#;
        assert_eq!(respond(raw, false).unwrap(), r#"{"status":200,"body":{}}"#);

        let raw = r#"{"content": "SELECT id FROM nope", "schema": {}, "dialect": "MYSQL"}"#;
        assert_eq!(
            respond(raw, false).unwrap(),
            r#"{"status":400,"body":{"message":"Table \"nope\" does not exist in schema"}}"#
        );
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(respond("{not json", false).is_err());
        assert!(respond(r#"{"schema": {}}"#, false).is_err());
    }
}
