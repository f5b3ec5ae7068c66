//! Request/response boundary.
//!
//! Mirrors the HTTP contract editors and suggestion filters already speak:
//! 200 with `{}` when the SQL fits the schema, 400 with `{"message": …}`
//! otherwise.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

use crate::dialect::resolve_dialect;
use crate::error::ValidationError;
use crate::report::ValidationReport;
use crate::schema::Schema;
use crate::scope::WhereScope;
use crate::validate::{ValidateOptions, validate_with};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub content: String,
    #[serde(default)]
    pub schema: Schema,
    /// Dialect identifier, in either naming convention.
    #[serde(default)]
    pub dialect: String,
    /// `dialect` uses the external service's names (`mysql`, `mssql`, ...).
    #[serde(default, alias = "fromServerNaming")]
    pub from_server: bool,
    #[serde(default)]
    pub where_scope: WhereScope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ValidateResponse {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK,
            body: ResponseBody::default(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_BAD_REQUEST,
            body: ResponseBody {
                message: Some(message.into()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

impl From<&ValidationReport> for ValidateResponse {
    fn from(report: &ValidationReport) -> Self {
        if report.is_valid() {
            Self::ok()
        } else {
            Self::bad_request(report.message())
        }
    }
}

/// Validate one request.
///
/// A panic raised while walking the statement is reported as a parser
/// failure instead of unwinding into the caller.
pub fn handle(request: &ValidateRequest) -> ValidateResponse {
    let dialect = resolve_dialect(&request.dialect, request.from_server);
    let options = ValidateOptions::default().with_where_scope(request.where_scope);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        validate_with(&request.content, &request.schema, dialect, &options)
    }));

    let report = outcome.unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::warn!(target: "sqlscope.validate", %dialect, %message, "validator panicked");
        ValidationReport::from(ValidationError::parser_failure(message))
    });

    ValidateResponse::from(&report)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> ValidateRequest {
        serde_json::from_value(value).expect("request")
    }

    fn schema() -> serde_json::Value {
        json!({
            "users": {
                "id": {"dataType": "integer", "isMandatory": true},
                "name": {"dataType": "text", "isMandatory": false},
                "recordCount": 12
            }
        })
    }

    #[test]
    fn valid_sql_is_200_with_empty_body() {
        let resp = handle(&request(json!({
            "content": "SELECT id FROM users",
            "schema": schema(),
            "dialect": "PLpgSQL",
            "fromServerNaming": false
        })));
        assert!(resp.is_success());
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"status": 200, "body": {}})
        );
    }

    #[test]
    fn invalid_sql_is_400_with_message() {
        let resp = handle(&request(json!({
            "content": "SELECT age FROM users; SELECT id FROM accounts",
            "schema": schema(),
            "dialect": "mysql",
            "fromServer": true
        })));
        assert_eq!(resp.status, STATUS_BAD_REQUEST);
        assert_eq!(
            resp.body.message.as_deref(),
            Some(
                "Column \"age\" does not exist in tables \"users\"\nTable \"accounts\" does not exist in schema"
            )
        );
    }

    #[test]
    fn parser_message_is_forwarded() {
        let resp = handle(&request(json!({
            "content": "SELECT FROM WHERE",
            "schema": schema(),
            "dialect": "MYSQL"
        })));
        assert_eq!(resp.status, STATUS_BAD_REQUEST);
        let message = resp.body.message.expect("message");
        assert!(!message.is_empty());
        assert_ne!(message, "Invalid query");
    }

    #[test]
    fn missing_fields_default() {
        let req = request(json!({"content": "-- typing..."}));
        assert_eq!(req.dialect, "");
        assert!(!req.from_server);
        assert!(handle(&req).is_success());

        let resp = handle(&request(json!({"content": ""})));
        assert_eq!(resp.body.message.as_deref(), Some("Invalid query"));
    }

    #[test]
    fn statement_scope_can_be_requested() {
        let sql = "SELECT id FROM users WHERE total > 1";
        let mut schema_value = schema();
        schema_value["orders"] = json!({"total": {"dataType": "int", "isMandatory": false}});

        let coarse = handle(&request(json!({"content": sql, "schema": schema_value.clone()})));
        assert!(coarse.is_success());

        let strict = handle(&request(json!({
            "content": sql,
            "schema": schema_value,
            "whereScope": "statement"
        })));
        assert!(!strict.is_success());
    }

    #[test]
    fn panic_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42_u8), "Unknown error");
    }
}
