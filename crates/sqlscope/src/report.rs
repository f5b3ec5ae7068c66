use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationErrorKind};

/// Join every non-empty message of `lists`, in order, one per line.
pub fn aggregate<'a, I>(lists: I) -> String
where
    I: IntoIterator<Item = &'a [ValidationError]>,
{
    lists
        .into_iter()
        .flatten()
        .map(ToString::to_string)
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ordered validation findings. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Newline-separated messages; empty when valid.
    pub fn message(&self) -> String {
        aggregate([self.errors.as_slice()])
    }

    pub fn kinds(&self) -> Vec<ValidationErrorKind> {
        self.errors.iter().map(ValidationError::kind).collect()
    }

    pub fn into_result(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

impl From<ValidationError> for ValidationReport {
    fn from(error: ValidationError) -> Self {
        Self::new(vec![error])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_skips_empty_messages() {
        let first = vec![ValidationError::table_not_found("a")];
        let empty: Vec<ValidationError> = Vec::new();
        let second = vec![
            ValidationError::parser_failure(""),
            ValidationError::InvalidQuery,
        ];
        assert_eq!(
            aggregate([first.as_slice(), empty.as_slice(), second.as_slice()]),
            "Table \"a\" does not exist in schema\nInvalid query"
        );
        assert_eq!(aggregate(Vec::<&[ValidationError]>::new()), "");
    }

    #[test]
    fn report_accessors() {
        let report = ValidationReport::new(vec![
            ValidationError::table_not_found("a"),
            ValidationError::column_not_found_in_schema("b"),
        ]);
        assert!(!report.is_valid());
        assert_eq!(
            report.kinds(),
            vec![
                ValidationErrorKind::TableNotFound,
                ValidationErrorKind::ColumnNotFoundInSchema
            ]
        );
        assert_eq!(report.message().lines().count(), 2);
        assert_eq!(report.into_result().unwrap_err().len(), 2);

        let ok = ValidationReport::default();
        assert!(ok.is_valid());
        assert_eq!(ok.message(), "");
        assert!(ok.into_result().is_ok());
    }
}
