//! Bounded error/warning accumulation

use crate::error::{ParserError, Severity};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default cap on collected errors
pub const DEFAULT_MAX_ERRORS: usize = 100;

/// Default cap on collected warnings
pub const DEFAULT_MAX_WARNINGS: usize = 200;

/// How the orchestrator reacts to `ERROR`-severity failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Stop at the first `ERROR`-severity failure and return it
    Throw,

    /// Keep going and return a partial-but-usable result with every failure
    #[default]
    Collect,

    /// Keep going like `Collect`, but leave failures out of the returned result
    Ignore,
}

impl ErrorMode {
    /// Whether collected failures are exposed to the caller
    pub fn exposes_failures(self) -> bool {
        !matches!(self, ErrorMode::Ignore)
    }
}

impl FromStr for ErrorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "throw" => Ok(ErrorMode::Throw),
            "collect" => Ok(ErrorMode::Collect),
            "ignore" => Ok(ErrorMode::Ignore),
            other => Err(format!("unknown error mode '{}'", other)),
        }
    }
}

/// Accumulates errors and warnings up to independent caps
///
/// `ERROR` entries go to the error list; `WARN` and `INFO` entries go to the
/// warning list. Entries past a cap are counted but not stored.
#[derive(Debug, Clone)]
pub struct ErrorCollector {
    errors: Vec<ParserError>,
    warnings: Vec<ParserError>,
    max_errors: usize,
    max_warnings: usize,
    capped_errors: usize,
    capped_warnings: usize,
}

impl ErrorCollector {
    pub fn new(max_errors: usize, max_warnings: usize) -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            max_errors,
            max_warnings,
            capped_errors: 0,
            capped_warnings: 0,
        }
    }

    /// Record an entry; returns `false` when it was dropped by a cap
    pub fn add(&mut self, error: ParserError) -> bool {
        match error.severity {
            Severity::Error => {
                if self.errors.len() >= self.max_errors {
                    self.capped_errors += 1;
                    return false;
                }
                self.errors.push(error);
            }
            Severity::Warn | Severity::Info => {
                if self.warnings.len() >= self.max_warnings {
                    self.capped_warnings += 1;
                    return false;
                }
                self.warnings.push(error);
            }
        }
        true
    }

    pub fn errors(&self) -> &[ParserError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ParserError] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Number of entries dropped by the caps as `(errors, warnings)`
    pub fn capped(&self) -> (usize, usize) {
        (self.capped_errors, self.capped_warnings)
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
        self.capped_errors = 0;
        self.capped_warnings = 0;
    }

    /// Consume the collector into `(errors, warnings)`
    pub fn into_parts(self) -> (Vec<ParserError>, Vec<ParserError>) {
        (self.errors, self.warnings)
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERRORS, DEFAULT_MAX_WARNINGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_routes_by_severity() {
        let mut collector = ErrorCollector::default();
        collector.add(ParserError::new(ErrorCode::REF_001));
        collector.add(ParserError::new(ErrorCode::OPENAPI_003));
        collector.add(ParserError::new(ErrorCode::GENERAL_001).with_severity(Severity::Info));

        assert_eq!(collector.errors().len(), 1);
        assert_eq!(collector.warnings().len(), 2);
        assert!(collector.has_errors());
        assert!(collector.has_warnings());
    }

    #[test]
    fn test_caps_are_independent() {
        let mut collector = ErrorCollector::new(2, 1);
        for _ in 0..5 {
            collector.add(ParserError::new(ErrorCode::SCHEMA_001));
        }
        assert!(collector.add(ParserError::new(ErrorCode::SCHEMA_002)));
        assert!(!collector.add(ParserError::new(ErrorCode::SCHEMA_002)));

        assert_eq!(collector.errors().len(), 2);
        assert_eq!(collector.warnings().len(), 1);
        assert_eq!(collector.capped(), (3, 1));
    }

    #[test]
    fn test_error_mode_parsing() {
        assert_eq!("THROW".parse::<ErrorMode>().unwrap(), ErrorMode::Throw);
        assert_eq!("ignore".parse::<ErrorMode>().unwrap(), ErrorMode::Ignore);
        assert!("explode".parse::<ErrorMode>().is_err());
        assert_eq!(ErrorMode::default(), ErrorMode::Collect);
        assert!(!ErrorMode::Ignore.exposes_failures());
    }
}
