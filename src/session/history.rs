use serde::{Deserialize, Serialize};

use crate::{error::ErrorKind, timestamp::Timestamp};

/// One execution attempt and how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub timestamp: Timestamp,
    pub code: String,
    pub output: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
}

impl ExecutionRecord {
    pub fn success(code: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            code: code.into(),
            output: output.into(),
            success: true,
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(
        code: impl Into<String>,
        output: impl Into<String>,
        error: impl Into<String>,
        kind: ErrorKind,
    ) -> Self {
        Self {
            timestamp: Timestamp::now(),
            code: code.into(),
            output: output.into(),
            success: false,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }
}

/// Append-only log of execution records, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    records: Vec<ExecutionRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    pub fn all(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// The last `min(n, len)` records, in order.
    pub fn tail(&self, n: usize) -> &[ExecutionRecord] {
        &self.records[self.records.len().saturating_sub(n)..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn successful(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter().filter(|record| record.success)
    }
}

impl From<Vec<ExecutionRecord>> for History {
    fn from(records: Vec<ExecutionRecord>) -> Self {
        Self { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn history(n: usize) -> History {
        let mut history = History::new();
        for i in 0..n {
            history.append(ExecutionRecord::success(format!("x = {}", i), ""));
        }
        history
    }

    #[test]
    fn test_tail() {
        let history = history(5);
        let codes: Vec<&str> = history.tail(2).iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["x = 3", "x = 4"]);
        assert_eq!(history.tail(10).len(), 5);
        assert!(history.tail(0).is_empty());
    }

    #[test]
    fn test_clear_and_successful() {
        let mut history = history(2);
        history.append(ExecutionRecord::failure(
            "1/0",
            "",
            "ZeroDivisionError: division by zero",
            ErrorKind::RuntimeFault,
        ));
        assert_eq!(history.len(), 3);
        assert_eq!(history.successful().count(), 2);
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = ExecutionRecord::failure("import os", "", "blocked", ErrorKind::SecurityViolation);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["errorKind"], "SecurityViolation");
        assert_eq!(json["success"], false);
        let back: ExecutionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
