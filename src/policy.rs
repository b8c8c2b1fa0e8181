//! Static checks on submitted source, run before anything is evaluated.
//!
//! Checks run in a fixed order and stop at the first failure:
//! length, deny patterns, bracket nesting, assigned variable count.
//! The last two are heuristics over the raw text, not a parse.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::{
    config::{ConfigError, ConfigResult, SandboxConfig},
    error::ErrorKind,
};

lazy_static! {
    static ref ASSIGNED_NAME: Regex =
        Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)[ \t]*(\*\*|//|[-+*/%])?=(=)?").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyViolation {
    #[error("code length {length} exceeds the maximum of {max} characters")]
    LengthExceeded { length: usize, max: usize },
    #[error("restricted operation matched `{pattern}`")]
    SecurityViolation { pattern: String },
    #[error("nesting depth {depth} exceeds the maximum of {max}")]
    NestingExceeded { depth: usize, max: usize },
    #[error("{count} assigned variables exceed the maximum of {max}")]
    TooManyVariables { count: usize, max: usize },
}

impl PolicyViolation {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PolicyViolation::LengthExceeded { .. } => ErrorKind::LengthExceeded,
            PolicyViolation::SecurityViolation { .. } => ErrorKind::SecurityViolation,
            PolicyViolation::NestingExceeded { .. } => ErrorKind::NestingExceeded,
            PolicyViolation::TooManyVariables { .. } => ErrorKind::TooManyVariables,
        }
    }
}

#[derive(Debug, Clone)]
struct DenyPattern {
    source: String,
    regex: Regex,
}

/// Compiled policy data: allow-listed builtins, deny patterns and ceilings.
#[derive(Debug, Clone)]
pub struct Policy {
    allowed_builtins: Vec<String>,
    deny: Vec<DenyPattern>,
    max_code_length: usize,
    max_nesting_depth: usize,
    max_variables: usize,
}

impl Policy {
    pub fn from_config(config: &SandboxConfig) -> ConfigResult<Self> {
        let deny = config
            .security
            .restricted_operations
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?i){}", pattern))
                    .map(|regex| DenyPattern {
                        source: pattern.clone(),
                        regex,
                    })
                    .map_err(|e| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self {
            allowed_builtins: config.security.allowed_builtins.clone(),
            deny,
            max_code_length: config.limits.max_code_length,
            max_nesting_depth: config.limits.max_nesting_depth,
            max_variables: config.limits.max_variables,
        })
    }

    pub fn allowed_builtins(&self) -> &[String] {
        &self.allowed_builtins
    }

    pub fn deny_patterns(&self) -> impl Iterator<Item = &str> {
        self.deny.iter().map(|pattern| pattern.source.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PolicyValidator {
    policy: Policy,
}

impl PolicyValidator {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn validate(&self, source: &str) -> Result<(), PolicyViolation> {
        let result = self.check(source);
        if let Err(violation) = &result {
            warn!("Policy rejected submission: {}", violation);
        }
        result
    }

    fn check(&self, source: &str) -> Result<(), PolicyViolation> {
        let policy = &self.policy;

        let length = source.chars().count();
        if length > policy.max_code_length {
            return Err(PolicyViolation::LengthExceeded {
                length,
                max: policy.max_code_length,
            });
        }

        if let Some(pattern) = policy.deny.iter().find(|p| p.regex.is_match(source)) {
            return Err(PolicyViolation::SecurityViolation {
                pattern: pattern.source.clone(),
            });
        }

        let scan = scan(source);
        if scan.max_depth > policy.max_nesting_depth {
            return Err(PolicyViolation::NestingExceeded {
                depth: scan.max_depth,
                max: policy.max_nesting_depth,
            });
        }

        let count = count_assigned_names(&scan.code);
        if count > policy.max_variables {
            return Err(PolicyViolation::TooManyVariables {
                count,
                max: policy.max_variables,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq)]
struct Scan {
    max_depth: usize,
    /// The source with string literals and comments blanked out.
    code: String,
}

/// Single pass over the source that tracks bracket depth outside of string
/// literals and comments. Unbalanced closers stop at zero.
fn scan(source: &str) -> Scan {
    let chars: Vec<char> = source.chars().collect();
    let mut scan = Scan {
        code: String::with_capacity(source.len()),
        ..Scan::default()
    };
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '\'' | '"' => {
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                i += if triple { 3 } else { 1 };
                while i < chars.len() {
                    match chars[i] {
                        '\\' => i += 2,
                        q if q == c && !triple => {
                            i += 1;
                            break;
                        }
                        q if q == c
                            && chars.get(i + 1) == Some(&c)
                            && chars.get(i + 2) == Some(&c) =>
                        {
                            i += 3;
                            break;
                        }
                        '\n' if !triple => break,
                        _ => i += 1,
                    }
                }
                scan.code.push(' ');
                continue;
            }
            '(' | '[' | '{' => {
                depth += 1;
                scan.max_depth = scan.max_depth.max(depth);
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        scan.code.push(c);
        i += 1;
    }
    scan
}

/// Distinct names directly followed by `=` or an augmented assignment.
/// Keyword arguments count too; in `a, b = 1, 2` only `b` does.
fn count_assigned_names(code: &str) -> usize {
    ASSIGNED_NAME
        .captures_iter(code)
        .filter(|captures| captures.get(3).is_none())
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn validator() -> PolicyValidator {
        PolicyValidator::new(Policy::from_config(&SandboxConfig::default()).unwrap())
    }

    fn validator_with(f: impl FnOnce(&mut SandboxConfig)) -> PolicyValidator {
        let mut config = SandboxConfig::default();
        f(&mut config);
        PolicyValidator::new(Policy::from_config(&config).unwrap())
    }

    #[test]
    fn test_accepts_ordinary_code() {
        let validator = validator();
        assert_eq!(validator.validate("x = 42\nprint(x)"), Ok(()));
        assert_eq!(validator.validate("model = reopen(1)"), Ok(()));
        assert_eq!(validator.validate("delta = 1\nasserted = True"), Ok(()));
    }

    #[test]
    fn test_deny_patterns() {
        let validator = validator();
        for source in [
            "import os",
            "from subprocess import run",
            "IMPORT SYS",
            "open('f', 'w')",
            "eval('1+1')",
            "del x",
            "__import__('os')",
        ] {
            assert!(
                matches!(
                    validator.validate(source),
                    Err(PolicyViolation::SecurityViolation { .. })
                ),
                "{} should be rejected",
                source
            );
        }
    }

    #[test]
    fn test_reports_configured_pattern() {
        let validator = validator();
        assert_eq!(
            validator.validate("x = open ('a')"),
            Err(PolicyViolation::SecurityViolation {
                pattern: r"\bopen\s*\(".to_string()
            })
        );
        assert!(validator.policy().deny_patterns().any(|p| p == r"\bopen\s*\("));
    }

    #[test]
    fn test_length_checked_first() {
        let validator = validator_with(|c| c.limits.max_code_length = 8);
        assert_eq!(
            validator.validate("import os"),
            Err(PolicyViolation::LengthExceeded { length: 9, max: 8 })
        );
    }

    #[test]
    fn test_nesting_skips_strings_and_comments() {
        let validator = validator_with(|c| c.limits.max_nesting_depth = 2);
        assert_eq!(validator.validate("x = [[1]]"), Ok(()));
        assert_eq!(validator.validate("s = '((((('  # [[[[["), Ok(()));
        assert_eq!(validator.validate("s = \"\"\"\n(((\n\"\"\""), Ok(()));
        assert_eq!(
            validator.validate("x = [[[1]]]"),
            Err(PolicyViolation::NestingExceeded { depth: 3, max: 2 })
        );
        assert_eq!(validator.validate(")))]]] + [[1]]"), Ok(()));
    }

    #[test]
    fn test_variable_count() {
        let validator = validator_with(|c| c.limits.max_variables = 2);
        assert_eq!(validator.validate("a = 1\nb = 2\na += 1\nb == a"), Ok(()));
        assert_eq!(
            validator.validate("a = 1\nb = 2\nc //= 3"),
            Err(PolicyViolation::TooManyVariables { count: 3, max: 2 })
        );
        assert_eq!(count_assigned_names("f(x=1, y=2)"), 2);
        assert_eq!(count_assigned_names("a, b = 1, 2"), 1);
        assert_eq!(count_assigned_names("x <= 1 or y != 2 or z >= 3"), 0);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let mut config = SandboxConfig::default();
        config.security.restricted_operations = vec!["(unclosed".to_string()];
        assert!(matches!(
            Policy::from_config(&config),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    proptest! {
        #[test]
        fn validate_never_panics(source in "\\PC{0,200}") {
            let _ = validator().validate(&source);
        }

        #[test]
        fn overlong_source_is_rejected(extra in 1usize..64, c in "[a-z(\\[{'\"#]") {
            let validator = validator_with(|config| config.limits.max_code_length = 32);
            let source = c.repeat(32 + extra);
            prop_assert_eq!(
                validator.validate(&source),
                Err(PolicyViolation::LengthExceeded { length: 32 + extra, max: 32 })
            );
        }
    }
}
