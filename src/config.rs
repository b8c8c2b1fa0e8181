use serde::{Deserialize, Serialize};
use std::{env, fs::File, io::BufReader, path::Path, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid deny pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxConfig {
    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_allowed_builtins")]
    pub allowed_builtins: Vec<String>,

    #[serde(default = "default_restricted_operations")]
    pub restricted_operations: Vec<String>,

    #[serde(
        default = "default_max_execution_time",
        with = "duration_ms",
        rename = "max_execution_time_ms"
    )]
    pub max_execution_time: Duration,

    #[serde(default = "default_max_memory_usage")]
    pub max_memory_usage: usize,

    #[serde(default = "default_private_prefix")]
    pub private_prefix: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_builtins: default_allowed_builtins(),
            restricted_operations: default_restricted_operations(),
            max_execution_time: default_max_execution_time(),
            max_memory_usage: default_max_memory_usage(),
            private_prefix: default_private_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_code_length")]
    pub max_code_length: usize,

    #[serde(default = "default_max_variables")]
    pub max_variables: usize,

    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_code_length: default_max_code_length(),
            max_variables: default_max_variables(),
            max_nesting_depth: default_max_nesting_depth(),
            max_recursion_depth: default_max_recursion_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_dir: default_session_dir(),
        }
    }
}

impl SandboxConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        from_file(path)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> ConfigResult<Self> {
        from_str(s)
    }

    /// Applies `SECTION_KEY` environment overrides, e.g. `LIMITS_MAX_CODE_LENGTH=2000`.
    ///
    /// Unset variables leave the field alone. Values that fail to parse are
    /// logged and ignored.
    pub fn load_from_env(self) -> Self {
        self.load_from(|key| env::var(key).ok())
    }

    pub(crate) fn load_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let security = &mut self.security;
        override_list(&lookup, "SECURITY_ALLOWED_BUILTINS", &mut security.allowed_builtins);
        override_list(
            &lookup,
            "SECURITY_RESTRICTED_OPERATIONS",
            &mut security.restricted_operations,
        );
        let mut millis = security.max_execution_time.as_millis() as u64;
        if override_parsed(&lookup, "SECURITY_MAX_EXECUTION_TIME_MS", &mut millis) {
            security.max_execution_time = Duration::from_millis(millis);
        }
        // seconds, fractional allowed
        let mut seconds = security.max_execution_time.as_secs_f64();
        if override_parsed(&lookup, "SECURITY_MAX_EXECUTION_TIME", &mut seconds) {
            if seconds.is_finite() && seconds > 0.0 {
                security.max_execution_time = Duration::from_secs_f64(seconds);
            } else {
                warn!("Ignoring SECURITY_MAX_EXECUTION_TIME={}", seconds);
            }
        }
        override_parsed(&lookup, "SECURITY_MAX_MEMORY_USAGE", &mut security.max_memory_usage);
        override_parsed(&lookup, "SECURITY_PRIVATE_PREFIX", &mut security.private_prefix);

        let limits = &mut self.limits;
        override_parsed(&lookup, "LIMITS_MAX_CODE_LENGTH", &mut limits.max_code_length);
        override_parsed(&lookup, "LIMITS_MAX_VARIABLES", &mut limits.max_variables);
        override_parsed(&lookup, "LIMITS_MAX_NESTING_DEPTH", &mut limits.max_nesting_depth);
        override_parsed(
            &lookup,
            "LIMITS_MAX_RECURSION_DEPTH",
            &mut limits.max_recursion_depth,
        );

        let mut dir = self.session.session_dir.display().to_string();
        if override_parsed(&lookup, "SESSION_SESSION_DIR", &mut dir) {
            self.session.session_dir = PathBuf::from(dir);
        }
        self
    }

    /// Checks ceilings and compiles every deny pattern once.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("limits.max_code_length", self.limits.max_code_length),
            ("limits.max_variables", self.limits.max_variables),
            ("limits.max_nesting_depth", self.limits.max_nesting_depth),
            ("limits.max_recursion_depth", self.limits.max_recursion_depth),
            ("security.max_memory_usage", self.security.max_memory_usage),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.security.max_execution_time.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "security.max_execution_time".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        for pattern in &self.security.restricted_operations {
            regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> bool
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return false;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            *target = value;
            true
        }
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            false
        }
    }
}

fn override_list<F>(lookup: &F, key: &str, target: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect();
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> ConfigResult<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> ConfigResult<T> {
    Ok(serde_json::from_str(s)?)
}

fn default_allowed_builtins() -> Vec<String> {
    [
        "abs", "all", "any", "bin", "bool", "chr", "dict", "divmod", "enumerate", "filter",
        "float", "hex", "int", "len", "list", "map", "max", "min", "oct", "ord", "pow", "print",
        "range", "repr", "round", "set", "slice", "sorted", "str", "sum", "tuple", "type", "zip",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_restricted_operations() -> Vec<String> {
    [
        r"\bimport\s+(os|sys|subprocess|shutil|glob|pathlib)\b",
        r"\bfrom\s+(os|sys|subprocess|shutil|glob|pathlib)\b",
        r"\bopen\s*\(",
        r"\bexec\s*\(",
        r"\beval\s*\(",
        r"\bcompile\s*\(",
        r"\bglobals\s*\(",
        r"\blocals\s*\(",
        r"__import__\s*\(",
        r"\bdel\s+",
        r"\bassert\s+",
        r"\braise\s+",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_execution_time() -> Duration {
    Duration::from_secs(5)
}

fn default_max_memory_usage() -> usize {
    100 * 1024 * 1024
}

fn default_private_prefix() -> String {
    "_".to_string()
}

fn default_max_code_length() -> usize {
    10_000
}

fn default_max_variables() -> usize {
    100
}

fn default_max_nesting_depth() -> usize {
    10
}

fn default_max_recursion_depth() -> usize {
    200
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("sessions")
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
