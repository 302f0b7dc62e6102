//! 运行配置（Settings）
//!
//! 读取顺序：内置默认值 → `cmdsrc.toml`（或 `CMDSRC__CONFIG` 指定的路径）→ `CMDSRC__*` 环境变量。
//!
//! 环境变量以 `__` 分隔层级：
//!
//! ```text
//! CMDSRC__DISPATCH_TIMEOUT_MS=1500
//! CMDSRC__PERMISSIONS__LOANCHARGE__WAIVE=WAIVE_CHARGES    # [permissions] "LOANCHARGE.WAIVE"
//! CMDSRC__READ_RESOURCES__LOANCHARGE=LOAN                 # [read_resources] LOANCHARGE
//! ```
//!
use crate::error::AppError;
use chrono::Duration;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "cmdsrc.toml";
/// `dispatch_timeout_ms` 上限（24 小时）
pub const MAX_DISPATCH_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

const ENV_PREFIX: &str = "CMDSRC__";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 单次分发在开始执行前允许等待的最长时间（毫秒）；缺省不限时
    pub dispatch_timeout_ms: Option<u64>,
    /// 权限码覆盖：`"ENTITY.ACTION" = "PERMISSION_CODE"`
    pub permissions: BTreeMap<String, String>,
    /// 读权限共享资源：`ENTITY = "RESOURCE"`
    pub read_resources: BTreeMap<String, String>,
}

impl Settings {
    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let settings: Self = toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// 从文件加载；文件不存在时返回默认值
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read '{}': {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// 应用 `CMDSRC__*` 环境变量覆盖
    pub fn apply_env(&mut self) -> Result<(), AppError> {
        self.apply_vars(std::env::vars())
    }

    /// 应用形如 `CMDSRC__*` 的键值覆盖；不带前缀的键忽略
    pub fn apply_vars<I, K, V>(&mut self, vars: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            if name == "CONFIG" {
                continue;
            } else if name == "DISPATCH_TIMEOUT_MS" {
                let parsed = value
                    .parse::<u64>()
                    .map_err(|e| AppError::Config(format!("{key}='{value}': {e}")))?;
                self.dispatch_timeout_ms = Some(parsed);
            } else if let Some(path) = name.strip_prefix("PERMISSIONS__") {
                let Some((entity, action)) = path.split_once("__") else {
                    return Err(AppError::Config(format!(
                        "{key}: expected {ENV_PREFIX}PERMISSIONS__<ENTITY>__<ACTION>"
                    )));
                };
                self.permissions
                    .insert(format!("{entity}.{action}"), value.to_string());
            } else if let Some(entity) = name.strip_prefix("READ_RESOURCES__") {
                self.read_resources
                    .insert(entity.to_string(), value.to_string());
            } else {
                warn!(key, "ignoring unknown configuration override");
            }
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), AppError> {
        match self.dispatch_timeout_ms {
            Some(ms) if ms > MAX_DISPATCH_TIMEOUT_MS => Err(AppError::Config(format!(
                "dispatch_timeout_ms = {ms} exceeds {MAX_DISPATCH_TIMEOUT_MS}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_ms
            .and_then(|ms| i64::try_from(ms).ok())
            .map(Duration::milliseconds)
    }
}

/// 按默认顺序加载配置
pub fn load_settings() -> Result<Settings, AppError> {
    let path = std::env::var("CMDSRC__CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let mut settings = Settings::load_from(path)?;
    settings.apply_env()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert!(settings.dispatch_timeout_ms.is_none());
        assert!(settings.permissions.is_empty());
        assert!(settings.dispatch_timeout().is_none());
    }

    #[test]
    fn parses_all_sections() {
        let settings = Settings::from_toml_str(
            r#"
            dispatch_timeout_ms = 1500

            [permissions]
            "LOANCHARGE.DELETE" = "DELETE_CHARGES"
            "#,
        )
        .unwrap();
        assert_eq!(settings.dispatch_timeout(), Some(Duration::milliseconds(1500)));
        assert_eq!(
            settings.permissions.get("LOANCHARGE.DELETE").map(String::as_str),
            Some("DELETE_CHARGES")
        );
    }

    #[test]
    fn invalid_document_is_a_config_error() {
        let err = Settings::from_toml_str("dispatch_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn oversized_timeout_is_a_config_error() {
        let err = Settings::from_toml_str("dispatch_timeout_ms = 9000000000000000").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let mut settings = Settings::default();
        let err = settings
            .apply_vars([("CMDSRC__DISPATCH_TIMEOUT_MS", "9000000000000000")])
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let at_limit = format!("dispatch_timeout_ms = {MAX_DISPATCH_TIMEOUT_MS}");
        assert!(Settings::from_toml_str(&at_limit).is_ok());
    }

    #[test]
    fn env_overrides_cover_every_section() {
        let mut settings = Settings::from_toml_str(
            r#"
            dispatch_timeout_ms = 10

            [permissions]
            "LOANCHARGE.DELETE" = "DELETE_CHARGES"
            "#,
        )
        .unwrap();
        settings
            .apply_vars([
                ("CMDSRC__DISPATCH_TIMEOUT_MS", " 1500 "),
                ("CMDSRC__PERMISSIONS__LOANCHARGE__WAIVE", "WAIVE_CHARGES"),
                ("CMDSRC__READ_RESOURCES__LOANCHARGE", "LOAN"),
                ("CMDSRC__CONFIG", "elsewhere.toml"),
                ("HOME", "/root"),
            ])
            .unwrap();

        assert_eq!(settings.dispatch_timeout_ms, Some(1500));
        assert_eq!(
            settings.permissions.get("LOANCHARGE.WAIVE").map(String::as_str),
            Some("WAIVE_CHARGES")
        );
        assert_eq!(
            settings.permissions.get("LOANCHARGE.DELETE").map(String::as_str),
            Some("DELETE_CHARGES")
        );
        assert_eq!(
            settings.read_resources.get("LOANCHARGE").map(String::as_str),
            Some("LOAN")
        );
    }

    #[test]
    fn malformed_env_override_is_a_config_error() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.apply_vars([("CMDSRC__DISPATCH_TIMEOUT_MS", "soon")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            settings.apply_vars([("CMDSRC__PERMISSIONS__LOANCHARGE", "X")]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("cmdsrc_settings_{suffix}.toml"));

        assert!(Settings::load_from(&path).unwrap().permissions.is_empty());

        fs::write(&path, "dispatch_timeout_ms = 10\n").expect("write config");
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.dispatch_timeout_ms, Some(10));

        fs::remove_file(path).expect("cleanup");
    }
}
