//! 领域层统一错误定义
//!
//! 聚焦命令结构校验、业务规则拒绝、并发冲突与状态校验等最小必要集合，
//! 每个变体都携带稳定的机器可读错误码（`code()`），便于接口层返回给调用方。
//!
use crate::value_object::Version;
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化/解析 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 命令结构 ---
    #[error("malformed command: {reason}")]
    MalformedCommand { reason: String },

    // --- 领域规则/状态 ---
    #[error("validation failed: parameter={parameter}, reason={reason}")]
    Validation { parameter: String, reason: String },
    #[error("business rule violated: code={code}, reason={reason}")]
    Rule { code: String, reason: String },
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("not found: {entity}#{id}")]
    NotFound { entity: String, id: i64 },

    // --- 并发控制 ---
    #[error("version conflict: {entity}#{id}, expected={expected}, actual={actual}")]
    VersionConflict {
        entity: String,
        id: i64,
        expected: Version,
        actual: Version,
    },
    #[error("row locked by an in-flight command: {entity}#{id}")]
    Locked { entity: String, id: i64 },
}

impl DomainError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCommand {
            reason: reason.into(),
        }
    }

    pub fn validation(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn rule(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rule {
            code: code.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: i64) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// 机器可读的错误码
    pub fn code(&self) -> &str {
        match self {
            Self::Serde { .. } | Self::Parse { .. } => "error.msg.invalid.json",
            Self::MalformedCommand { .. } => "error.msg.malformed.command",
            Self::Validation { .. } => "validation.msg.validation.errors.exist",
            Self::Rule { code, .. } => code,
            Self::InvalidState { .. } => "error.msg.invalid.state",
            Self::NotFound { .. } => "error.msg.resource.not.found",
            Self::VersionConflict { .. } | Self::Locked { .. } => {
                "error.msg.concurrent.modification"
            }
        }
    }

    /// 是否为并发冲突（乐观锁版本不一致或行被占用）
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::Locked { .. })
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

impl From<std::num::ParseIntError> for DomainError {
    fn from(err: std::num::ParseIntError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for DomainError {
    fn from(err: chrono::ParseError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}
