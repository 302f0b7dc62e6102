use cmdsrc_domain::command::{CommandAction, EntityType};
use cmdsrc_domain::error::DomainError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    // --- 调用方错误（400 类） ---
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("unrecognized query parameter: {name}={value}")]
    UnrecognizedParameter { name: String, value: String },

    // --- 认证/授权（401/403 类） ---
    #[error("authentication: {0}")]
    Authentication(String),

    #[error("permission denied: principal={principal}, permission={permission}")]
    PermissionDenied {
        principal: String,
        permission: String,
    },

    // --- 部署配置缺陷（500 类） ---
    #[error("unsupported command: entity={entity_type}, action={action}")]
    UnsupportedCommand {
        entity_type: EntityType,
        action: CommandAction,
    },

    #[error("handler already registered: entity={entity_type}, action={action}")]
    AlreadyRegisteredCommand {
        entity_type: EntityType,
        action: CommandAction,
    },

    #[error("handler not found: {0}")]
    HandlerNotFound(&'static str),

    #[error("handler already registered: query={query}")]
    AlreadyRegisteredQuery { query: &'static str },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("config: {0}")]
    Config(String),

    // --- 领域规则 ---
    #[error("domain: {0}")]
    Domain(#[source] DomainError),

    // --- 并发与基础设施 ---
    #[error("concurrent modification: {entity}#{id}")]
    ConcurrentModification { entity: String, id: i64 },

    #[error("audit persistence: {reason}")]
    AuditPersistence { reason: String },

    #[error("deadline exceeded before execution started")]
    DeadlineExceeded,
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::MalformedCommand { reason } => AppError::MalformedCommand(reason),
            DomainError::VersionConflict { entity, id, .. } | DomainError::Locked { entity, id } => {
                AppError::ConcurrentModification { entity, id }
            }
            other => AppError::Domain(other),
        }
    }
}

impl AppError {
    /// 错误类别（审计与日志中使用的稳定名称）
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MalformedCommand(_) | AppError::UnrecognizedParameter { .. } => "malformed",
            AppError::Authentication(_) => "authentication",
            AppError::PermissionDenied { .. } => "permission_denied",
            AppError::UnsupportedCommand { .. }
            | AppError::AlreadyRegisteredCommand { .. }
            | AppError::HandlerNotFound(_)
            | AppError::AlreadyRegisteredQuery { .. }
            | AppError::TypeMismatch { .. }
            | AppError::Config(_) => "unsupported",
            AppError::Domain(_) => "domain",
            AppError::ConcurrentModification { .. } => "concurrent_modification",
            AppError::AuditPersistence { .. } => "audit_persistence",
            AppError::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// 机器可读错误码
    pub fn code(&self) -> &str {
        match self {
            AppError::MalformedCommand(_) => "error.msg.malformed.command",
            AppError::UnrecognizedParameter { .. } => "error.msg.unrecognized.query.param",
            AppError::Authentication(_) => "error.msg.not.authenticated",
            AppError::PermissionDenied { .. } => "error.msg.not.authorized",
            AppError::Domain(err) => err.code(),
            AppError::ConcurrentModification { .. } => "error.msg.concurrent.modification",
            AppError::AuditPersistence { .. } => "error.msg.audit.persistence",
            AppError::DeadlineExceeded => "error.msg.deadline.exceeded",
            _ => "error.msg.unsupported.command",
        }
    }

    /// 对应的 HTTP 状态码类别
    pub fn status_class(&self) -> u16 {
        match self {
            AppError::MalformedCommand(_) | AppError::UnrecognizedParameter { .. } => 400,
            AppError::Authentication(_) => 401,
            AppError::PermissionDenied { .. } => 403,
            AppError::Domain(DomainError::NotFound { .. }) => 404,
            AppError::Domain(_) => 422,
            AppError::ConcurrentModification { .. } => 409,
            AppError::DeadlineExceeded => 504,
            _ => 500,
        }
    }

    /// 仅并发冲突建议调用方以新信封重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentModification { .. })
    }

    pub fn audit_persistence(reason: impl Into<String>) -> Self {
        AppError::AuditPersistence {
            reason: reason.into(),
        }
    }
}
