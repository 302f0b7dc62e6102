//! 认证接入点
//!
//! 令牌校验等细节由外部协作方完成，核心只消费其结果：当前已认证的主体。
//!
use crate::error::AppError;
use async_trait::async_trait;
use cmdsrc_domain::principal::Principal;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// 当前请求的已认证主体；未认证时返回 `AppError::Authentication`
    async fn authenticated_user(&self) -> Result<Principal, AppError>;
}

/// 固定主体（测试与本地演示）
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    principal: Option<Principal>,
}

impl StaticAuthenticator {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    /// 始终未认证
    pub fn unauthenticated() -> Self {
        Self { principal: None }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticated_user(&self) -> Result<Principal, AppError> {
        self.principal
            .clone()
            .ok_or_else(|| AppError::Authentication("no authenticated user".into()))
    }
}
