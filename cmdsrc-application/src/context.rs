use chrono::{DateTime, Duration, Utc};
use cmdsrc_domain::business_context::BusinessContext;
use cmdsrc_domain::principal::Principal;

/// 应用层上下文（Application Context）
///
/// 承载一次应用层调用（命令/查询）所需的横切信息，显式传入而非依赖全局单例：
/// - 主体（`principal`）：已认证的操作者，权限校验与审计均以其为准；
/// - 业务语境（`BusinessContext`）：关联追踪 `correlation_id`、因果链 `causation_id`；
/// - 截止时间（`deadline`）：仅在开始执行前检查，执行开始后不可中断。
///
/// 典型用法：
/// ```rust
/// use cmdsrc_application::context::AppContext;
/// use cmdsrc_domain::principal::Principal;
///
/// let ctx = AppContext::for_principal(Principal::new("mifos", ["ALL_FUNCTIONS"]));
/// assert!(ctx.biz.correlation_id().is_some());
/// assert!(!ctx.deadline_passed());
/// ```
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub principal: Principal,
    pub biz: BusinessContext,
    pub deadline: Option<DateTime<Utc>>,
}

impl AppContext {
    /// 为主体创建上下文，并生成新的关联ID
    pub fn for_principal(principal: Principal) -> Self {
        Self {
            principal,
            biz: BusinessContext::builder()
                .correlation_id(uuid::Uuid::new_v4().to_string())
                .channel("api".to_string())
                .build(),
            deadline: None,
        }
    }

    /// 设置相对超时；`None` 或超出时间范围均表示不限时
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.and_then(|t| Utc::now().checked_add_signed(t));
        self
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Utc::now() >= d)
    }
}
