use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 命令动作
///
/// 新增动作时需同步补充权限表与处理器注册，编译器会在 `match` 处提示遗漏。
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandAction {
    Create,
    Update,
    Waive,
    Delete,
}

impl CommandAction {
    pub const ALL: [CommandAction; 4] = [Self::Create, Self::Update, Self::Waive, Self::Delete];

    /// 稳定的线上名称（用于权限码、日志与审计）
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Waive => "WAIVE",
            Self::Delete => "DELETE",
        }
    }

    /// 除 CREATE 外，所有动作都必须指明目标实体
    pub const fn requires_target(&self) -> bool {
        !matches!(self, Self::Create)
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::malformed(format!("unknown command action '{wanted}'")))
    }
}
