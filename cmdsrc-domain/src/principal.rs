use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 授予全部权限的超级权限码
pub const ALL_FUNCTIONS: &str = "ALL_FUNCTIONS";
/// 授予全部只读权限（`READ_*`）的权限码
pub const ALL_FUNCTIONS_READ: &str = "ALL_FUNCTIONS_READ";

/// 已认证的操作主体
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    username: String,
    permissions: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, S>(username: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            username: username.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// 无任何权限的匿名主体
    pub fn anonymous() -> Self {
        Self::new("anonymous", Vec::<String>::new())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.contains(ALL_FUNCTIONS)
            || self.permissions.contains(code)
            || (code.starts_with("READ_") && self.permissions.contains(ALL_FUNCTIONS_READ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_permission_is_granted() {
        let p = Principal::new("teller", ["WAIVE_LOANCHARGE"]);
        assert!(p.has_permission("WAIVE_LOANCHARGE"));
        assert!(!p.has_permission("DELETE_LOANCHARGE"));
    }

    #[test]
    fn super_user_codes() {
        let admin = Principal::new("mifos", [ALL_FUNCTIONS]);
        assert!(admin.has_permission("DELETE_LOANCHARGE"));

        let auditor = Principal::new("auditor", [ALL_FUNCTIONS_READ]);
        assert!(auditor.has_permission("READ_LOAN"));
        assert!(!auditor.has_permission("CREATE_LOANCHARGE"));
    }

    #[test]
    fn anonymous_has_nothing() {
        assert!(!Principal::anonymous().has_permission("READ_LOAN"));
    }
}
