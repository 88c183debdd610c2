//! RBAC ヘルパー: エンドポイントに宣言したロールと Principal の照合。

use crate::error::AuthError;
use crate::principal::Principal;

/// Principal に指定のレルムロールが含まれるかを判定する。
pub fn has_role(principal: &Principal, role: &str) -> bool {
    principal.has_role(role)
}

/// RoleRequirement はルート登録時に付与する必須ロール。登録後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequirement {
    role: String,
}

impl RoleRequirement {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Principal が必須ロールを持たなければ InsufficientRole を返す。
    pub fn check(&self, principal: &Principal) -> Result<(), AuthError> {
        if has_role(principal, &self.role) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole {
                role: self.role.clone(),
            })
        }
    }
}
