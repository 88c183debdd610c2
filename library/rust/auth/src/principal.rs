//! 検証済みトークンから導出する主体情報。

use crate::claims::Claims;
use crate::error::AuthError;
use serde::Serialize;
use std::collections::BTreeSet;

/// Principal は署名・Claim 検証をすべて通過したトークンの主体を表す。
///
/// 生成は検証器からのみ行う。未検証の Principal は存在しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    subject: String,
    email: Option<String>,
    preferred_username: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    roles: BTreeSet<String>,
}

impl Principal {
    /// 検証済み Claims から Principal を組み立てる。sub が空なら失敗する。
    pub(crate) fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let roles = claims.realm_roles().iter().cloned().collect();
        let subject = claims
            .sub
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthError::MissingSubject)?;

        Ok(Self {
            subject,
            email: claims.email,
            preferred_username: claims.preferred_username,
            given_name: claims.given_name,
            family_name: claims.family_name,
            roles,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn preferred_username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }

    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// 名と姓を空白で連結した表示名。どちらも無ければ空文字列。
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or(""),
            self.family_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Principal{{sub={}, username={:?}, roles={:?}}}",
            self.subject, self.preferred_username, self.roles,
        )
    }
}

#[cfg(test)]
pub(crate) fn test_principal(subject: &str, roles: &[&str]) -> Principal {
    Principal {
        subject: subject.into(),
        email: None,
        preferred_username: None,
        given_name: None,
        family_name: None,
        roles: roles.iter().map(|r| (*r).to_string()).collect(),
    }
}
