//! Keycloak が発行するアクセストークンの Claims 構造体。
//!
//! exp / iss / aud / nbf は jsonwebtoken が検証時に独自に読み出すため、
//! ここでは Principal の組み立てに使う Claim のみを保持する。

use serde::{Deserialize, Deserializer, Serialize};

/// RealmAccess は Keycloak の realm_access Claim を表す。
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RealmAccess {
    /// null は空のロール集合として扱う
    #[serde(default, deserialize_with = "null_as_empty")]
    pub roles: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Claims は検証済みトークンから読み出す Claim の集合。
///
/// 必須項目の欠落はデシリアライズではなく検証器で判定するため、
/// sub も Option で受ける。
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Claims {
    /// ユーザーの一意識別子
    #[serde(default)]
    pub sub: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    /// グローバルロール
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

impl Claims {
    /// realm_access のロール一覧を返す。Claim が無ければ空。
    pub fn realm_roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map(|ra| ra.roles.as_slice())
            .unwrap_or(&[])
    }
}
