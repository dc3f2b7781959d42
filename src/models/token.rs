use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// トークンの用途
///
/// 同じ所有者でも用途ごとにトークンを分離する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    /// DB に保存される文字列表現
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Authentication => "authentication",
            Self::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 ダイジェスト
pub type TokenHash = [u8; 32];

/// 平文トークンのSHA-256ダイジェストを計算
///
/// 保存・照合の両方でこの関数を使う。
pub fn digest(plaintext: &str) -> TokenHash {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// 発行済みトークン
///
/// 平文（plaintext）は発行時に一度だけ呼び出し側へ返し、DBには保存しない。
/// 外部へシリアライズされるのは `token` と `expiry` のみ。
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub owner_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
    #[serde(skip)]
    pub scope: Scope,
}

// 平文がログに混入しないよう Debug は手書きする
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token() -> Token {
        Token {
            plaintext: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string(),
            hash: [7u8; 32],
            owner_id: 42,
            expiry: OffsetDateTime::UNIX_EPOCH,
            scope: Scope::Activation,
        }
    }

    #[test]
    fn test_wire_shape_exposes_only_token_and_expiry() {
        let value = serde_json::to_value(sample_token()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 2);
        assert_eq!(object["token"], "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(object["expiry"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_debug_redacts_plaintext() {
        let debug = format!("{:?}", sample_token());
        assert!(!debug.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_scope_strings() {
        assert_eq!(Scope::Activation.as_str(), "activation");
        assert_eq!(Scope::Authentication.to_string(), "authentication");
        assert_eq!(Scope::PasswordReset.as_str(), "password-reset");
    }
}
