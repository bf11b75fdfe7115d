//! デプロイターゲット

use serde::{Deserialize, Serialize};

/// ユニットのデプロイ先アカウントとリージョン
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// アカウントID（`None` の場合はプロビジョニングCLIのプロファイルに従う）
    pub account: Option<String>,

    /// リージョン（us-east-1, us-west-2, ...）
    pub region: String,
}

impl Target {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            account: None,
            region: region.into(),
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.account {
            Some(account) => write!(f, "aws://{}/{}", account, self.region),
            None => write!(f, "aws://unknown-account/{}", self.region),
        }
    }
}
