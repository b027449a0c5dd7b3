//! セッション設定

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// ロールアウトのデフォルト予算（ミリ秒）
pub const DEFAULT_ROLLOUT_BUDGET_MS: u64 = 20_000;

/// 停止位置の取り込み（再開し直し）のデフォルト上限
pub const DEFAULT_MAX_POSITION_ADOPTIONS: u32 = 16;

/// デバッグセッションの設定
///
/// TOML から読み込めます。省略したキーはデフォルト値になります。
///
/// ```toml
/// rollout_budget_ms = 20000
/// max_position_adoptions = 16
/// thread_name_prefix = "procdbg"
/// target_auto_commit = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// 終了時のステップアウトループに許す壁時計時間
    pub rollout_budget_ms: u64,
    /// サスペンド解決で古い位置を取り込み直す最大回数
    pub max_position_adoptions: u32,
    /// ワーカースレッド名の接頭辞
    pub thread_name_prefix: String,
    /// ターゲット接続の自動コミット
    pub target_auto_commit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rollout_budget_ms: DEFAULT_ROLLOUT_BUDGET_MS,
            max_position_adoptions: DEFAULT_MAX_POSITION_ADOPTIONS,
            thread_name_prefix: "procdbg".to_string(),
            target_auto_commit: false,
        }
    }
}

impl SessionConfig {
    /// ロールアウト予算
    pub fn rollout_budget(&self) -> Duration {
        Duration::from_millis(self.rollout_budget_ms)
    }

    /// TOML 文字列から設定を読み込む
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(s).context("Invalid session configuration")?;
        Ok(config)
    }

    /// TOML ファイルから設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Failed to load {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.rollout_budget(), Duration::from_secs(20));
        assert_eq!(config.max_position_adoptions, 16);
        assert!(!config.target_auto_commit);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SessionConfig::from_toml_str("rollout_budget_ms = 500").unwrap();
        assert_eq!(config.rollout_budget(), Duration::from_millis(500));
        assert_eq!(config.thread_name_prefix, "procdbg");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(SessionConfig::from_toml_str("rollout_budget = 5").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_position_adoptions = 3").unwrap();
        writeln!(file, "thread_name_prefix = \"dbg\"").unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.max_position_adoptions, 3);
        assert_eq!(config.thread_name_prefix, "dbg");
    }

    #[test]
    fn test_load_missing_file() {
        let err = SessionConfig::load("/nonexistent/procdbg.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
