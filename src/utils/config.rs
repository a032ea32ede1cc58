//! 配置管理模块
//!
//! 账户/经纪商/行情服务器列表与不区分今昨仓合约的豁免表，由外部
//! 配置文件载入后以普通结构体交给交易系统。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{AccountInfo, BrokerInfo, Ticker};
use crate::{ConfigError, Result};

/// 交易系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraderConfig {
    /// 账户列表
    #[serde(default)]
    pub accounts: Vec<AccountInfo>,

    /// 经纪商列表
    #[serde(default)]
    pub brokers: Vec<BrokerInfo>,

    /// 行情服务器地址列表
    #[serde(default)]
    pub md_server_addrs: Vec<String>,

    /// 不区分今昨仓的合约（此类合约只报普通平仓）
    #[serde(default)]
    pub no_close_today_tickers: Vec<Ticker>,
}

impl TraderConfig {
    /// 从 TOML 文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = toml::from_str(&content).map_err(|e| ConfigError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 测试配置文件解析
    #[test]
    fn test_load_config() {
        let text = r#"
md_server_addrs = ["tcp://180.168.146.187:10131"]
no_close_today_tickers = ["IF2601"]

[[brokers]]
broker_name = "simnow"
broker_id = "9999"
trade_server_addrs = ["tcp://180.168.146.187:10130"]
query_rate_per_second = 2

[[accounts]]
account_name = "test01"
broker_name = "simnow"
account_number = "123456"
password = "pass"
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let config = TraderConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.brokers.len(), 1);
        assert_eq!(config.brokers[0].broker_id, "9999");
        assert_eq!(config.brokers[0].query_rate_per_second, 2);
        assert_eq!(config.accounts.len(), 1);
        assert!(config.accounts[0].enable);
        assert_eq!(config.md_server_addrs.len(), 1);
        assert_eq!(config.no_close_today_tickers, vec!["IF2601".to_string()]);
    }

    /// 缺失文件报 Io 配置错误
    #[test]
    fn test_load_missing_file() {
        let err = TraderConfig::load_from_file("/nonexistent/uts.toml").unwrap_err();
        assert!(matches!(
            err,
            crate::TraderError::Config(ConfigError::Io { .. })
        ));
    }

    /// 语法错误报 Malformed 配置错误
    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"accounts = not-a-list").unwrap();
        let err = TraderConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            crate::TraderError::Config(ConfigError::Malformed { .. })
        ));
    }
}
