//! 系统快照
//!
//! 把所有账户的资金/持仓/成交/委托/手续费率，连同合约信息与最新
//! 行情，序列化为一份结构化文档。价格以 JSON 数值原样写出，读回后
//! 键与数量不丢失。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::account::TradingAccount;
use crate::core::{
    CapitalInfo, HoldingRecord, InstrumentCommissionRate, InstrumentInfo, MarketDepth,
    OrderRecord, Ticker, TradingRecord,
};
use crate::Result;

/// 单账户快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// 账户名
    pub account_name: String,
    /// 经纪商名称
    pub broker_name: String,
    /// 资金状况
    pub capital: CapitalInfo,
    /// 持仓记录
    pub holding: Vec<HoldingRecord>,
    /// 成交记录
    pub trades: Vec<TradingRecord>,
    /// 委托记录
    pub orders: Vec<OrderRecord>,
    /// 手续费率
    pub commission_rate: Vec<InstrumentCommissionRate>,
}

impl AccountSnapshot {
    /// 采集一个账户的当前状态
    pub fn capture(account: &TradingAccount) -> Self {
        if !account.is_logged_in() {
            log::warn!(
                "{}: not logged in, exported info would be empty",
                account.id()
            );
        }
        Self {
            account_name: account.account_name().to_string(),
            broker_name: account.broker_name().to_string(),
            capital: account.capital(),
            holding: account.holding().into_values().collect(),
            trades: account.trades(),
            orders: account.orders().into_values().collect(),
            commission_rate: account.commission_rates().into_values().collect(),
        }
    }
}

/// 交易系统快照文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// 各账户状态
    pub account_info: Vec<AccountSnapshot>,
    /// 合约信息
    pub instrument_info: BTreeMap<Ticker, InstrumentInfo>,
    /// 最新行情
    pub market_data: BTreeMap<Ticker, MarketDepth>,
}

impl SystemSnapshot {
    /// 写入指定路径（带缩进的 JSON）
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), text)?;
        log::info!("Current info logged to {}", path.as_ref().display());
        Ok(())
    }

    /// 从文件读回快照
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Direction, Exchange, HedgeFlag, OpenClose};

    fn sample_snapshot() -> SystemSnapshot {
        let mut market_data = BTreeMap::new();
        let mut depth = MarketDepth::default();
        depth.instrument_id = "cu2612".to_string();
        depth.ohlclvt.last = 71234.5;
        market_data.insert("cu2612".to_string(), depth);

        SystemSnapshot {
            account_info: vec![AccountSnapshot {
                account_name: "acct".to_string(),
                broker_name: "broker".to_string(),
                capital: CapitalInfo {
                    balance: 1_000_000.25,
                    margin_used: 120_000.5,
                    available: 879_999.75,
                    commission: 35.75,
                    withdraw_allowance: 800_000.0,
                },
                holding: vec![HoldingRecord {
                    exchange: Exchange::SHFE,
                    instrument_id: "cu2612".to_string(),
                    direction: Direction::Long,
                    hedge_flag: HedgeFlag::Speculation,
                    total_quantity: 5,
                    today_quantity: 2,
                    pre_quantity: 3,
                }],
                trades: vec![TradingRecord {
                    order_ref: 1,
                    exchange: Exchange::SHFE,
                    instrument_id: "cu2612".to_string(),
                    open_close: OpenClose::Open,
                    direction: Direction::Long,
                    hedge_flag: HedgeFlag::Speculation,
                    price: 71230.0,
                    volume: 2,
                    time: "2026-08-06 10:00:00.000".to_string(),
                }],
                orders: vec![],
                commission_rate: vec![],
            }],
            instrument_info: BTreeMap::new(),
            market_data,
        }
    }

    /// 快照写出读回后键与数量一致，价格无精度损失
    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let snapshot = sample_snapshot();
        snapshot.dump(&path).unwrap();
        let loaded = SystemSnapshot::load(&path).unwrap();

        assert_eq!(loaded.account_info.len(), 1);
        let account = &loaded.account_info[0];
        assert_eq!(account.account_name, "acct");
        assert_eq!(account.holding.len(), 1);
        assert_eq!(account.trades.len(), 1);
        assert_eq!(account.capital.balance, 1_000_000.25);
        assert!((account.trades[0].price - 71230.0).abs() < 1e-9);

        let keys: Vec<&String> = loaded.market_data.keys().collect();
        assert_eq!(keys, vec!["cu2612"]);
        assert_eq!(loaded.market_data["cu2612"].ohlclvt.last, 71234.5);
    }
}
