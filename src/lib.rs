//! # QATRADER-RS
//!
//! 多账户期货交易客户端：把"请求 + 异步回调"式的柜台网关协议封装成
//! 同步、有状态的账户 API。
//!
//! ## 核心能力
//!
//! - **异步同步化**: 条件变量阻塞调用线程，等待配对回调，支持超时重试
//! - **账户连接**: 连接 → 认证 → 登录 → 结算单确认 状态机与登录错误分类
//! - **订单/持仓**: 委托状态机、可撤集合、交易所差异化的今昨仓结算规则
//! - **灵活订单**: 自动开平拆单、相对价格解析、tick/涨跌停校验
//! - **请求限速**: 滑动窗口限制出站请求频率
//! - **多账户调度**: 并行登录/查询、批量清仓、全量撤单、快照导出
//! - **行情**: 单行情源多账户共享的深度快照表，tick 记录器分发
//!
//! ## 架构设计
//!
//! ```text
//! 应用调用
//!     ↓
//! TradingSystem (system/)
//!     ↓
//! TradingAccount (account/) ←→ AdvancedOrderPlanner (planner/)
//!     ↓                              ↑
//! AsyncQueryManager / RateThrottler  │ 深度快照
//!     ↓                              │
//! TraderGateway / MdGateway (gateway/) → MarketDataFeed (market/)
//! ```

// ============================================================================
// 内部模块
// ============================================================================

/// 核心数据模型
pub mod core;

/// 网关接口边界（交易/行情 SDK 抽象与进程内模拟实现）
pub mod gateway;

/// 交易账户：连接状态机、台账、异步查询、限速
pub mod account;

/// 行情源：订阅管理与深度快照归一化
pub mod market;

/// 灵活订单处理
pub mod planner;

/// 多账户交易系统
pub mod system;

/// 工具模块
pub mod utils;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use crate::core::{
    AccountInfo, AccountKey, BrokerInfo, CapitalInfo, ConnectionStatus, Direction, Exchange,
    HedgeFlag, HoldingRecord, InstrumentCommissionRate, InstrumentIndex, InstrumentInfo,
    MarketDepth, OpenClose, Order, OrderIndex, OrderPriceType, OrderRecord, OrderStatus, Ticker,
    TimeInForce, TradingRecord,
};
pub use account::TradingAccount;
pub use market::MarketDataFeed;
pub use system::TradingSystem;

// ============================================================================
// 全局错误类型
// ============================================================================

/// 配置错误：对受影响的初始化步骤是致命的
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: cannot be read: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: cannot be parsed as config file: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Could not find broker info for {0}")]
    MissingBroker(String),

    #[error("Gateway returned malformed instrument data, the server endpoint is likely misconfigured")]
    MalformedInstrumentData,
}

/// 登录错误：按账户报告，不影响其他账户的登录
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("{0}: Authorization failed")]
    AuthorizationFailure(String),

    #[error("{0}: Account number or password invalid")]
    WrongCredentials(String),

    #[error("{0}: Password too weak, change it before logging in")]
    WeakPassword(String),

    #[error("{0}: Need to change password at first login")]
    FirstLoginPasswordChangeRequired(String),

    #[error("{0}: Password expired")]
    PasswordExpired(String),

    #[error("{0}: Login requests from this IP are rate limited")]
    IpLimited(String),

    #[error("{0}: This IP is banned by the server")]
    IpBanned(String),

    #[error("{0}: Unknown login error, see log for details")]
    Unknown(String),
}

/// 委托错误：同步返回给调用方
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("{account}: {reason}")]
    Info { account: String, reason: String },

    #[error("{0}: Cannot cancel order, unknown order index")]
    UnknownOrderRef(String),

    #[error("{0}: Order rejected by gateway")]
    RejectedByGateway(String),

    #[error("{0}: Order rejected by exchange")]
    RejectedByExchange(String),
}

impl OrderError {
    /// 构造订单信息错误
    pub fn info(account: impl Into<String>, reason: impl Into<String>) -> Self {
        OrderError::Info {
            account: account.into(),
            reason: reason.into(),
        }
    }
}

/// 系统使用错误：编程/用法错误，总是上抛
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("{0} is not registered in the system")]
    AccountNotRegistered(String),

    #[error("{0} is not logged in")]
    AccountNotLoggedIn(String),

    #[error("Server return data unrecognized")]
    UnknownReturnData,
}

/// 交易客户端错误
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Login(#[from] LoginError),

    #[error(transparent)]
    Order(#[from] OrderError),

    /// 需要确定性应答的请求线在重试额度内始终超时
    #[error("{0}: Unable to connect to server, check your network connection and server address")]
    Network(String),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TraderError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// 错误族可经顶层错误透明转发
    #[test]
    fn test_error_conversions() {
        let err: TraderError = LoginError::WrongCredentials("acct - broker".to_string()).into();
        assert!(matches!(err, TraderError::Login(_)));
        assert!(err.to_string().contains("Account number or password invalid"));

        let err: TraderError = OrderError::info("acct", "bad volume").into();
        assert_eq!(err.to_string(), "acct: bad volume");

        let err: TraderError = SystemError::AccountNotRegistered("a - b".to_string()).into();
        assert!(err.to_string().contains("not registered"));
    }
}
