//! 核心数据模型
//!
//! 交易客户端通用的枚举与记录类型：连接状态、委托状态、方向、开平、
//! 持仓/成交/委托记录、资金状况、合约信息、行情深度。
//!
//! 所有记录类型均可 serde 序列化，用于快照导出。

use serde::{Deserialize, Serialize};

/// 合约代码
pub type Ticker = String;
/// 价格
pub type Price = f64;
/// 数量（手）
pub type Volume = i32;
/// 金额
pub type Money = f64;

/// 账户索引 (账户名, 经纪商名)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    /// 账户名
    pub account_name: String,
    /// 经纪商名称
    pub broker_name: String,
}

impl AccountKey {
    pub fn new(account_name: impl Into<String>, broker_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            broker_name: broker_name.into(),
        }
    }
}

impl std::fmt::Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.account_name, self.broker_name)
    }
}

/// 委托索引
///
/// 由登录时网关分配的前置号/会话号与本地单调递增的委托编号组成，
/// 在一次登录会话内全局唯一，永不复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderIndex {
    /// 交易前置ID
    pub front_id: i32,
    /// 会话ID
    pub session_id: i32,
    /// 委托编号
    pub order_ref: i64,
}

/// 持仓索引 (合约, 方向, 投机套保标识)
///
/// 同一合约的多头与空头持仓互相独立，不做自动轧差。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentIndex {
    /// 合约代码
    pub instrument_id: Ticker,
    /// 持仓方向
    pub direction: Direction,
    /// 投机套保标识
    pub hedge_flag: HedgeFlag,
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// 未初始化
    Uninitialized,
    /// 已初始化
    Initializing,
    /// 连接断开
    Disconnected,
    /// 连接中
    Connecting,
    /// 连接成功
    Connected,
    /// 客户端认证中
    Authorizing,
    /// 认证成功
    Authorized,
    /// 登录中
    Logining,
    /// 登录成功
    LoggedIn,
    /// 结算单确认中
    Confirming,
    /// 结算单已确认
    Confirmed,
    /// 登录全流程完成，可进行交易操作
    Done,
    /// 登出中
    LoggingOut,
    /// 已登出
    LoggedOut,
}

/// 委托状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// 全部成交
    AllTraded,
    /// 部分成交还在队列中
    PartTradedQueueing,
    /// 部分成交不在队列中
    PartTradedNotQueueing,
    /// 未成交还在队列中
    NoTradeQueueing,
    /// 未成交不在队列中
    NoTradeNotQueueing,
    /// 柜台拒绝
    RejectedByServer,
    /// 交易所拒绝
    RejectedByExchange,
    /// 已撤单
    Canceled,
    /// 未知
    Unknown,
    /// 条件单尚未触发
    NotTouched,
    /// 条件单已触发
    Touched,
}

impl OrderStatus {
    /// 该状态下的委托是否可撤
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            OrderStatus::PartTradedQueueing
                | OrderStatus::PartTradedNotQueueing
                | OrderStatus::NoTradeQueueing
                | OrderStatus::NoTradeNotQueueing
        )
    }
}

/// 持仓方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// 多
    Long,
    /// 空
    Short,
}

impl Direction {
    /// 翻转多空方向
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// 多头 +1, 空头 -1
    pub fn sign(&self) -> i32 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }
}

/// 开平仓
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OpenClose {
    /// 自动：由系统根据持仓拆分开平
    Auto,
    /// 开仓
    Open,
    /// 平仓
    Close,
    /// 平今仓
    CloseToday,
    /// 平昨仓
    CloseYesterday,
}

impl OpenClose {
    /// 开仓 +1, 平仓 -1, 自动 0，用于持仓总量增减
    pub fn sign(&self) -> i32 {
        match self {
            OpenClose::Open => 1,
            OpenClose::Auto => 0,
            _ => -1,
        }
    }

    /// 是否为平仓类指令
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            OpenClose::Close | OpenClose::CloseToday | OpenClose::CloseYesterday
        )
    }
}

/// 投机套保标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HedgeFlag {
    /// 投机
    Speculation,
    /// 套利
    Arbitrage,
    /// 套保
    Hedge,
}

/// 平仓时今昨仓的消耗顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePrecedence {
    /// 先平今，剩余平昨（大商所风格）
    TodayFirst,
    /// 先平昨，剩余平今（中金所/郑商所风格）
    YesterdayFirst,
}

/// 交易所
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// 上期所
    SHFE,
    /// 大商所
    DCE,
    /// 郑商所
    CZCE,
    /// 中金所
    CFFEX,
    /// 能源中心
    INE,
}

impl Exchange {
    /// 委托层面是否区分平今/平昨
    ///
    /// 上期所和能源中心要求明确报平今或平昨，其余交易所统一报平仓。
    pub fn has_close_today_distinction(&self) -> bool {
        matches!(self, Exchange::SHFE | Exchange::INE)
    }

    /// 普通平仓指令的今昨仓消耗顺序
    ///
    /// 大商所先平今再平昨；中金所、郑商所先开先平（先昨后今）；
    /// 其余交易所按大商所规则处理。
    pub fn close_precedence(&self) -> ClosePrecedence {
        match self {
            Exchange::CFFEX | Exchange::CZCE => ClosePrecedence::YesterdayFirst,
            _ => ClosePrecedence::TodayFirst,
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Exchange::SHFE => "SHFE",
            Exchange::DCE => "DCE",
            Exchange::CZCE => "CZCE",
            Exchange::CFFEX => "CFFEX",
            Exchange::INE => "INE",
        };
        write!(f, "{}", s)
    }
}

/// 有效时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good For Day
    Gfd,
    /// Fill And Kill
    Fak,
    /// Fill(all) Or Kill
    Fok,
}

/// 时间条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeCondition {
    /// Good For Day
    Gfd,
    /// Immediate Or Cancel
    Ioc,
}

impl TimeInForce {
    /// 转换为委托记录使用的时间条件
    pub fn time_condition(&self) -> TimeCondition {
        match self {
            TimeInForce::Gfd => TimeCondition::Gfd,
            TimeInForce::Fak | TimeInForce::Fok => TimeCondition::Ioc,
        }
    }
}

/// 价格条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderPriceType {
    /// 任意价
    AnyPrice,
    /// 限价
    LimitPrice,
    /// 最优价
    BestPrice,
    /// 最新价
    LastPrice,
    /// 买价
    BidPrice,
    /// 卖价
    AskPrice,
    /// 五档价
    FiveLevelPrice,
}

/// 合约类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentType {
    /// 期货
    Future,
    /// 期权
    Option,
}

/// 量价
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceVolume {
    /// 价格
    pub price: Price,
    /// 数量
    pub volume: Volume,
}

/// 高开低收量额
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ohlclvt {
    /// 开盘价
    pub open: Price,
    /// 最高价
    pub high: Price,
    /// 最低价
    pub low: Price,
    /// 收盘价
    pub close: Price,
    /// 最新价
    pub last: Price,
    /// 成交量
    pub volume: Volume,
    /// 成交额
    pub turnover: f64,
}

/// 市场行情深度快照
///
/// 每次行情推送整体替换，由行情源单线程写入，供各账户只读消费。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    /// 合约代码
    pub instrument_id: Ticker,
    /// 更新时间 (YYYY-MM-DD hh:mm:ss.mmm)
    pub update_time: String,
    /// 高开低收量额
    pub ohlclvt: Ohlclvt,
    /// 结算价
    pub settle: Price,
    /// 持仓量
    pub open_interest: Volume,
    /// 均价
    pub average_price: Price,
    /// 涨停价
    pub upper_limit: Price,
    /// 跌停价
    pub lower_limit: Price,
    /// 五档竞买
    pub bid: [PriceVolume; 5],
    /// 五档竞卖
    pub ask: [PriceVolume; 5],
}

/// 账户信息（来自配置）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    /// 账户名
    pub account_name: String,
    /// 经纪商名称
    pub broker_name: String,
    /// 资金账号
    pub account_number: String,
    /// 密码
    pub password: String,
    /// 是否启用
    #[serde(default = "default_enable")]
    pub enable: bool,
}

fn default_enable() -> bool {
    true
}

/// 经纪商信息（来自配置）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerInfo {
    /// 经纪商名称
    pub broker_name: String,
    /// 经纪商编码
    pub broker_id: String,
    /// 交易服务器地址列表
    pub trade_server_addrs: Vec<String>,
    /// UserProductInfo
    #[serde(default)]
    pub user_product_info: String,
    /// 认证AppID
    #[serde(default)]
    pub app_id: String,
    /// 认证码
    #[serde(default)]
    pub auth_code: String,
    /// 每秒查询限制，0 表示不限速
    #[serde(default)]
    pub query_rate_per_second: i32,
}

/// 合约基础信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// 合约类型
    pub instrument_type: InstrumentType,
    /// 是否在交易
    pub is_trading: bool,
    /// 合约代码
    pub instrument_id: Ticker,
    /// 合约名称
    pub instrument_name: String,
    /// 交易所
    pub exchange: Exchange,
    /// 产品代码
    pub product_id: String,
    /// 交割月份 (YYYYMM)
    pub deliver_month: String,
    /// 最大限价委托数量
    pub max_limit_order_volume: Volume,
    /// 最小限价委托数量
    pub min_limit_order_volume: Volume,
    /// 合约乘数
    pub volume_multiplier: f64,
    /// 最小价格变动单位
    pub price_tick: Price,
    /// 合约到期日
    pub expire_date: String,
    /// 多头保证金比例
    pub long_margin_ratio: f64,
    /// 空头保证金比例
    pub short_margin_ratio: f64,
}

/// 资金状况
///
/// 每次资金查询应答整体替换，不做增量更新。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapitalInfo {
    /// 权益金
    pub balance: Money,
    /// 保证金占用
    pub margin_used: Money,
    /// 可用资金
    pub available: Money,
    /// 已付交易费用
    pub commission: Money,
    /// 可取金额
    pub withdraw_allowance: Money,
}

/// 持仓记录
///
/// 不变量: `total_quantity == today_quantity + pre_quantity`，两个子项非负。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingRecord {
    /// 交易所
    pub exchange: Exchange,
    /// 合约代码
    pub instrument_id: Ticker,
    /// 持仓方向
    pub direction: Direction,
    /// 投机套保标识
    pub hedge_flag: HedgeFlag,
    /// 总持仓量
    pub total_quantity: Volume,
    /// 今仓量
    pub today_quantity: Volume,
    /// 昨仓量
    pub pre_quantity: Volume,
}

impl HoldingRecord {
    /// 持仓索引
    pub fn index(&self) -> InstrumentIndex {
        InstrumentIndex {
            instrument_id: self.instrument_id.clone(),
            direction: self.direction,
            hedge_flag: self.hedge_flag,
        }
    }
}

/// 成交记录，按到达顺序追加，永不修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingRecord {
    /// 委托编号
    pub order_ref: i64,
    /// 交易所
    pub exchange: Exchange,
    /// 合约代码
    pub instrument_id: Ticker,
    /// 开平
    pub open_close: OpenClose,
    /// 交易方向
    pub direction: Direction,
    /// 投机套保标识
    pub hedge_flag: HedgeFlag,
    /// 成交价格
    pub price: Price,
    /// 成交数量
    pub volume: Volume,
    /// 成交时间
    pub time: String,
}

/// 委托记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    /// 交易前置ID
    pub front_id: i32,
    /// 会话ID
    pub session_id: i32,
    /// 委托编号
    pub order_ref: i64,
    /// 交易所
    pub exchange: Exchange,
    /// 合约代码
    pub instrument_id: Ticker,
    /// 开平
    pub open_close: OpenClose,
    /// 交易方向
    pub direction: Direction,
    /// 投机套保标识
    pub hedge_flag: HedgeFlag,
    /// 委托数量
    pub total_volume: Volume,
    /// 已成交数量
    pub traded_volume: Volume,
    /// 未成交数量
    pub remained_volume: Volume,
    /// 价格类型
    pub price_type: OrderPriceType,
    /// 限价价格
    pub limit_price: Price,
    /// 时间条件
    pub time_condition: TimeCondition,
    /// 委托状态
    pub status: OrderStatus,
    /// 委托时间
    pub time: String,
}

impl OrderRecord {
    /// 委托索引
    pub fn index(&self) -> OrderIndex {
        OrderIndex {
            front_id: self.front_id,
            session_id: self.session_id,
            order_ref: self.order_ref,
        }
    }
}

/// 委托单（用户层请求）
///
/// `exchange` 在进入系统前可以为空，由订单处理流程根据合约信息补全；
/// 价格类型可为相对价格，由订单处理流程解析为具体限价。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// 账户名
    pub account_name: String,
    /// 经纪商名称
    pub broker_name: String,
    /// 合约代码
    pub instrument_id: Ticker,
    /// 交易所，未解析时为空
    pub exchange: Option<Exchange>,
    /// 有效时间
    pub time_in_force: TimeInForce,
    /// 开平
    pub open_close: OpenClose,
    /// 投机套保标识
    pub hedge_flag: HedgeFlag,
    /// 交易方向
    pub direction: Direction,
    /// 委托数量
    pub volume: Volume,
    /// 价格类型
    pub price_type: OrderPriceType,
    /// 限价价格
    pub limit_price: Price,
    /// tick偏移
    pub tick_offset: i32,
    /// 盘口档位偏移 (1-5)
    pub level_offset: i32,
}

impl Order {
    /// 创建默认参数的委托单：GFD, 投机, 自动开平, 最优价
    pub fn new(
        account_name: impl Into<String>,
        broker_name: impl Into<String>,
        instrument_id: impl Into<Ticker>,
        direction: Direction,
        volume: Volume,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            broker_name: broker_name.into(),
            instrument_id: instrument_id.into(),
            exchange: None,
            time_in_force: TimeInForce::Gfd,
            open_close: OpenClose::Auto,
            hedge_flag: HedgeFlag::Speculation,
            direction,
            volume,
            price_type: OrderPriceType::BestPrice,
            limit_price: 0.0,
            tick_offset: 0,
            level_offset: 1,
        }
    }

    /// 账户索引
    pub fn account_key(&self) -> AccountKey {
        AccountKey::new(self.account_name.clone(), self.broker_name.clone())
    }
}

/// 交易手续费率
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentCommissionRate {
    /// 合约代码
    pub instrument_id: Ticker,
    /// 开仓手续费率
    pub open_ratio_by_money: f64,
    /// 开仓手续费(按手)
    pub open_ratio_by_volume: f64,
    /// 平仓手续费率
    pub close_ratio_by_money: f64,
    /// 平仓手续费(按手)
    pub close_ratio_by_volume: f64,
    /// 平今手续费率
    pub close_today_ratio_by_money: f64,
    /// 平今手续费(按手)
    pub close_today_ratio_by_volume: f64,
}
