//! 网关接口边界
//!
//! 对接外部交易/行情柜台 SDK 的抽象：请求方法即发即回（仅确认请求
//! 已发出），所有应答与推送通过注册的回调接收，每条多记录应答携带
//! 末条标志。核心代码从不轮询该边界，只发请求然后等待配对回调。
//!
//! 交易账户与行情源各自以组合方式实现回调接口（独立的事件接收结构
//! 持有内部状态的引用），而不是让账户类型本身充当回调对象。

pub mod mock;

use std::sync::Arc;

use crate::core::{
    BrokerInfo, Direction, Exchange, HedgeFlag, InstrumentCommissionRate, InstrumentInfo,
    OpenClose, OrderPriceType, OrderStatus, Price, PriceVolume, Ticker, TimeCondition,
    TimeInForce, Volume,
};
use crate::core::CapitalInfo;
use crate::Result;

/// 网关应答结果，错误码 0 表示成功
#[derive(Debug, Clone, Default)]
pub struct RspResult {
    /// 错误码
    pub error_id: i32,
    /// 错误信息
    pub error_msg: String,
}

impl RspResult {
    /// 成功应答
    pub fn ok() -> Self {
        Self::default()
    }

    /// 错误应答
    pub fn error(error_id: i32, error_msg: impl Into<String>) -> Self {
        Self {
            error_id,
            error_msg: error_msg.into(),
        }
    }

    /// 是否成功
    pub fn is_ok(&self) -> bool {
        self.error_id == 0
    }
}

/// 客户端认证请求
#[derive(Debug, Clone)]
pub struct AuthenticateRequest {
    pub broker_id: String,
    pub user_id: String,
    pub user_product_info: String,
    pub app_id: String,
    pub auth_code: String,
}

/// 登录请求
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub broker_id: String,
    pub user_id: String,
    pub password: String,
}

/// 登录应答载荷：网关分配的连接实例标识
#[derive(Debug, Clone, Default)]
pub struct LoginResponse {
    /// 交易前置ID
    pub front_id: i32,
    /// 会话ID
    pub session_id: i32,
    /// 本会话当前最大委托编号
    pub max_order_ref: i64,
    /// 交易日
    pub trading_day: String,
}

/// 修改密码请求
#[derive(Debug, Clone)]
pub struct PasswordUpdateRequest {
    pub broker_id: String,
    pub user_id: String,
    pub old_password: String,
    pub new_password: String,
}

/// 委托录入请求（开平与价格均已解析的具体委托）
#[derive(Debug, Clone)]
pub struct OrderInsert {
    /// 委托编号（本地分配）
    pub order_ref: i64,
    /// 合约代码
    pub instrument_id: Ticker,
    /// 交易所
    pub exchange: Exchange,
    /// 交易方向
    pub direction: Direction,
    /// 开平
    pub open_close: OpenClose,
    /// 投机套保标识
    pub hedge_flag: HedgeFlag,
    /// 价格类型
    pub price_type: OrderPriceType,
    /// 限价价格
    pub limit_price: Price,
    /// 委托数量
    pub volume: Volume,
    /// 有效时间
    pub time_in_force: TimeInForce,
}

/// 撤单请求
#[derive(Debug, Clone)]
pub struct OrderAction {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: i64,
    pub instrument_id: Ticker,
    pub exchange: Exchange,
}

/// 委托回报
#[derive(Debug, Clone)]
pub struct OrderReturn {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: i64,
    pub exchange: Exchange,
    pub instrument_id: Ticker,
    pub open_close: OpenClose,
    pub direction: Direction,
    pub hedge_flag: HedgeFlag,
    pub total_volume: Volume,
    pub traded_volume: Volume,
    pub remained_volume: Volume,
    pub price_type: OrderPriceType,
    pub limit_price: Price,
    pub time_condition: TimeCondition,
    /// 委托状态
    pub status: OrderStatus,
    /// 交易所拒单标志（报单提交被交易所打回）
    pub submit_rejected: bool,
    /// 状态说明
    pub status_msg: String,
    /// 回报时间
    pub time: String,
}

/// 成交回报
#[derive(Debug, Clone)]
pub struct TradeReturn {
    pub order_ref: i64,
    pub exchange: Exchange,
    pub instrument_id: Ticker,
    pub open_close: OpenClose,
    pub direction: Direction,
    pub hedge_flag: HedgeFlag,
    pub price: Price,
    pub volume: Volume,
    pub time: String,
}

/// 持仓查询应答行
#[derive(Debug, Clone)]
pub struct PositionField {
    pub instrument_id: Ticker,
    pub exchange: Exchange,
    pub direction: Direction,
    pub hedge_flag: HedgeFlag,
    /// 昨持仓量
    pub yd_position: Volume,
}

/// 交易回调接口
///
/// 所有方法默认空实现，实现方只需覆盖关心的回调。
pub trait TraderSpi: Send + Sync {
    /// 前置连接建立
    fn on_front_connected(&self) {}
    /// 客户端认证应答
    fn on_rsp_authenticate(&self, _result: &RspResult) {}
    /// 登录应答
    fn on_rsp_user_login(&self, _rsp: &LoginResponse, _result: &RspResult) {}
    /// 结算单确认应答
    fn on_rsp_settlement_confirm(&self, _result: &RspResult) {}
    /// 修改密码应答
    fn on_rsp_password_update(&self, _result: &RspResult) {}
    /// 登出应答
    fn on_rsp_user_logout(&self, _result: &RspResult) {}
    /// 合约查询应答；`info` 为空表示网关返回了无法识别的记录
    fn on_rsp_qry_instrument(&self, _info: Option<&InstrumentInfo>, _is_last: bool) {}
    /// 手续费率查询应答
    fn on_rsp_qry_commission_rate(
        &self,
        _rate: Option<&InstrumentCommissionRate>,
        _is_last: bool,
    ) {
    }
    /// 持仓查询应答
    fn on_rsp_qry_position(&self, _position: Option<&PositionField>, _is_last: bool) {}
    /// 资金查询应答
    fn on_rsp_qry_capital(&self, _capital: &CapitalInfo) {}
    /// 报单录入应答（仅在柜台拒单时携带错误）
    fn on_rsp_order_insert(&self, _order: &OrderInsert, _result: &RspResult) {}
    /// 委托回报推送
    fn on_rtn_order(&self, _order: &OrderReturn) {}
    /// 成交回报推送
    fn on_rtn_trade(&self, _trade: &TradeReturn) {}
}

/// 交易网关请求接口
///
/// 请求方法返回 `Ok(())` 仅表示请求已发出；业务结果经 [`TraderSpi`]
/// 回调到达。
pub trait TraderGateway: Send + Sync {
    /// 注册回调并发起前置连接
    fn connect(&self, front_addrs: &[String], spi: Arc<dyn TraderSpi>) -> Result<()>;
    /// 客户端认证
    fn req_authenticate(&self, req: &AuthenticateRequest) -> Result<()>;
    /// 登录
    fn req_user_login(&self, req: &LoginRequest) -> Result<()>;
    /// 结算单确认
    fn req_settlement_confirm(&self) -> Result<()>;
    /// 修改密码
    fn req_password_update(&self, req: &PasswordUpdateRequest) -> Result<()>;
    /// 登出
    fn req_user_logout(&self) -> Result<()>;
    /// 查询全市场合约
    fn req_qry_instruments(&self) -> Result<()>;
    /// 查询合约手续费率
    fn req_qry_commission_rate(&self, instrument_id: &str) -> Result<()>;
    /// 查询持仓
    fn req_qry_positions(&self) -> Result<()>;
    /// 查询资金
    fn req_qry_capital(&self) -> Result<()>;
    /// 报单录入
    fn req_order_insert(&self, order: &OrderInsert) -> Result<()>;
    /// 撤单
    fn req_order_action(&self, action: &OrderAction) -> Result<()>;
    /// 释放连接资源
    fn release(&self);
}

/// 行情原始推送（网关字段，未归一化）
#[derive(Debug, Clone, Default)]
pub struct DepthTick {
    pub instrument_id: Ticker,
    /// 行情日期 (YYYYMMDD)
    pub action_day: String,
    /// 行情时间 (hh:mm:ss)
    pub update_time: String,
    /// 毫秒
    pub update_millisec: i32,
    pub last_price: Price,
    pub highest_price: Price,
    pub lowest_price: Price,
    pub close_price: Price,
    pub settlement_price: Price,
    pub average_price: Price,
    pub upper_limit: Price,
    pub lower_limit: Price,
    /// 当日累计成交量
    pub volume: Volume,
    /// 当日累计成交额
    pub turnover: f64,
    pub open_interest: Volume,
    pub bid: [PriceVolume; 5],
    pub ask: [PriceVolume; 5],
}

/// 行情回调接口
pub trait MdSpi: Send + Sync {
    /// 前置连接建立
    fn on_front_connected(&self) {}
    /// 登录应答
    fn on_rsp_user_login(&self, _result: &RspResult) {}
    /// 登出应答
    fn on_rsp_user_logout(&self, _result: &RspResult) {}
    /// 订阅应答
    fn on_rsp_sub_market_data(&self, _instrument_id: &str, _is_last: bool) {}
    /// 退订应答
    fn on_rsp_unsub_market_data(&self, _instrument_id: &str, _is_last: bool) {}
    /// 深度行情推送
    fn on_rtn_depth_market_data(&self, _tick: &DepthTick) {}
}

/// 行情网关请求接口
pub trait MdGateway: Send + Sync {
    /// 注册回调并发起前置连接
    fn connect(&self, front_addrs: &[String], spi: Arc<dyn MdSpi>) -> Result<()>;
    /// 登录
    fn req_user_login(&self) -> Result<()>;
    /// 登出
    fn req_user_logout(&self) -> Result<()>;
    /// 订阅合约
    fn subscribe(&self, instrument_ids: &[Ticker]) -> Result<()>;
    /// 退订合约
    fn unsubscribe(&self, instrument_ids: &[Ticker]) -> Result<()>;
    /// 释放连接资源
    fn release(&self);
}

/// 网关工厂：为经纪商创建交易网关、为行情源创建行情网关
///
/// 系统层通过本接口与具体柜台实现解耦，测试中注入进程内模拟网关。
pub trait GatewayFactory: Send + Sync {
    /// 创建交易网关
    fn create_trader(&self, broker: &BrokerInfo) -> Result<Arc<dyn TraderGateway>>;
    /// 创建行情网关
    fn create_md(&self) -> Result<Arc<dyn MdGateway>>;
}
