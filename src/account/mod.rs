//! 交易账户
//!
//! 单个资金账户的同步操作门面：登录/登出状态机、资金/持仓/成交/委托
//! 台账、下单撤单、合约与手续费查询。网关回调由独立的事件接收结构
//! [`AccountEventSink`] 以组合方式接入，驱动状态机与台账。
//!
//! 登录链: Connecting → Connected → Authorizing → Authorized → Logining
//! → LoggedIn → Confirming → Done；整条链绑定一个 60s 的异步查询管理
//! 器，同步登录在其上阻塞并在放行后复核终态。只有 `Done` 状态允许
//! 交易类操作。登出幂等。

pub mod ledger;
pub mod query_manager;
pub mod throttler;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::{
    AccountInfo, AccountKey, BrokerInfo, CapitalInfo, ConnectionStatus, HoldingRecord,
    InstrumentCommissionRate, InstrumentIndex, InstrumentInfo, Order, OrderIndex, OrderRecord,
    OrderStatus, Ticker, TradingRecord, Volume,
};
use crate::gateway::{
    AuthenticateRequest, LoginRequest, LoginResponse, OrderAction, OrderInsert, OrderReturn,
    PasswordUpdateRequest, PositionField, RspResult, TradeReturn, TraderGateway, TraderSpi,
};
use crate::utils::product_id;
use crate::{ConfigError, LoginError, OrderError, Result, TraderError};

use ledger::{AccountLedger, OrderPushOutcome};
use query_manager::{AsyncQueryManager, QueryCondition};
use throttler::RateThrottler;

/// 登录失败分类（由网关错误码映射）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginFailure {
    None,
    WrongCredentials,
    WeakPassword,
    FirstLoginPasswordChangeRequired,
    PasswordExpired,
    IpLimited,
    IpBanned,
    Unknown,
}

/// 网关登录错误码 → 失败分类
fn classify_login_error(error_id: i32) -> LoginFailure {
    match error_id {
        3 => LoginFailure::WrongCredentials,
        131 => LoginFailure::WeakPassword,
        140 => LoginFailure::FirstLoginPasswordChangeRequired,
        141 => LoginFailure::PasswordExpired,
        143 => LoginFailure::IpLimited,
        144 => LoginFailure::IpBanned,
        _ => LoginFailure::Unknown,
    }
}

/// 登录会话标识，由网关在登录应答中分配
#[derive(Debug, Clone, Copy, Default)]
struct SessionInfo {
    front_id: i32,
    session_id: i32,
}

/// 账户内部状态，账户门面与事件接收器共同持有
struct AccountCore {
    account_name: String,
    broker_name: String,
    account_number: String,
    password: Mutex<String>,
    /// 账户ID: "账户名 - 经纪商名"
    id: String,
    broker: BrokerInfo,
    gateway: Arc<dyn TraderGateway>,

    /// 连接状态。登录/登出/资金刷新共用这一把状态锁串行化状态机
    status: Mutex<ConnectionStatus>,
    login_failure: Mutex<LoginFailure>,
    password_update_ok: AtomicBool,

    session: Mutex<SessionInfo>,
    /// 会话内单调递增的委托编号
    order_ref: AtomicI64,

    ledger: AccountLedger,
    instrument_info: Mutex<BTreeMap<Ticker, InstrumentInfo>>,
    commission_rates: Mutex<BTreeMap<Ticker, InstrumentCommissionRate>>,
    /// 合约查询返回了无法识别的记录
    malformed_instrument_data: AtomicBool,

    throttler: RateThrottler,

    // 每条请求线一个异步查询管理器
    login_mgr: AsyncQueryManager,
    logout_mgr: AsyncQueryManager,
    capital_mgr: AsyncQueryManager,
    position_mgr: AsyncQueryManager,
    instrument_mgr: AsyncQueryManager,
    commission_mgr: AsyncQueryManager,
    password_mgr: AsyncQueryManager,

    /// 同步下单等待点：首个回报（建档或柜台拒单）到达时放行
    order_sync_mutex: Mutex<()>,
    order_cv: Condvar,

    /// 资金刷新线程的停止信号
    worker_stop: Mutex<bool>,
    worker_cv: Condvar,
}

impl AccountCore {
    fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock() = status;
    }

    /// 发出认证请求（前置连接建立后）
    fn request_authenticate(&self) {
        let req = AuthenticateRequest {
            broker_id: self.broker.broker_id.clone(),
            user_id: self.account_number.clone(),
            user_product_info: self.broker.user_product_info.clone(),
            app_id: self.broker.app_id.clone(),
            auth_code: self.broker.auth_code.clone(),
        };
        log::trace!("{}: requesting authentication", self.id);
        if let Err(e) = self.gateway.req_authenticate(&req) {
            log::error!("{}: failed to send authenticate request: {}", self.id, e);
        }
        self.set_status(ConnectionStatus::Authorizing);
    }

    /// 发出登录请求（认证通过后，或复用既有连接时）
    fn request_login(&self) {
        let req = LoginRequest {
            broker_id: self.broker.broker_id.clone(),
            user_id: self.account_number.clone(),
            password: self.password.lock().clone(),
        };
        if let Err(e) = self.gateway.req_user_login(&req) {
            log::error!("{}: failed to send login request: {}", self.id, e);
        }
        self.set_status(ConnectionStatus::Logining);
    }
}

/// 网关事件接收器
///
/// 持有账户内部状态的引用并实现 [`TraderSpi`]，把回调翻译成状态机
/// 迁移和台账更新。接收器只做这一件事，账户门面不直接充当回调对象。
struct AccountEventSink {
    core: Arc<AccountCore>,
}

impl TraderSpi for AccountEventSink {
    fn on_front_connected(&self) {
        let core = &self.core;
        log::trace!("{}: front connected", core.id);
        {
            let status = core.status.lock();
            if matches!(
                *status,
                ConnectionStatus::LoggingOut | ConnectionStatus::LoggedOut
            ) {
                log::trace!("{}: client already logged out, ignore reconnect", core.id);
                return;
            }
        }
        core.set_status(ConnectionStatus::Connected);
        core.request_authenticate();
    }

    fn on_rsp_authenticate(&self, result: &RspResult) {
        let core = &self.core;
        if result.is_ok() {
            core.set_status(ConnectionStatus::Authorized);
            log::trace!("{}: authentication successful", core.id);
            core.request_login();
        } else {
            log::error!(
                "{}: authentication FAILED: [{}] {}",
                core.id,
                result.error_id,
                result.error_msg
            );
            core.login_mgr.done(false);
        }
    }

    fn on_rsp_user_login(&self, rsp: &LoginResponse, result: &RspResult) {
        let core = &self.core;
        if result.is_ok() {
            {
                let mut session = core.session.lock();
                session.front_id = rsp.front_id;
                session.session_id = rsp.session_id;
            }
            core.order_ref.store(rsp.max_order_ref, Ordering::SeqCst);
            core.set_status(ConnectionStatus::LoggedIn);
            log::info!("{}: logged in successfully", core.id);

            log::trace!("{}: requesting settlement confirmation", core.id);
            if let Err(e) = core.gateway.req_settlement_confirm() {
                log::error!(
                    "{}: failed to send settlement confirm request: {}",
                    core.id,
                    e
                );
            }
            core.set_status(ConnectionStatus::Confirming);
        } else {
            *core.login_failure.lock() = classify_login_error(result.error_id);
            log::error!(
                "{}: log in FAILED: [{}] {}",
                core.id,
                result.error_id,
                result.error_msg
            );
            core.login_mgr.done(false);
        }
    }

    fn on_rsp_settlement_confirm(&self, result: &RspResult) {
        let core = &self.core;
        if result.is_ok() {
            log::trace!("{}: settlement confirmed", core.id);
            core.set_status(ConnectionStatus::Done);
            core.login_mgr.done(true);
        } else {
            log::error!(
                "{}: settlement confirmation FAILED: [{}] {}",
                core.id,
                result.error_id,
                result.error_msg
            );
            core.login_mgr.done(false);
        }
    }

    fn on_rsp_password_update(&self, result: &RspResult) {
        let core = &self.core;
        core.password_update_ok.store(result.is_ok(), Ordering::SeqCst);
        if !result.is_ok() {
            log::error!(
                "{}: password update failed: [{}] {}",
                core.id,
                result.error_id,
                result.error_msg
            );
        }
        core.password_mgr.done(result.is_ok());
    }

    fn on_rsp_user_logout(&self, result: &RspResult) {
        let core = &self.core;
        if result.is_ok() {
            core.set_status(ConnectionStatus::LoggedOut);
            log::trace!("{}: logged out", core.id);
        } else {
            log::error!(
                "{}: logout failed: [{}] {}",
                core.id,
                result.error_id,
                result.error_msg
            );
        }
        core.logout_mgr.done(result.is_ok());
    }

    fn on_rsp_qry_instrument(&self, info: Option<&InstrumentInfo>, is_last: bool) {
        let core = &self.core;
        match info {
            Some(info) => {
                let key = info.instrument_id.to_uppercase();
                core.instrument_info.lock().insert(key, info.clone());
            }
            None => {
                log::error!(
                    "{}: instrument query returned an unrecognized record, server ill-configured",
                    core.id
                );
                core.malformed_instrument_data.store(true, Ordering::SeqCst);
                core.instrument_mgr.done(false);
                return;
            }
        }
        if is_last {
            core.instrument_mgr.done(true);
        }
    }

    fn on_rsp_qry_commission_rate(&self, rate: Option<&InstrumentCommissionRate>, is_last: bool) {
        let core = &self.core;
        if let Some(rate) = rate {
            log::trace!("{}: commission rate received for {}", core.id, rate.instrument_id);
            core.commission_rates
                .lock()
                .insert(rate.instrument_id.clone(), rate.clone());
        }
        if is_last {
            core.commission_mgr.done(true);
        }
    }

    fn on_rsp_qry_position(&self, position: Option<&PositionField>, is_last: bool) {
        let core = &self.core;
        if let Some(position) = position {
            // 组合/跨期套利合成合约不计入持仓
            if position.yd_position != 0 && !position.instrument_id.starts_with("SP") {
                core.ledger.seed_pre_position(position);
            }
        }
        if is_last {
            log::trace!("{}: acquired all positions", core.id);
            core.position_mgr.done(true);
        }
    }

    fn on_rsp_qry_capital(&self, capital: &CapitalInfo) {
        let core = &self.core;
        core.ledger.set_capital(*capital);
        log::trace!(
            "{}: balance: {:.2}, margin: {:.2}, commission: {:.2}",
            core.id,
            capital.balance,
            capital.margin_used,
            capital.commission
        );
        core.capital_mgr.done(true);
    }

    fn on_rsp_order_insert(&self, order: &OrderInsert, result: &RspResult) {
        let core = &self.core;
        if result.is_ok() {
            log::trace!("{}: order {} accepted by gateway", core.id, order.order_ref);
        } else {
            log::error!(
                "{}: order {} rejected by gateway: [{}] {}",
                core.id,
                order.order_ref,
                result.error_id,
                result.error_msg
            );
            core.ledger.note_server_reject(order.order_ref);
            core.order_cv.notify_all();
        }
    }

    fn on_rtn_order(&self, order: &OrderReturn) {
        let core = &self.core;
        let outcome = core.ledger.apply_order_return(order);
        if matches!(
            outcome,
            OrderPushOutcome::NewRecord | OrderPushOutcome::ExchangeRejected
        ) {
            core.order_cv.notify_all();
        }
    }

    fn on_rtn_trade(&self, trade: &TradeReturn) {
        log::trace!("{}: trade return received", self.core.id);
        self.core.ledger.apply_trade(trade);
    }
}

/// 交易账户
pub struct TradingAccount {
    core: Arc<AccountCore>,
    /// 后台资金刷新线程，登录时启动，登出时停止并汇合
    capital_worker: Mutex<Option<JoinHandle<()>>>,
}

impl TradingAccount {
    /// 创建账户并绑定交易网关（不发起连接）
    pub fn new(
        account_info: &AccountInfo,
        broker_info: &BrokerInfo,
        gateway: Arc<dyn TraderGateway>,
    ) -> Self {
        let id = format!(
            "{} - {}",
            account_info.account_name, account_info.broker_name
        );
        let core = Arc::new(AccountCore {
            account_name: account_info.account_name.clone(),
            broker_name: account_info.broker_name.clone(),
            account_number: account_info.account_number.clone(),
            password: Mutex::new(account_info.password.clone()),
            id,
            throttler: RateThrottler::new(
                if broker_info.query_rate_per_second > 0 {
                    broker_info.query_rate_per_second
                } else {
                    1
                },
                Duration::from_secs(1),
            ),
            broker: broker_info.clone(),
            gateway,
            status: Mutex::new(ConnectionStatus::Initializing),
            login_failure: Mutex::new(LoginFailure::None),
            password_update_ok: AtomicBool::new(false),
            session: Mutex::new(SessionInfo::default()),
            order_ref: AtomicI64::new(0),
            ledger: AccountLedger::new(),
            instrument_info: Mutex::new(BTreeMap::new()),
            commission_rates: Mutex::new(BTreeMap::new()),
            malformed_instrument_data: AtomicBool::new(false),
            login_mgr: AsyncQueryManager::new(Duration::from_secs(60)),
            logout_mgr: AsyncQueryManager::new(Duration::from_secs(2)),
            capital_mgr: AsyncQueryManager::new(Duration::from_secs(1)),
            position_mgr: AsyncQueryManager::new(Duration::from_secs(60)),
            instrument_mgr: AsyncQueryManager::new(Duration::from_secs(60)),
            commission_mgr: AsyncQueryManager::new(Duration::from_secs(2)),
            password_mgr: AsyncQueryManager::new(Duration::from_secs(2)),
            order_sync_mutex: Mutex::new(()),
            order_cv: Condvar::new(),
            worker_stop: Mutex::new(false),
            worker_cv: Condvar::new(),
        });
        log::trace!("{}: account initialized", core.id);
        Self {
            core,
            capital_worker: Mutex::new(None),
        }
    }

    // ==================== getter ====================

    /// 账户名称
    pub fn account_name(&self) -> &str {
        &self.core.account_name
    }

    /// 经纪商名称
    pub fn broker_name(&self) -> &str {
        &self.core.broker_name
    }

    /// 账户ID: "账户名 - 经纪商名"
    pub fn id(&self) -> &str {
        &self.core.id
    }

    /// 账户索引
    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.core.account_name.clone(), self.core.broker_name.clone())
    }

    /// 当前连接状态
    pub fn connection_status(&self) -> ConnectionStatus {
        self.core.status()
    }

    /// 是否完成登录全流程（仅 `Done` 状态允许交易类操作）
    pub fn is_logged_in(&self) -> bool {
        self.core.status() == ConnectionStatus::Done
    }

    /// 账户权益
    pub fn capital(&self) -> CapitalInfo {
        self.core.ledger.capital()
    }

    /// 持仓记录
    pub fn holding(&self) -> BTreeMap<InstrumentIndex, HoldingRecord> {
        self.core.ledger.holdings()
    }

    /// 成交记录
    pub fn trades(&self) -> Vec<TradingRecord> {
        self.core.ledger.trades()
    }

    /// 委托记录
    pub fn orders(&self) -> BTreeMap<OrderIndex, OrderRecord> {
        self.core.ledger.orders()
    }

    /// 可撤委托索引
    pub fn cancelable_orders(&self) -> Vec<OrderIndex> {
        self.core.ledger.cancelable_orders()
    }

    /// 各合约净持仓
    pub fn net_holdings(&self) -> BTreeMap<String, Volume> {
        self.core.ledger.net_holdings()
    }

    /// 各合约净成交
    pub fn net_trades(&self) -> BTreeMap<String, Volume> {
        self.core.ledger.net_trades()
    }

    /// 已查询到的合约信息（键为大写合约代码）
    pub fn instrument_info(&self) -> BTreeMap<Ticker, InstrumentInfo> {
        self.core.instrument_info.lock().clone()
    }

    /// 已查询到的手续费率
    pub fn commission_rates(&self) -> BTreeMap<Ticker, InstrumentCommissionRate> {
        self.core.commission_rates.lock().clone()
    }

    // ==================== 登录/登出 ====================

    /// 同步登录
    ///
    /// 通过 连接 → 认证 → 登录 → 结算单确认 完成登录，之后查询昨持仓
    /// 并启动 60s 间隔的资金刷新线程。整条链最长等待 60s。
    pub fn log_on_sync(&self) -> Result<()> {
        let core = &self.core;
        if self.is_logged_in() {
            log::warn!("{}: account is already logged on", core.id);
            return Ok(());
        }

        let core_action = core.clone();
        let cond = core.login_mgr.query(1, move || log_on_async(&core_action));

        if cond == QueryCondition::Timeout {
            return Err(TraderError::Network(core.id.clone()));
        }
        match core.status() {
            ConnectionStatus::Done => {}
            ConnectionStatus::Authorizing => {
                return Err(LoginError::AuthorizationFailure(core.id.clone()).into());
            }
            ConnectionStatus::Logining => {
                let failure = *core.login_failure.lock();
                let id = core.id.clone();
                return Err(match failure {
                    LoginFailure::WrongCredentials => LoginError::WrongCredentials(id),
                    LoginFailure::WeakPassword => LoginError::WeakPassword(id),
                    LoginFailure::FirstLoginPasswordChangeRequired => {
                        LoginError::FirstLoginPasswordChangeRequired(id)
                    }
                    LoginFailure::PasswordExpired => LoginError::PasswordExpired(id),
                    LoginFailure::IpLimited => LoginError::IpLimited(id),
                    LoginFailure::IpBanned => LoginError::IpBanned(id),
                    _ => LoginError::Unknown(id),
                }
                .into());
            }
            status => {
                log::trace!("{}: connect status after login wait: {:?}", core.id, status);
                return Err(LoginError::Unknown(core.id.clone()).into());
            }
        }

        // 初始查询：昨持仓
        self.query_pre_holding()?;

        // 资金刷新线程，登出时经停止信号汇合
        *core.worker_stop.lock() = false;
        let worker_core = core.clone();
        let handle = std::thread::spawn(move || loop {
            if worker_core.status() == ConnectionStatus::LoggedOut {
                return;
            }
            query_capital(&worker_core);
            let mut stop = worker_core.worker_stop.lock();
            if *stop {
                return;
            }
            worker_core
                .worker_cv
                .wait_for(&mut stop, Duration::from_secs(60));
            if *stop {
                return;
            }
        });
        *self.capital_worker.lock() = Some(handle);
        Ok(())
    }

    /// 同步登出
    ///
    /// 幂等：未登录时仅记录日志。停止资金刷新线程并释放网关连接，
    /// 登出失败只记录，不上抛。
    pub fn log_off_sync(&self) {
        let core = &self.core;
        if !self.is_logged_in() {
            if core.status() != ConnectionStatus::LoggedOut {
                core.set_status(ConnectionStatus::LoggedOut);
            }
            return;
        }

        let core_action = core.clone();
        let cond = core.logout_mgr.query(1, move || {
            core_action.set_status(ConnectionStatus::LoggingOut);
            if let Err(e) = core_action.gateway.req_user_logout() {
                log::error!("{}: failed to send logout request: {}", core_action.id, e);
            }
        });
        if cond != QueryCondition::Succeeded {
            log::warn!("{}: logout did not complete cleanly ({:?})", core.id, cond);
        }
        core.set_status(ConnectionStatus::LoggedOut);

        {
            let mut stop = core.worker_stop.lock();
            *stop = true;
            core.worker_cv.notify_all();
        }
        if let Some(handle) = self.capital_worker.lock().take() {
            if let Err(e) = handle.join() {
                log::error!("{}: capital refresh thread panicked: {:?}", core.id, e);
            }
        }
        core.gateway.release();
    }

    /// 修改密码，成功时更新本地保存的密码
    pub fn update_password(&self, new_password: &str) -> Result<bool> {
        let core = &self.core;
        if *core.password.lock() == new_password {
            log::warn!("{}: new password is the same as the current one", core.id);
            return Ok(true);
        }
        let req = PasswordUpdateRequest {
            broker_id: core.broker.broker_id.clone(),
            user_id: core.account_number.clone(),
            old_password: core.password.lock().clone(),
            new_password: new_password.to_string(),
        };
        core.password_update_ok.store(false, Ordering::SeqCst);
        let core_action = core.clone();
        let cond = core.password_mgr.query(1, move || {
            if let Err(e) = core_action.gateway.req_password_update(&req) {
                log::error!("{}: failed to send password update: {}", core_action.id, e);
            }
        });
        let ok = cond == QueryCondition::Succeeded
            && core.password_update_ok.load(Ordering::SeqCst);
        if ok {
            *core.password.lock() = new_password.to_string();
            log::info!("{}: password changed", core.id);
        }
        Ok(ok)
    }

    // ==================== 查询 ====================

    /// 同步刷新资金。资金查询超时只记录，不上抛
    pub fn query_capital_sync(&self) -> CapitalInfo {
        query_capital(&self.core);
        self.core.ledger.capital()
    }

    /// 查询市场上的所有合约
    pub fn query_instruments(&self) -> Result<BTreeMap<Ticker, InstrumentInfo>> {
        let core = &self.core;
        let core_action = core.clone();
        let cond = core.instrument_mgr.query(1, move || {
            core_action.throttler.wait();
            if let Err(e) = core_action.gateway.req_qry_instruments() {
                log::error!("{}: failed to send instrument query: {}", core_action.id, e);
            }
        });
        if core.malformed_instrument_data.load(Ordering::SeqCst) {
            return Err(ConfigError::MalformedInstrumentData.into());
        }
        if cond != QueryCondition::Succeeded {
            return Err(TraderError::Network(core.id.clone()));
        }
        log::trace!("{}: acquired all instruments", core.id);
        Ok(core.instrument_info.lock().clone())
    }

    /// 查询单个合约的手续费率
    ///
    /// 应答可能按产品（而非单个合约）返回，查不到合约级记录时回退到
    /// 产品级记录。
    pub fn query_commission_rate(&self, ticker: &str) -> Result<InstrumentCommissionRate> {
        let core = &self.core;
        let instrument_id = ticker.to_string();
        let core_action = core.clone();
        let cond = core.commission_mgr.query(1, move || {
            core_action.throttler.wait();
            if let Err(e) = core_action.gateway.req_qry_commission_rate(&instrument_id) {
                log::error!(
                    "{}: failed to send commission rate query: {}",
                    core_action.id,
                    e
                );
            }
        });
        if cond == QueryCondition::Timeout {
            return Err(TraderError::Network(core.id.clone()));
        }
        let rates = core.commission_rates.lock();
        rates
            .get(ticker)
            .or_else(|| rates.get(&product_id(ticker)))
            .cloned()
            .ok_or_else(|| crate::SystemError::UnknownReturnData.into())
    }

    /// 查询所有已知合约的手续费率
    pub fn query_commission_rates(&self) -> Result<BTreeMap<Ticker, InstrumentCommissionRate>> {
        let tickers: Vec<Ticker> = {
            let info = self.core.instrument_info.lock();
            info.values().map(|i| i.instrument_id.clone()).collect()
        };
        for ticker in tickers {
            if let Err(e) = self.query_commission_rate(&ticker) {
                log::warn!("{}: commission rate query failed for {}: {}", self.id(), ticker, e);
            }
        }
        Ok(self.core.commission_rates.lock().clone())
    }

    /// 查询并合并昨持仓
    fn query_pre_holding(&self) -> Result<()> {
        let core = &self.core;
        let core_action = core.clone();
        let cond = core.position_mgr.query(1, move || {
            core_action.throttler.wait();
            if let Err(e) = core_action.gateway.req_qry_positions() {
                log::error!("{}: failed to send position query: {}", core_action.id, e);
            }
        });
        if cond != QueryCondition::Succeeded {
            log::error!("{}: querying holding failed after waiting 60s", core.id);
            return Err(TraderError::Network(core.id.clone()));
        }
        Ok(())
    }

    // ==================== 下单/撤单 ====================

    /// 异步下单，立即返回委托索引
    ///
    /// 要求传入的委托已解析完毕：交易所已知，价格类型为网关可受理的
    /// 具体类型。
    pub fn place_order_async(&self, order: &Order) -> Result<OrderIndex> {
        let core = &self.core;
        let exchange = order.exchange.ok_or_else(|| {
            OrderError::info(core.id.clone(), "order exchange is unresolved")
        })?;
        let order_ref = core.order_ref.fetch_add(1, Ordering::SeqCst) + 1;
        let insert = OrderInsert {
            order_ref,
            instrument_id: order.instrument_id.clone(),
            exchange,
            direction: order.direction,
            open_close: order.open_close,
            hedge_flag: order.hedge_flag,
            price_type: order.price_type,
            limit_price: order.limit_price,
            volume: order.volume,
            time_in_force: order.time_in_force,
        };
        core.gateway.req_order_insert(&insert)?;
        log::trace!("{}: order {} request complete", core.id, order_ref);
        let session = core.session.lock();
        Ok(OrderIndex {
            front_id: session.front_id,
            session_id: session.session_id,
            order_ref,
        })
    }

    /// 同步下单
    ///
    /// 短暂阻塞等待首个回报。柜台拒单与交易所拒单以类型化错误返回；
    /// 等待超时且两种回报均未出现时视为"已受理、状态未知"，不报错。
    pub fn place_order_sync(&self, order: &Order) -> Result<OrderIndex> {
        let core = &self.core;
        let mut guard = core.order_sync_mutex.lock();
        let index = self.place_order_async(order)?;
        core.order_cv.wait_while_for(
            &mut guard,
            |_| {
                !(core.ledger.contains_order(index)
                    || core.ledger.is_server_rejected(index.order_ref))
            },
            Duration::from_secs(2),
        );
        drop(guard);

        if core.ledger.is_server_rejected(index.order_ref) {
            return Err(OrderError::RejectedByGateway(core.id.clone()).into());
        }
        if core.ledger.order_status(index) == Some(OrderStatus::RejectedByExchange) {
            return Err(OrderError::RejectedByExchange(core.id.clone()).into());
        }
        Ok(index)
    }

    /// 批量同步下单：全部发出后等待最后一单建档
    pub fn batch_order_sync(&self, orders: &[Order]) -> Result<Vec<OrderIndex>> {
        let core = &self.core;
        let mut guard = core.order_sync_mutex.lock();
        let mut indexes = Vec::with_capacity(orders.len());
        for order in orders {
            indexes.push(self.place_order_async(order)?);
        }
        if let Some(last) = indexes.last().copied() {
            core.order_cv.wait_while_for(
                &mut guard,
                |_| !core.ledger.contains_order(last),
                Duration::from_secs(2),
            );
        }
        Ok(indexes)
    }

    /// 批量查询委托状态；未建档的委托视为柜台拒单
    pub fn batch_order_status(
        &self,
        indexes: &[OrderIndex],
    ) -> Result<BTreeMap<OrderIndex, OrderStatus>> {
        let mut ret = BTreeMap::new();
        for index in indexes {
            match self.core.ledger.order_status(*index) {
                Some(status) => {
                    ret.insert(*index, status);
                }
                None => {
                    return Err(OrderError::RejectedByGateway(self.core.id.clone()).into());
                }
            }
        }
        Ok(ret)
    }

    /// 过滤出尚未终结的委托
    pub fn unfinished_orders(&self, indexes: &[OrderIndex]) -> Vec<OrderIndex> {
        indexes
            .iter()
            .filter(|index| {
                self.core
                    .ledger
                    .order_status(**index)
                    .map(|s| s.is_cancelable())
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    /// 撤单。未知委托索引报 `UnknownOrderRef`
    pub fn cancel_order(&self, index: OrderIndex) -> Result<()> {
        let core = &self.core;
        let record = core
            .ledger
            .order_record(index)
            .ok_or_else(|| OrderError::UnknownOrderRef(core.id.clone()))?;
        let action = OrderAction {
            front_id: record.front_id,
            session_id: record.session_id,
            order_ref: record.order_ref,
            instrument_id: record.instrument_id.clone(),
            exchange: record.exchange,
        };
        core.gateway.req_order_action(&action)?;
        Ok(())
    }

    /// 撤销全部可撤委托
    pub fn cancel_all_pending_orders(&self) -> Result<()> {
        for index in self.core.ledger.cancelable_orders() {
            self.cancel_order(index)?;
        }
        Ok(())
    }
}

impl Drop for TradingAccount {
    /// 登出并释放网关连接，失败只记录
    fn drop(&mut self) {
        self.log_off_sync();
    }
}

/// 发起异步登录链
///
/// 首次调用时注册事件接收器并连接前置；连接已存在时直接补发登录
/// 请求。
fn log_on_async(core: &Arc<AccountCore>) {
    if core.status() == ConnectionStatus::Done {
        log::warn!("{}: account is already logged in", core.id);
        return;
    }
    let connected = !matches!(
        core.status(),
        ConnectionStatus::Uninitialized
            | ConnectionStatus::Initializing
            | ConnectionStatus::Disconnected
            | ConnectionStatus::LoggedOut
    );
    if connected {
        core.request_login();
        return;
    }

    let sink = Arc::new(AccountEventSink { core: core.clone() });
    let addrs = core.broker.trade_server_addrs.clone();
    log::trace!("{}: start logon", core.id);
    core.set_status(ConnectionStatus::Connecting);
    if let Err(e) = core.gateway.connect(&addrs, sink) {
        log::error!("{}: failed to connect trade front: {}", core.id, e);
        core.set_status(ConnectionStatus::Disconnected);
    }
}

/// 发出一次限速后的资金查询并等待应答
fn query_capital(core: &Arc<AccountCore>) {
    let core_action = core.clone();
    let cond = core.capital_mgr.query(1, move || {
        core_action.throttler.wait();
        if let Err(e) = core_action.gateway.req_qry_capital() {
            log::error!("{}: failed to send capital query: {}", core_action.id, e);
        }
    });
    if cond != QueryCondition::Succeeded {
        log::warn!("{}: capital query got no response ({:?})", core.id, cond);
    }
}
