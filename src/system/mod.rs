//! 多账户交易系统
//!
//! 持有一组交易账户与一个共享行情源：并行登录、并行手续费查询、
//! 聚合查询、灵活订单路由、批量清仓与全量撤单、快照导出。
//!
//! 账户按 (账户名, 经纪商名) 索引，经纪商信息需先于账户注册；引用
//! 未注册经纪商的账户在注册时即报配置错误。单个账户的登录失败只
//! 记录，不影响其余账户。

pub mod snapshot;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::account::TradingAccount;
use crate::core::{
    AccountInfo, AccountKey, BrokerInfo, HoldingRecord, InstrumentIndex, InstrumentInfo, OpenClose,
    Order, OrderIndex, OrderPriceType, OrderRecord, Ticker, TimeInForce, TradingRecord,
};
use crate::gateway::GatewayFactory;
use crate::market::MarketDataFeed;
use crate::planner::{process_advanced_order, PlannerContext};
use crate::utils::config::TraderConfig;
use crate::{ConfigError, OrderError, Result, SystemError};

use snapshot::{AccountSnapshot, SystemSnapshot};

/// 并行登录时相邻账户的启动间隔，避免登录风暴
const LOGIN_STAGGER: Duration = Duration::from_secs(2);

/// 多账户交易系统
pub struct TradingSystem {
    factory: Arc<dyn GatewayFactory>,
    brokers: Mutex<BTreeMap<String, BrokerInfo>>,
    accounts: Mutex<BTreeMap<AccountKey, Arc<TradingAccount>>>,
    instrument_info: Mutex<BTreeMap<Ticker, InstrumentInfo>>,
    md_feed: Mutex<Option<Arc<MarketDataFeed>>>,
    no_close_today: Mutex<BTreeSet<Ticker>>,
    login_stagger: Mutex<Duration>,
}

impl TradingSystem {
    /// 创建交易系统，网关经工厂按经纪商创建
    pub fn new(factory: Arc<dyn GatewayFactory>) -> Self {
        Self {
            factory,
            brokers: Mutex::new(BTreeMap::new()),
            accounts: Mutex::new(BTreeMap::new()),
            instrument_info: Mutex::new(BTreeMap::new()),
            md_feed: Mutex::new(None),
            no_close_today: Mutex::new(BTreeSet::new()),
            login_stagger: Mutex::new(LOGIN_STAGGER),
        }
    }

    // ==================== getter ====================

    /// 注册账户是否为空
    pub fn is_empty(&self) -> bool {
        self.accounts.lock().is_empty()
    }

    /// 注册账户数
    pub fn len(&self) -> usize {
        self.accounts.lock().len()
    }

    /// 已注册账户索引
    pub fn available_accounts(&self) -> Vec<AccountKey> {
        self.accounts.lock().keys().cloned().collect()
    }

    /// 账户句柄（仅要求已注册）
    pub fn get_handle(&self, account: &AccountKey) -> Result<Arc<TradingAccount>> {
        self.accounts
            .lock()
            .get(account)
            .cloned()
            .ok_or_else(|| SystemError::AccountNotRegistered(account.to_string()).into())
    }

    /// 合约基本信息。需在至少一个账户登录并查询合约后才有内容
    pub fn instrument_info(&self) -> BTreeMap<Ticker, InstrumentInfo> {
        self.instrument_info.lock().clone()
    }

    /// 调整并行登录的启动间隔
    pub fn set_login_stagger(&self, stagger: Duration) {
        *self.login_stagger.lock() = stagger;
    }

    // ==================== 注册 ====================

    /// 添加经纪商信息
    pub fn add_broker(&self, broker: BrokerInfo) {
        self.brokers.lock().insert(broker.broker_name.clone(), broker);
    }

    /// 批量添加经纪商信息
    pub fn add_brokers(&self, brokers: Vec<BrokerInfo>) {
        for broker in brokers {
            self.add_broker(broker);
        }
    }

    /// 添加账户。对应经纪商需已注册，否则报配置错误
    pub fn add_account(&self, account_info: &AccountInfo) -> Result<()> {
        if !account_info.enable {
            return Ok(());
        }
        let broker = self
            .brokers
            .lock()
            .get(&account_info.broker_name)
            .cloned()
            .ok_or_else(|| ConfigError::MissingBroker(account_info.broker_name.clone()))?;

        let gateway = self.factory.create_trader(&broker)?;
        let account = Arc::new(TradingAccount::new(account_info, &broker, gateway));
        let key = account.key();
        self.accounts.lock().insert(key.clone(), account);
        log::info!("Account {} added", key);
        Ok(())
    }

    /// 批量添加账户，单个失败只记录
    pub fn add_accounts(&self, accounts: &[AccountInfo]) {
        for account in accounts {
            if let Err(e) = self.add_account(account) {
                log::error!(
                    "Failed to add account {} - {}: {}",
                    account.account_name,
                    account.broker_name,
                    e
                );
            }
        }
    }

    /// 添加行情源
    pub fn add_market_data_source(&self, server_addrs: Vec<String>) -> Result<()> {
        let gateway = self.factory.create_md()?;
        let feed = Arc::new(MarketDataFeed::new(server_addrs, gateway));
        *self.md_feed.lock() = Some(feed);
        Ok(())
    }

    /// 行情源句柄
    pub fn market_data_feed(&self) -> Option<Arc<MarketDataFeed>> {
        self.md_feed.lock().clone()
    }

    /// 设置不区分今昨仓的合约
    pub fn set_no_close_today_tickers(&self, tickers: BTreeSet<Ticker>) {
        *self.no_close_today.lock() = tickers;
    }

    /// 从配置初始化：行情源、经纪商、账户、今昨仓豁免表
    pub fn init_from_config(&self, config: &TraderConfig) -> Result<()> {
        if !config.md_server_addrs.is_empty() {
            self.add_market_data_source(config.md_server_addrs.clone())?;
        }
        self.add_brokers(config.brokers.clone());
        self.add_accounts(&config.accounts);
        self.set_no_close_today_tickers(config.no_close_today_tickers.iter().cloned().collect());
        Ok(())
    }

    // ==================== 登录/登出 ====================

    /// 登录所有注册账户，随后登录行情源
    ///
    /// 每个账户一个登录线程，相邻启动间隔固定延时；单个账户的登录
    /// 失败只记录。全部账户线程汇合后登录行情源。
    pub fn log_on(&self) {
        let stagger = *self.login_stagger.lock();
        let accounts: Vec<Arc<TradingAccount>> = self.accounts.lock().values().cloned().collect();
        let mut handles = Vec::with_capacity(accounts.len());
        let count = accounts.len();
        for (i, account) in accounts.into_iter().enumerate() {
            handles.push(std::thread::spawn(move || {
                if !account.is_logged_in() {
                    if let Err(e) = account.log_on_sync() {
                        log::error!("{}", e);
                    }
                }
            }));
            if i + 1 < count {
                std::thread::sleep(stagger);
            }
        }
        for handle in handles {
            let _ = handle.join();
        }

        let feed = self.md_feed.lock().clone();
        if let Some(feed) = feed {
            if let Err(e) = feed.log_in() {
                log::error!("Market data source failed to log in: {}", e);
            }
        }
    }

    /// 登录单个账户
    pub fn log_on_account(&self, account: &AccountKey) -> Result<()> {
        let handle = self.get_handle(account)?;
        handle.log_on_sync()
    }

    /// 登出行情源与所有账户并清空注册表
    ///
    /// 行情源先退订再登出，退订失败只记录。
    pub fn log_off(&self) {
        if let Some(feed) = self.md_feed.lock().take() {
            let tickers: Vec<Ticker> = feed.subscribed_tickers().into_iter().collect();
            if !tickers.is_empty() {
                if let Err(e) = feed.unsubscribe(&tickers) {
                    log::warn!("Market data: unsubscribe before logout failed: {}", e);
                }
            }
            feed.log_out();
        }
        let mut accounts = self.accounts.lock();
        for (_, account) in accounts.iter() {
            account.log_off_sync();
        }
        accounts.clear();
    }

    /// 登出并移除单个账户
    pub fn log_off_account(&self, account: &AccountKey) {
        match self.accounts.lock().remove(account) {
            Some(handle) => handle.log_off_sync(),
            None => log::warn!("Logging off a non-existing account({})", account),
        }
    }

    // ==================== 查询 ====================

    /// 经首个已登录账户查询全市场合约
    pub fn query_instruments(&self) -> Result<BTreeMap<Ticker, InstrumentInfo>> {
        let account = {
            let accounts = self.accounts.lock();
            accounts.values().find(|a| a.is_logged_in()).cloned()
        };
        match account {
            Some(account) => {
                let info = account.query_instruments()?;
                *self.instrument_info.lock() = info.clone();
                Ok(info)
            }
            None => {
                log::error!("NO account registered and logged in, cannot query market instruments");
                Err(SystemError::AccountNotLoggedIn("any account".to_string()).into())
            }
        }
    }

    /// 所有账户并行查询全部合约的手续费率，全部汇合后返回
    pub fn query_commission_rate(&self) {
        let tickers: Vec<Ticker> = self
            .instrument_info
            .lock()
            .values()
            .map(|info| info.instrument_id.clone())
            .collect();
        let accounts: Vec<Arc<TradingAccount>> = self.accounts.lock().values().cloned().collect();

        let mut handles = Vec::with_capacity(accounts.len());
        for account in accounts {
            let tickers = tickers.clone();
            handles.push(std::thread::spawn(move || {
                for ticker in &tickers {
                    if let Err(e) = account.query_commission_rate(ticker) {
                        log::warn!(
                            "{}: commission rate query failed for {}: {}",
                            account.id(),
                            ticker,
                            e
                        );
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// 订阅市场上的所有已知合约
    pub fn subscribe_instruments(&self) -> Result<()> {
        let tickers: Vec<Ticker> = self
            .instrument_info
            .lock()
            .values()
            .map(|info| info.instrument_id.clone())
            .collect();
        self.subscribe(&tickers)
    }

    /// 订阅指定合约
    pub fn subscribe(&self, tickers: &[Ticker]) -> Result<()> {
        let feed = self
            .md_feed
            .lock()
            .clone()
            .ok_or_else(|| OrderError::info("system", "market data source not configured"))?;
        feed.subscribe(tickers)
    }

    /// 筛选指定品种的所有合约
    pub fn list_products(&self, product_ids: &[String]) -> Vec<Ticker> {
        let product_ids: Vec<String> = product_ids.iter().map(|p| p.to_uppercase()).collect();
        self.instrument_info
            .lock()
            .iter()
            .filter(|(ticker, _)| product_ids.iter().any(|p| ticker.starts_with(p.as_str())))
            .map(|(_, info)| info.instrument_id.clone())
            .collect()
    }

    /// 订阅指定品种的所有合约
    pub fn subscribe_products(&self, product_ids: &[String]) -> Result<()> {
        let tickers = self.list_products(product_ids);
        self.subscribe(&tickers)
    }

    // ==================== 聚合 ====================

    /// 所有已登录账户的持仓
    pub fn get_holding(&self) -> BTreeMap<AccountKey, BTreeMap<InstrumentIndex, HoldingRecord>> {
        self.accounts
            .lock()
            .iter()
            .filter(|(_, account)| account.is_logged_in())
            .map(|(key, account)| (key.clone(), account.holding()))
            .collect()
    }

    /// 单个账户的持仓
    pub fn get_account_holding(
        &self,
        account: &AccountKey,
    ) -> Result<BTreeMap<InstrumentIndex, HoldingRecord>> {
        Ok(self.check_account(account)?.holding())
    }

    /// 所有已登录账户的成交
    pub fn get_trades(&self) -> BTreeMap<AccountKey, Vec<TradingRecord>> {
        self.accounts
            .lock()
            .iter()
            .filter(|(_, account)| account.is_logged_in())
            .map(|(key, account)| (key.clone(), account.trades()))
            .collect()
    }

    /// 单个账户的成交
    pub fn get_account_trades(&self, account: &AccountKey) -> Result<Vec<TradingRecord>> {
        Ok(self.check_account(account)?.trades())
    }

    /// 所有已登录账户的委托
    pub fn get_orders(&self) -> BTreeMap<AccountKey, Vec<OrderRecord>> {
        self.accounts
            .lock()
            .iter()
            .filter(|(_, account)| account.is_logged_in())
            .map(|(key, account)| (key.clone(), account.orders().into_values().collect()))
            .collect()
    }

    /// 单个账户的委托
    pub fn get_account_orders(&self, account: &AccountKey) -> Result<Vec<OrderRecord>> {
        Ok(self.check_account(account)?.orders().into_values().collect())
    }

    // ==================== 下单 ====================

    /// 异步下单（不经过灵活订单处理）
    pub fn place_order_async(&self, order: &Order) -> Result<OrderIndex> {
        let account = self.check_account(&order.account_key())?;
        account.place_order_async(order)
    }

    /// 同步下单（不经过灵活订单处理）
    pub fn place_order_sync(&self, order: &Order) -> Result<OrderIndex> {
        let account = self.check_account(&order.account_key())?;
        account.place_order_sync(order)
    }

    /// 校验并拆解灵活订单
    pub fn process_advanced_order(&self, order: Order) -> Result<Vec<Order>> {
        let account = self.check_account(&order.account_key())?;
        let feed = self
            .md_feed
            .lock()
            .clone()
            .ok_or_else(|| OrderError::info(account.id(), "market data source not configured"))?;
        let market_data = feed.market_data();
        let holdings = account.holding();
        let instrument_info = self.instrument_info.lock().clone();
        let no_close_today = self.no_close_today.lock().clone();
        let ctx = PlannerContext {
            account_id: account.id(),
            holdings: &holdings,
            instrument_info: &instrument_info,
            market_data: &market_data,
            no_close_today: &no_close_today,
        };
        process_advanced_order(order, &ctx)
    }

    /// 同步下灵活订单
    pub fn place_advanced_order_sync(&self, order: Order) -> Result<Vec<OrderIndex>> {
        let legs = self.process_advanced_order(order)?;
        let mut indexes = Vec::with_capacity(legs.len());
        for leg in &legs {
            indexes.push(self.place_order_sync(leg)?);
        }
        Ok(indexes)
    }

    /// 异步下灵活订单
    pub fn place_advanced_order_async(&self, order: Order) -> Result<Vec<OrderIndex>> {
        let legs = self.process_advanced_order(order)?;
        let mut indexes = Vec::with_capacity(legs.len());
        for leg in &legs {
            indexes.push(self.place_order_async(leg)?);
        }
        Ok(indexes)
    }

    /// 撤单
    pub fn cancel_order(&self, account: &AccountKey, index: OrderIndex) -> Result<()> {
        self.check_account(account)?.cancel_order(index)
    }

    // ==================== 批量操作 ====================

    /// 账户清仓
    ///
    /// 逐个持仓桶按非零的今/昨子项生成反向平仓单，经灵活订单处理后
    /// 同步下达。批量清仓必须使用相对价格类型，固定限价一开始就被
    /// 拒绝。
    pub fn clear_all_holdings(
        &self,
        account: &AccountKey,
        time_in_force: TimeInForce,
        price_type: OrderPriceType,
    ) -> Result<()> {
        let handle = self.check_account(account)?;
        if price_type == OrderPriceType::LimitPrice {
            return Err(
                OrderError::info(handle.id(), "Batch orders cannot use single limit price").into(),
            );
        }
        log::info!("Clearing all position in account {}", account);
        for (_, holding) in handle.holding() {
            for mut order in reverse_position(&holding) {
                order.account_name = account.account_name.clone();
                order.broker_name = account.broker_name.clone();
                order.time_in_force = time_in_force;
                order.price_type = price_type;
                self.place_advanced_order_sync(order)?;
            }
        }
        log::info!("All position in account {} cleared", account);
        Ok(())
    }

    /// 取消某个账户的全部可撤委托
    pub fn cancel_account_pending_orders(&self, account: &AccountKey) -> Result<()> {
        self.check_account(account)?.cancel_all_pending_orders()
    }

    /// 取消所有账户的全部可撤委托
    pub fn cancel_all_pending_orders(&self) {
        let accounts: Vec<Arc<TradingAccount>> = self.accounts.lock().values().cloned().collect();
        for account in accounts {
            if let Err(e) = account.cancel_all_pending_orders() {
                log::error!("{}: failed to cancel pending orders: {}", account.id(), e);
            }
        }
    }

    // ==================== 快照 ====================

    /// 采集系统快照
    pub fn snapshot(&self) -> SystemSnapshot {
        let account_info = self
            .accounts
            .lock()
            .values()
            .map(|account| AccountSnapshot::capture(account))
            .collect();
        let market_data = self
            .md_feed
            .lock()
            .clone()
            .map(|feed| {
                feed.market_data()
                    .iter()
                    .map(|entry| (entry.key().clone(), entry.value().clone()))
                    .collect()
            })
            .unwrap_or_default();
        SystemSnapshot {
            account_info,
            instrument_info: self.instrument_info.lock().clone(),
            market_data,
        }
    }

    /// 导出系统快照到文件
    pub fn dump_info_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        self.snapshot().dump(path)
    }

    // ==================== helper ====================

    /// 要求账户已注册且处于可交易状态
    fn check_account(&self, account: &AccountKey) -> Result<Arc<TradingAccount>> {
        let handle = self.get_handle(account)?;
        if !handle.is_logged_in() {
            return Err(SystemError::AccountNotLoggedIn(account.to_string()).into());
        }
        Ok(handle)
    }
}

impl Drop for TradingSystem {
    fn drop(&mut self) {
        self.log_off();
    }
}

/// 按持仓桶生成反向平仓单：昨仓报平昨，今仓报平今
fn reverse_position(holding: &HoldingRecord) -> Vec<Order> {
    let mut template = Order::new(
        String::new(),
        String::new(),
        holding.instrument_id.clone(),
        holding.direction.reverse(),
        0,
    );
    template.exchange = Some(holding.exchange);
    template.hedge_flag = holding.hedge_flag;

    let mut orders = Vec::new();
    if holding.pre_quantity != 0 {
        let mut order = template.clone();
        order.open_close = OpenClose::CloseYesterday;
        order.volume = holding.pre_quantity;
        orders.push(order);
    }
    if holding.today_quantity != 0 {
        let mut order = template;
        order.open_close = OpenClose::CloseToday;
        order.volume = holding.today_quantity;
        orders.push(order);
    }
    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Direction, Exchange, HedgeFlag};

    fn holding(direction: Direction, today: i32, pre: i32) -> HoldingRecord {
        HoldingRecord {
            exchange: Exchange::DCE,
            instrument_id: "x2612".to_string(),
            direction,
            hedge_flag: HedgeFlag::Speculation,
            total_quantity: today + pre,
            today_quantity: today,
            pre_quantity: pre,
        }
    }

    /// 今昨仓各生成一腿反向平仓单
    #[test]
    fn test_reverse_position_both_legs() {
        let orders = reverse_position(&holding(Direction::Long, 2, 3));
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].open_close, OpenClose::CloseYesterday);
        assert_eq!(orders[0].volume, 3);
        assert_eq!(orders[0].direction, Direction::Short);
        assert_eq!(orders[1].open_close, OpenClose::CloseToday);
        assert_eq!(orders[1].volume, 2);
    }

    /// 零子项不生成对应腿
    #[test]
    fn test_reverse_position_skips_zero_parts() {
        let orders = reverse_position(&holding(Direction::Short, 0, 4));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].open_close, OpenClose::CloseYesterday);
        assert_eq!(orders[0].direction, Direction::Long);
    }
}
