//! 灵活订单处理
//!
//! 把用户层委托（合约大小写不敏感、相对价格、开平可为自动）校验并
//! 拆解为 1-3 张可直接报入网关的具体委托：
//!
//! - 校验：数量、合约存在性、(委托类型, 交易所) 组合、盘口档位偏移
//! - 价格：相对价格按最新深度快照解析为具体限价，限价单校验 tick
//!   整数倍与涨跌停区间，tick 偏移按方向施加后收敛到涨跌停区间内
//! - 开平：显式开/平直接校验放行；自动开平按持仓与交易所今昨仓
//!   消耗顺序拆单，拆单顺序与结算规则一致
//!
//! 处理过程只读取当前深度快照，从不阻塞等待行情。

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;

use crate::core::{
    ClosePrecedence, Exchange, HoldingRecord, InstrumentIndex, InstrumentInfo, MarketDepth,
    OpenClose, Order, OrderPriceType, Direction, Ticker, TimeInForce, Volume,
};
use crate::{OrderError, Result};

/// 灵活订单处理所需的只读上下文
pub struct PlannerContext<'a> {
    /// 账户ID，用于错误信息
    pub account_id: &'a str,
    /// 账户当前持仓
    pub holdings: &'a BTreeMap<InstrumentIndex, HoldingRecord>,
    /// 合约信息表（键为大写合约代码）
    pub instrument_info: &'a BTreeMap<Ticker, InstrumentInfo>,
    /// 共享深度快照表
    pub market_data: &'a DashMap<Ticker, MarketDepth>,
    /// 不区分今昨仓的合约：自动拆单只产生普通平仓腿
    pub no_close_today: &'a BTreeSet<Ticker>,
}

/// 限价是否为最小变动价位的整数倍
fn is_multiple_of_tick(price: f64, tick: f64) -> bool {
    let div = price / tick;
    (div.round() - div).abs() <= 1e-4
}

/// 校验并拆解灵活订单
///
/// 返回的委托序列中每一腿都带有账户、经纪商、解析后的合约/交易所与
/// 调用方指定的有效时间。
pub fn process_advanced_order(mut order: Order, ctx: &PlannerContext) -> Result<Vec<Order>> {
    let id = ctx.account_id;

    if order.volume <= 0 {
        return Err(OrderError::info(
            id,
            format!("Order volume({}) for {}", order.volume, order.instrument_id),
        )
        .into());
    }

    // 合约查找大小写不敏感
    let ticker = order.instrument_id.to_uppercase();
    let info = ctx.instrument_info.get(&ticker).ok_or_else(|| {
        OrderError::info(id, format!("InstrumentID: {} does not exist", ticker))
    })?;
    order.instrument_id = info.instrument_id.clone();
    order.exchange = Some(info.exchange);
    let exchange = info.exchange;

    // 郑商所不支持 FOK
    if exchange == Exchange::CZCE && order.time_in_force == TimeInForce::Fok {
        return Err(OrderError::info(id, "CZCE does not support FOK orders").into());
    }

    if !(1..=5).contains(&order.level_offset) {
        return Err(OrderError::info(id, "Level offset has to be between 1 and 5").into());
    }

    // 价格解析只依赖最新快照，缺失快照直接报错而不是等待行情
    let depth = ctx
        .market_data
        .get(&order.instrument_id)
        .map(|d| d.value().clone())
        .ok_or_else(|| {
            OrderError::info(
                id,
                format!("No market depth snapshot for {}", order.instrument_id),
            )
        })?;

    let level = (order.level_offset - 1) as usize;
    let mut resolved_relative = false;
    match order.price_type {
        OrderPriceType::AnyPrice => {
            if exchange == Exchange::CFFEX {
                order.price_type = OrderPriceType::FiveLevelPrice;
            } else {
                order.price_type = OrderPriceType::LimitPrice;
                order.limit_price = if order.direction == Direction::Long {
                    depth.upper_limit
                } else {
                    depth.lower_limit
                };
            }
        }
        OrderPriceType::LimitPrice => {
            if !is_multiple_of_tick(order.limit_price, info.price_tick) {
                return Err(OrderError::info(
                    id,
                    format!(
                        "Limit price({}) is not a multiple of price tick({})",
                        order.limit_price, info.price_tick
                    ),
                )
                .into());
            }
            if order.limit_price > depth.upper_limit {
                return Err(OrderError::info(
                    id,
                    format!(
                        "Limit price({}) exceeds upper limit({})",
                        order.limit_price, depth.upper_limit
                    ),
                )
                .into());
            }
            if order.limit_price < depth.lower_limit {
                return Err(OrderError::info(
                    id,
                    format!(
                        "Limit price({}) exceeds lower limit({})",
                        order.limit_price, depth.lower_limit
                    ),
                )
                .into());
            }
        }
        OrderPriceType::BestPrice => {
            if exchange != Exchange::CFFEX {
                order.price_type = OrderPriceType::LimitPrice;
                order.limit_price = if order.direction == Direction::Long {
                    depth.ask[0].price
                } else {
                    depth.bid[0].price
                };
                resolved_relative = true;
            }
        }
        OrderPriceType::LastPrice => {
            order.price_type = OrderPriceType::LimitPrice;
            order.limit_price = depth.ohlclvt.last;
            resolved_relative = true;
        }
        OrderPriceType::BidPrice => {
            order.price_type = OrderPriceType::LimitPrice;
            order.limit_price = depth.bid[level].price;
            resolved_relative = true;
        }
        OrderPriceType::AskPrice => {
            order.price_type = OrderPriceType::LimitPrice;
            order.limit_price = depth.ask[level].price;
            resolved_relative = true;
        }
        OrderPriceType::FiveLevelPrice => {
            if exchange != Exchange::CFFEX {
                return Err(OrderError::info(id, "Only CFFEX supports FiveLevelPrice").into());
            }
        }
    }
    if resolved_relative {
        order.limit_price +=
            f64::from(order.tick_offset) * info.price_tick * f64::from(order.direction.sign());
        order.limit_price = order.limit_price.clamp(depth.lower_limit, depth.upper_limit);
    }

    // 开平解析：平仓类指令作用于反方向持仓桶
    let holding_index = InstrumentIndex {
        instrument_id: order.instrument_id.clone(),
        direction: order.direction.reverse(),
        hedge_flag: order.hedge_flag,
    };
    let holding = ctx.holdings.get(&holding_index);
    let require_holding = || -> Result<&HoldingRecord> {
        holding.ok_or_else(|| {
            OrderError::info(
                id,
                format!("Cannot close non-existing position on {}", ticker),
            )
            .into()
        })
    };

    let mut legs = Vec::new();
    match order.open_close {
        OpenClose::Open => legs.push(order),
        OpenClose::Close => {
            let hold = require_holding()?;
            if order.volume > hold.total_quantity {
                return Err(OrderError::info(
                    id,
                    format!(
                        "Closing volume {} is bigger than existing position({}) on {}",
                        order.volume, hold.total_quantity, order.instrument_id
                    ),
                )
                .into());
            }
            legs.push(order);
        }
        OpenClose::CloseYesterday => {
            let hold = require_holding()?;
            if order.volume > hold.pre_quantity {
                return Err(OrderError::info(
                    id,
                    format!(
                        "Closing volume {} is bigger than existing yesterday position({}) on {}",
                        order.volume, hold.pre_quantity, order.instrument_id
                    ),
                )
                .into());
            }
            // 不区分今昨仓的交易所统一报普通平仓
            if !exchange.has_close_today_distinction() {
                order.open_close = OpenClose::Close;
            }
            legs.push(order);
        }
        OpenClose::CloseToday => {
            let hold = require_holding()?;
            if order.volume > hold.today_quantity {
                return Err(OrderError::info(
                    id,
                    format!(
                        "Closing volume {} is bigger than existing today position({}) on {}",
                        order.volume, hold.today_quantity, order.instrument_id
                    ),
                )
                .into());
            }
            legs.push(order);
        }
        OpenClose::Auto => match holding {
            None => {
                // 无反向持仓，整单开仓
                order.open_close = OpenClose::Open;
                legs.push(order);
            }
            Some(hold) => {
                let mut left = order.volume;

                if ctx.no_close_today.contains(&order.instrument_id) {
                    let close_volume = left.min(hold.total_quantity);
                    if close_volume > 0 {
                        let mut leg = order.clone();
                        leg.open_close = OpenClose::Close;
                        leg.volume = close_volume;
                        legs.push(leg);
                        left -= close_volume;
                    }
                } else {
                    // 与结算规则相同的今昨仓消耗顺序
                    let parts = match exchange.close_precedence() {
                        ClosePrecedence::TodayFirst => {
                            [(hold.today_quantity, true), (hold.pre_quantity, false)]
                        }
                        ClosePrecedence::YesterdayFirst => {
                            [(hold.pre_quantity, false), (hold.today_quantity, true)]
                        }
                    };
                    for (available, is_today) in parts {
                        let volume: Volume = left.min(available);
                        if volume > 0 {
                            let mut leg = order.clone();
                            leg.volume = volume;
                            leg.open_close = if is_today {
                                OpenClose::CloseToday
                            } else if exchange.has_close_today_distinction() {
                                OpenClose::CloseYesterday
                            } else {
                                OpenClose::Close
                            };
                            legs.push(leg);
                            left -= volume;
                        }
                    }
                }

                if left > 0 {
                    let mut leg = order;
                    leg.open_close = OpenClose::Open;
                    leg.volume = left;
                    legs.push(leg);
                }
            }
        },
    }
    Ok(legs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HedgeFlag, PriceVolume};
    use crate::TraderError;

    fn instrument(ticker: &str, exchange: Exchange, tick: f64) -> InstrumentInfo {
        InstrumentInfo {
            instrument_type: crate::core::InstrumentType::Future,
            is_trading: true,
            instrument_id: ticker.to_string(),
            instrument_name: ticker.to_string(),
            exchange,
            product_id: crate::utils::product_id(ticker),
            deliver_month: "202612".to_string(),
            max_limit_order_volume: 500,
            min_limit_order_volume: 1,
            volume_multiplier: 10.0,
            price_tick: tick,
            expire_date: "20261215".to_string(),
            long_margin_ratio: 0.1,
            short_margin_ratio: 0.1,
        }
    }

    fn depth_for(ticker: &str, last: f64, lower: f64, upper: f64) -> MarketDepth {
        let mut depth = MarketDepth::default();
        depth.instrument_id = ticker.to_string();
        depth.ohlclvt.last = last;
        depth.lower_limit = lower;
        depth.upper_limit = upper;
        for i in 0..5 {
            depth.bid[i] = PriceVolume { price: last - (i as f64 + 1.0), volume: 10 };
            depth.ask[i] = PriceVolume { price: last + (i as f64 + 1.0), volume: 10 };
        }
        depth
    }

    struct Fixture {
        holdings: BTreeMap<InstrumentIndex, HoldingRecord>,
        instrument_info: BTreeMap<Ticker, InstrumentInfo>,
        market_data: DashMap<Ticker, MarketDepth>,
        no_close_today: BTreeSet<Ticker>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut instrument_info = BTreeMap::new();
            let market_data = DashMap::new();

            for (ticker, exchange, tick) in [
                ("x2612", Exchange::DCE, 1.0),
                ("cu2612", Exchange::SHFE, 1.0),
                ("IF2612", Exchange::CFFEX, 0.2),
                ("SR612", Exchange::CZCE, 1.0),
            ] {
                instrument_info.insert(ticker.to_uppercase(), instrument(ticker, exchange, tick));
                market_data.insert(ticker.to_string(), depth_for(ticker, 100.0, 90.0, 110.0));
            }

            Self {
                holdings: BTreeMap::new(),
                instrument_info,
                market_data,
                no_close_today: BTreeSet::new(),
            }
        }

        fn hold(&mut self, ticker: &str, exchange: Exchange, direction: Direction, today: Volume, pre: Volume) {
            let index = InstrumentIndex {
                instrument_id: ticker.to_string(),
                direction,
                hedge_flag: HedgeFlag::Speculation,
            };
            self.holdings.insert(
                index,
                HoldingRecord {
                    exchange,
                    instrument_id: ticker.to_string(),
                    direction,
                    hedge_flag: HedgeFlag::Speculation,
                    total_quantity: today + pre,
                    today_quantity: today,
                    pre_quantity: pre,
                },
            );
        }

        fn ctx(&self) -> PlannerContext<'_> {
            PlannerContext {
                account_id: "acct - broker",
                holdings: &self.holdings,
                instrument_info: &self.instrument_info,
                market_data: &self.market_data,
                no_close_today: &self.no_close_today,
            }
        }
    }

    fn order(ticker: &str, direction: Direction, volume: Volume) -> Order {
        Order::new("acct", "broker", ticker, direction, volume)
    }

    fn assert_order_error(result: Result<Vec<Order>>, fragment: &str) {
        match result {
            Err(TraderError::Order(e)) => {
                assert!(
                    e.to_string().contains(fragment),
                    "error `{}` does not contain `{}`",
                    e,
                    fragment
                );
            }
            other => panic!("expected order error, got {:?}", other.map(|v| v.len())),
        }
    }

    // ==================== 校验测试 ====================

    /// 数量必须为正
    #[test]
    fn test_rejects_non_positive_volume() {
        let fixture = Fixture::new();
        assert_order_error(
            process_advanced_order(order("x2612", Direction::Long, 0), &fixture.ctx()),
            "Order volume",
        );
    }

    /// 未知合约
    #[test]
    fn test_rejects_unknown_instrument() {
        let fixture = Fixture::new();
        assert_order_error(
            process_advanced_order(order("zz9999", Direction::Long, 1), &fixture.ctx()),
            "does not exist",
        );
    }

    /// 合约大小写不敏感且补全交易所
    #[test]
    fn test_case_insensitive_lookup() {
        let fixture = Fixture::new();
        let mut req = order("X2612", Direction::Long, 1);
        req.open_close = OpenClose::Open;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        assert_eq!(legs[0].instrument_id, "x2612");
        assert_eq!(legs[0].exchange, Some(Exchange::DCE));
    }

    /// 郑商所 FOK 非法
    #[test]
    fn test_rejects_fok_on_czce() {
        let fixture = Fixture::new();
        let mut req = order("SR612", Direction::Long, 1);
        req.time_in_force = TimeInForce::Fok;
        assert_order_error(
            process_advanced_order(req, &fixture.ctx()),
            "does not support FOK",
        );
    }

    /// 盘口档位偏移超界
    #[test]
    fn test_rejects_bad_level_offset() {
        let fixture = Fixture::new();
        let mut req = order("x2612", Direction::Long, 1);
        req.level_offset = 6;
        assert_order_error(
            process_advanced_order(req, &fixture.ctx()),
            "Level offset",
        );
    }

    /// 缺失深度快照直接报错，不阻塞等待行情
    #[test]
    fn test_rejects_missing_snapshot() {
        let fixture = Fixture::new();
        fixture.market_data.remove("x2612");
        assert_order_error(
            process_advanced_order(order("x2612", Direction::Long, 1), &fixture.ctx()),
            "No market depth snapshot",
        );
    }

    // ==================== 价格解析测试 ====================

    /// 限价非 tick 整数倍被拒 (tick=0.2, price=10.1)
    #[test]
    fn test_rejects_price_not_multiple_of_tick() {
        let mut fixture = Fixture::new();
        fixture
            .market_data
            .insert("IF2612".to_string(), depth_for("IF2612", 10.0, 5.0, 15.0));
        let mut req = order("IF2612", Direction::Long, 1);
        req.open_close = OpenClose::Open;
        req.price_type = OrderPriceType::LimitPrice;
        req.limit_price = 10.1;
        assert_order_error(
            process_advanced_order(req, &fixture.ctx()),
            "not a multiple of price tick",
        );
    }

    /// 限价超出涨跌停区间被拒
    #[test]
    fn test_rejects_price_outside_band() {
        let fixture = Fixture::new();
        let mut req = order("x2612", Direction::Long, 1);
        req.open_close = OpenClose::Open;
        req.price_type = OrderPriceType::LimitPrice;
        req.limit_price = 111.0;
        assert_order_error(
            process_advanced_order(req.clone(), &fixture.ctx()),
            "exceeds upper limit",
        );
        req.limit_price = 89.0;
        assert_order_error(
            process_advanced_order(req, &fixture.ctx()),
            "exceeds lower limit",
        );
    }

    /// 最优价解析为对手方一档价
    #[test]
    fn test_best_price_resolves_to_opposite_side() {
        let fixture = Fixture::new();
        let mut req = order("x2612", Direction::Long, 10);
        req.price_type = OrderPriceType::BestPrice;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].open_close, OpenClose::Open);
        assert_eq!(legs[0].volume, 10);
        assert_eq!(legs[0].price_type, OrderPriceType::LimitPrice);
        assert_eq!(legs[0].limit_price, 101.0);
    }

    /// 任意价在非中金所解析为涨跌停限价
    #[test]
    fn test_any_price_resolves_to_band_edge() {
        let fixture = Fixture::new();
        let mut req = order("cu2612", Direction::Long, 1);
        req.open_close = OpenClose::Open;
        req.price_type = OrderPriceType::AnyPrice;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        assert_eq!(legs[0].price_type, OrderPriceType::LimitPrice);
        assert_eq!(legs[0].limit_price, 110.0);
    }

    /// 任意价在中金所转为五档价
    #[test]
    fn test_any_price_on_cffex_becomes_five_level() {
        let fixture = Fixture::new();
        let mut req = order("IF2612", Direction::Short, 1);
        req.open_close = OpenClose::Open;
        req.price_type = OrderPriceType::AnyPrice;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        assert_eq!(legs[0].price_type, OrderPriceType::FiveLevelPrice);
    }

    /// 五档价仅中金所支持
    #[test]
    fn test_five_level_rejected_outside_cffex() {
        let fixture = Fixture::new();
        let mut req = order("x2612", Direction::Long, 1);
        req.price_type = OrderPriceType::FiveLevelPrice;
        assert_order_error(
            process_advanced_order(req, &fixture.ctx()),
            "Only CFFEX supports FiveLevelPrice",
        );
    }

    /// 档位价按偏移取档并施加 tick 偏移后收敛到涨跌停内
    #[test]
    fn test_level_price_with_tick_offset_clamped() {
        let fixture = Fixture::new();
        let mut req = order("x2612", Direction::Long, 1);
        req.open_close = OpenClose::Open;
        req.price_type = OrderPriceType::AskPrice;
        req.level_offset = 2;
        req.tick_offset = 3;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        // ask[1]=102 + 3*1*1 = 105
        assert_eq!(legs[0].limit_price, 105.0);

        let mut req = order("x2612", Direction::Long, 1);
        req.open_close = OpenClose::Open;
        req.price_type = OrderPriceType::AskPrice;
        req.level_offset = 5;
        req.tick_offset = 100;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        assert_eq!(legs[0].limit_price, 110.0);
    }

    // ==================== 开平解析测试 ====================

    /// 自动开平且无反向持仓：单腿开仓全量
    #[test]
    fn test_auto_without_holding_opens_full_volume() {
        let fixture = Fixture::new();
        let legs =
            process_advanced_order(order("x2612", Direction::Long, 10), &fixture.ctx()).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].open_close, OpenClose::Open);
        assert_eq!(legs[0].volume, 10);
    }

    /// 大商所持今仓 4 手，自动平 4 手：仅一腿平今，无开仓腿
    #[test]
    fn test_auto_close_today_exact_on_dce() {
        let mut fixture = Fixture::new();
        fixture.hold("x2612", Exchange::DCE, Direction::Long, 4, 0);
        let legs =
            process_advanced_order(order("x2612", Direction::Short, 4), &fixture.ctx()).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].open_close, OpenClose::CloseToday);
        assert_eq!(legs[0].volume, 4);
    }

    /// 大商所今昨均有，超量自动单拆三腿: 平今 → 平仓(昨) → 开仓
    #[test]
    fn test_auto_splits_three_legs_today_first() {
        let mut fixture = Fixture::new();
        fixture.hold("x2612", Exchange::DCE, Direction::Long, 3, 2);
        let legs =
            process_advanced_order(order("x2612", Direction::Short, 8), &fixture.ctx()).unwrap();
        assert_eq!(legs.len(), 3);
        assert_eq!(legs[0].open_close, OpenClose::CloseToday);
        assert_eq!(legs[0].volume, 3);
        assert_eq!(legs[1].open_close, OpenClose::Close);
        assert_eq!(legs[1].volume, 2);
        assert_eq!(legs[2].open_close, OpenClose::Open);
        assert_eq!(legs[2].volume, 3);
    }

    /// 中金所先开先平：先平昨再平今
    #[test]
    fn test_auto_splits_yesterday_first_on_cffex() {
        let mut fixture = Fixture::new();
        fixture.hold("IF2612", Exchange::CFFEX, Direction::Long, 3, 2);
        let legs =
            process_advanced_order(order("IF2612", Direction::Short, 4), &fixture.ctx()).unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].open_close, OpenClose::Close);
        assert_eq!(legs[0].volume, 2);
        assert_eq!(legs[1].open_close, OpenClose::CloseToday);
        assert_eq!(legs[1].volume, 2);
    }

    /// 上期所拆单使用显式平今/平昨标志
    #[test]
    fn test_auto_uses_explicit_tags_on_shfe() {
        let mut fixture = Fixture::new();
        fixture.hold("cu2612", Exchange::SHFE, Direction::Long, 2, 3);
        let legs =
            process_advanced_order(order("cu2612", Direction::Short, 5), &fixture.ctx()).unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].open_close, OpenClose::CloseToday);
        assert_eq!(legs[0].volume, 2);
        assert_eq!(legs[1].open_close, OpenClose::CloseYesterday);
        assert_eq!(legs[1].volume, 3);
    }

    /// 豁免表合约只产生一腿普通平仓
    #[test]
    fn test_no_close_today_ticker_emits_single_close_leg() {
        let mut fixture = Fixture::new();
        fixture.hold("cu2612", Exchange::SHFE, Direction::Long, 2, 3);
        fixture.no_close_today.insert("cu2612".to_string());
        let legs =
            process_advanced_order(order("cu2612", Direction::Short, 7), &fixture.ctx()).unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].open_close, OpenClose::Close);
        assert_eq!(legs[0].volume, 5);
        assert_eq!(legs[1].open_close, OpenClose::Open);
        assert_eq!(legs[1].volume, 2);
    }

    /// 显式平仓无持仓被拒
    #[test]
    fn test_explicit_close_without_holding_rejected() {
        let fixture = Fixture::new();
        let mut req = order("x2612", Direction::Short, 1);
        req.open_close = OpenClose::Close;
        assert_order_error(
            process_advanced_order(req, &fixture.ctx()),
            "non-existing position",
        );
    }

    /// 显式平仓超量被拒
    #[test]
    fn test_explicit_close_volume_exceeds_holding() {
        let mut fixture = Fixture::new();
        fixture.hold("x2612", Exchange::DCE, Direction::Long, 2, 1);
        let mut req = order("x2612", Direction::Short, 4);
        req.open_close = OpenClose::Close;
        assert_order_error(
            process_advanced_order(req, &fixture.ctx()),
            "bigger than existing position",
        );

        let mut req = order("x2612", Direction::Short, 3);
        req.open_close = OpenClose::CloseToday;
        assert_order_error(
            process_advanced_order(req, &fixture.ctx()),
            "bigger than existing today position",
        );
    }

    /// 显式平昨在不区分今昨仓的交易所折算为普通平仓
    #[test]
    fn test_close_yesterday_folds_to_close_on_dce() {
        let mut fixture = Fixture::new();
        fixture.hold("x2612", Exchange::DCE, Direction::Long, 0, 3);
        let mut req = order("x2612", Direction::Short, 2);
        req.open_close = OpenClose::CloseYesterday;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        assert_eq!(legs[0].open_close, OpenClose::Close);

        // 上期所保持显式平昨
        let mut fixture = Fixture::new();
        fixture.hold("cu2612", Exchange::SHFE, Direction::Long, 0, 3);
        let mut req = order("cu2612", Direction::Short, 2);
        req.open_close = OpenClose::CloseYesterday;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        assert_eq!(legs[0].open_close, OpenClose::CloseYesterday);
    }

    /// 每条腿都带有账户与有效时间
    #[test]
    fn test_legs_carry_account_and_tif() {
        let mut fixture = Fixture::new();
        fixture.hold("x2612", Exchange::DCE, Direction::Long, 1, 1);
        let mut req = order("x2612", Direction::Short, 3);
        req.time_in_force = TimeInForce::Fak;
        let legs = process_advanced_order(req, &fixture.ctx()).unwrap();
        assert_eq!(legs.len(), 3);
        for leg in &legs {
            assert_eq!(leg.account_name, "acct");
            assert_eq!(leg.broker_name, "broker");
            assert_eq!(leg.time_in_force, TimeInForce::Fak);
            assert_eq!(leg.exchange, Some(Exchange::DCE));
        }
    }
}
