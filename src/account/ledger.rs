//! 账户台账
//!
//! 维护单个账户的资金、持仓、成交、委托四类状态，分别用独立的锁
//! 保护，推送线程更新某一类时不阻塞其他类的并发读取。
//!
//! 持仓更新是本模块的正确性核心：开仓增今仓；显式平今/平昨直接扣减
//! 对应子项；普通平仓按交易所规则拆分今昨仓消耗顺序。任何时刻满足
//! `total_quantity == today_quantity + pre_quantity`。

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;

use crate::core::{
    CapitalInfo, ClosePrecedence, HoldingRecord, InstrumentIndex, OpenClose, OrderIndex,
    OrderRecord, OrderStatus, TradingRecord, Volume,
};
use crate::gateway::{OrderReturn, PositionField, TradeReturn};

/// 委托回报的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPushOutcome {
    /// 首次见到该委托索引，已建档
    NewRecord,
    /// 已有记录状态更新
    Updated,
    /// 交易所拒单
    ExchangeRejected,
}

/// 委托簿：委托记录与派生的可撤集合，同一把锁下维护
#[derive(Default)]
struct OrderBook {
    records: BTreeMap<OrderIndex, OrderRecord>,
    cancelable: BTreeSet<OrderIndex>,
    /// 柜台拒单的委托编号（记录从未建档）
    server_rejects: BTreeSet<i64>,
}

impl OrderBook {
    /// 按最新状态重算该委托的可撤集合成员资格
    fn refresh_cancelable(&mut self, index: OrderIndex) {
        let cancelable = self
            .records
            .get(&index)
            .map(|rec| rec.status.is_cancelable())
            .unwrap_or(false);
        if cancelable {
            self.cancelable.insert(index);
        } else {
            self.cancelable.remove(&index);
        }
    }
}

/// 账户台账
pub struct AccountLedger {
    capital: Mutex<CapitalInfo>,
    holdings: Mutex<BTreeMap<InstrumentIndex, HoldingRecord>>,
    trades: Mutex<Vec<TradingRecord>>,
    orders: Mutex<OrderBook>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self {
            capital: Mutex::new(CapitalInfo::default()),
            holdings: Mutex::new(BTreeMap::new()),
            trades: Mutex::new(Vec::new()),
            orders: Mutex::new(OrderBook::default()),
        }
    }

    // ==================== 资金 ====================

    /// 当前资金状况
    pub fn capital(&self) -> CapitalInfo {
        *self.capital.lock()
    }

    /// 整体替换资金状况（资金查询应答）
    pub fn set_capital(&self, capital: CapitalInfo) {
        *self.capital.lock() = capital;
    }

    // ==================== 持仓 ====================

    /// 持仓记录快照
    pub fn holdings(&self) -> BTreeMap<InstrumentIndex, HoldingRecord> {
        self.holdings.lock().clone()
    }

    /// 合并一行昨持仓查询应答
    ///
    /// 同一持仓索引的多行应答累加 `total`/`pre`，今仓保持 0。
    pub fn seed_pre_position(&self, position: &PositionField) {
        let index = InstrumentIndex {
            instrument_id: position.instrument_id.clone(),
            direction: position.direction,
            hedge_flag: position.hedge_flag,
        };
        let mut holdings = self.holdings.lock();
        match holdings.get_mut(&index) {
            Some(rec) => {
                rec.total_quantity += position.yd_position;
                rec.pre_quantity += position.yd_position;
            }
            None => {
                holdings.insert(
                    index,
                    HoldingRecord {
                        exchange: position.exchange,
                        instrument_id: position.instrument_id.clone(),
                        direction: position.direction,
                        hedge_flag: position.hedge_flag,
                        total_quantity: position.yd_position,
                        today_quantity: 0,
                        pre_quantity: position.yd_position,
                    },
                );
            }
        }
    }

    /// 应用一笔成交回报：追加成交记录并更新持仓
    ///
    /// 平仓成交作用于反方向的持仓桶。普通平仓按交易所的今昨仓消耗
    /// 顺序拆分，显式平今/平昨以网关标志为准。
    pub fn apply_trade(&self, trade: &TradeReturn) {
        let record = TradingRecord {
            order_ref: trade.order_ref,
            exchange: trade.exchange,
            instrument_id: trade.instrument_id.clone(),
            open_close: trade.open_close,
            direction: trade.direction,
            hedge_flag: trade.hedge_flag,
            price: trade.price,
            volume: trade.volume,
            time: trade.time.clone(),
        };
        self.trades.lock().push(record);

        let bucket_direction = if trade.open_close == OpenClose::Open {
            trade.direction
        } else {
            trade.direction.reverse()
        };
        let index = InstrumentIndex {
            instrument_id: trade.instrument_id.clone(),
            direction: bucket_direction,
            hedge_flag: trade.hedge_flag,
        };

        let mut holdings = self.holdings.lock();
        match holdings.get_mut(&index) {
            Some(rec) => {
                rec.total_quantity += trade.open_close.sign() * trade.volume;
                match trade.open_close {
                    OpenClose::Open => rec.today_quantity += trade.volume,
                    OpenClose::CloseToday => rec.today_quantity -= trade.volume,
                    OpenClose::CloseYesterday => rec.pre_quantity -= trade.volume,
                    OpenClose::Close => match trade.exchange.close_precedence() {
                        ClosePrecedence::TodayFirst => {
                            let today: Volume = rec.today_quantity.min(trade.volume);
                            rec.today_quantity -= today;
                            rec.pre_quantity -= trade.volume - today;
                        }
                        ClosePrecedence::YesterdayFirst => {
                            let pre: Volume = rec.pre_quantity.min(trade.volume);
                            rec.pre_quantity -= pre;
                            rec.today_quantity -= trade.volume - pre;
                        }
                    },
                    OpenClose::Auto => {}
                }
            }
            None => {
                if trade.open_close != OpenClose::Open {
                    log::warn!(
                        "Close fill on unseen position bucket {} {:?}, recording as fresh opening",
                        trade.instrument_id,
                        bucket_direction
                    );
                }
                holdings.insert(
                    index,
                    HoldingRecord {
                        exchange: trade.exchange,
                        instrument_id: trade.instrument_id.clone(),
                        direction: bucket_direction,
                        hedge_flag: trade.hedge_flag,
                        total_quantity: trade.volume,
                        today_quantity: trade.volume,
                        pre_quantity: 0,
                    },
                );
            }
        }
    }

    // ==================== 成交 ====================

    /// 成交记录快照
    pub fn trades(&self) -> Vec<TradingRecord> {
        self.trades.lock().clone()
    }

    // ==================== 委托 ====================

    /// 委托记录快照
    pub fn orders(&self) -> BTreeMap<OrderIndex, OrderRecord> {
        self.orders.lock().records.clone()
    }

    /// 可撤委托索引快照
    pub fn cancelable_orders(&self) -> Vec<OrderIndex> {
        self.orders.lock().cancelable.iter().copied().collect()
    }

    /// 查询单个委托状态
    pub fn order_status(&self, index: OrderIndex) -> Option<OrderStatus> {
        self.orders.lock().records.get(&index).map(|rec| rec.status)
    }

    /// 委托是否已建档
    pub fn contains_order(&self, index: OrderIndex) -> bool {
        self.orders.lock().records.contains_key(&index)
    }

    /// 查询一个委托的完整记录
    pub fn order_record(&self, index: OrderIndex) -> Option<OrderRecord> {
        self.orders.lock().records.get(&index).cloned()
    }

    /// 应用一笔委托回报
    ///
    /// 网关是权威数据源：未见过的委托索引直接建档，已有记录原地
    /// 更新状态与数量；交易所拒单置 `RejectedByExchange`。每次回报后
    /// 重算该委托的可撤集合成员资格。
    pub fn apply_order_return(&self, push: &OrderReturn) -> OrderPushOutcome {
        let index = OrderIndex {
            front_id: push.front_id,
            session_id: push.session_id,
            order_ref: push.order_ref,
        };
        let mut book = self.orders.lock();
        let outcome = match book.records.get_mut(&index) {
            None => {
                let rejected = push.submit_rejected;
                if rejected {
                    log::error!(
                        "Order(ref: {}) was rejected by exchange. message: {}",
                        push.order_ref,
                        push.status_msg
                    );
                }
                book.records.insert(
                    index,
                    OrderRecord {
                        front_id: push.front_id,
                        session_id: push.session_id,
                        order_ref: push.order_ref,
                        exchange: push.exchange,
                        instrument_id: push.instrument_id.clone(),
                        open_close: push.open_close,
                        direction: push.direction,
                        hedge_flag: push.hedge_flag,
                        total_volume: push.total_volume,
                        traded_volume: push.traded_volume,
                        remained_volume: push.remained_volume,
                        price_type: push.price_type,
                        limit_price: push.limit_price,
                        time_condition: push.time_condition,
                        status: if rejected {
                            OrderStatus::RejectedByExchange
                        } else {
                            push.status
                        },
                        time: push.time.clone(),
                    },
                );
                if rejected {
                    OrderPushOutcome::ExchangeRejected
                } else {
                    OrderPushOutcome::NewRecord
                }
            }
            Some(rec) => {
                if push.submit_rejected {
                    rec.status = OrderStatus::RejectedByExchange;
                    log::error!(
                        "Order(ref: {}) was rejected by exchange. message: {}",
                        push.order_ref,
                        push.status_msg
                    );
                    OrderPushOutcome::ExchangeRejected
                } else {
                    rec.status = push.status;
                    rec.remained_volume = push.remained_volume;
                    rec.traded_volume = push.traded_volume;
                    OrderPushOutcome::Updated
                }
            }
        };
        book.refresh_cancelable(index);
        outcome
    }

    /// 记录一笔柜台拒单（该委托永远不会建档）
    pub fn note_server_reject(&self, order_ref: i64) {
        self.orders.lock().server_rejects.insert(order_ref);
    }

    /// 该委托编号是否被柜台拒单
    pub fn is_server_rejected(&self, order_ref: i64) -> bool {
        self.orders.lock().server_rejects.contains(&order_ref)
    }

    // ==================== 衍生查询 ====================

    /// 各合约净持仓（多头为正，空头为负）
    pub fn net_holdings(&self) -> BTreeMap<String, Volume> {
        let mut net = BTreeMap::new();
        for (index, rec) in self.holdings.lock().iter() {
            *net.entry(index.instrument_id.clone()).or_insert(0) +=
                index.direction.sign() * rec.total_quantity;
        }
        net
    }

    /// 各合约净成交量（开仓为正方向、平仓为反方向计量）
    pub fn net_trades(&self) -> BTreeMap<String, Volume> {
        let mut net = BTreeMap::new();
        for trade in self.trades.lock().iter() {
            let sign = trade.direction.sign()
                * if trade.open_close == OpenClose::Open { 1 } else { -1 };
            *net.entry(trade.instrument_id.clone()).or_insert(0) += sign * trade.volume;
        }
        net
    }
}

impl Default for AccountLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Direction, Exchange, HedgeFlag, OrderPriceType, TimeCondition};

    fn trade(
        exchange: Exchange,
        open_close: OpenClose,
        direction: Direction,
        volume: Volume,
    ) -> TradeReturn {
        TradeReturn {
            order_ref: 1,
            exchange,
            instrument_id: "test0001".to_string(),
            open_close,
            direction,
            hedge_flag: HedgeFlag::Speculation,
            price: 100.0,
            volume,
            time: "2026-08-06 10:00:00.000".to_string(),
        }
    }

    fn order_return(order_ref: i64, status: OrderStatus) -> OrderReturn {
        OrderReturn {
            front_id: 1,
            session_id: 2,
            order_ref,
            exchange: Exchange::DCE,
            instrument_id: "test0001".to_string(),
            open_close: OpenClose::Open,
            direction: Direction::Long,
            hedge_flag: HedgeFlag::Speculation,
            total_volume: 10,
            traded_volume: 0,
            remained_volume: 10,
            price_type: OrderPriceType::LimitPrice,
            limit_price: 100.0,
            time_condition: TimeCondition::Gfd,
            status,
            submit_rejected: false,
            status_msg: String::new(),
            time: "2026-08-06 10:00:00.000".to_string(),
        }
    }

    fn long_index() -> InstrumentIndex {
        InstrumentIndex {
            instrument_id: "test0001".to_string(),
            direction: Direction::Long,
            hedge_flag: HedgeFlag::Speculation,
        }
    }

    /// 持仓不变量: 每笔成交后 total == today + pre 且子项非负
    fn assert_invariant(ledger: &AccountLedger) {
        for rec in ledger.holdings().values() {
            assert_eq!(rec.total_quantity, rec.today_quantity + rec.pre_quantity);
            assert!(rec.today_quantity >= 0);
            assert!(rec.pre_quantity >= 0);
        }
    }

    // ==================== 持仓更新测试 ====================

    /// 开仓成交增加今仓
    #[test]
    fn test_open_fill_adds_today() {
        let ledger = AccountLedger::new();
        ledger.apply_trade(&trade(Exchange::DCE, OpenClose::Open, Direction::Long, 5));

        let rec = &ledger.holdings()[&long_index()];
        assert_eq!(rec.total_quantity, 5);
        assert_eq!(rec.today_quantity, 5);
        assert_eq!(rec.pre_quantity, 0);
        assert_invariant(&ledger);
    }

    /// 平仓成交作用于反方向持仓桶
    #[test]
    fn test_close_fill_hits_opposite_bucket() {
        let ledger = AccountLedger::new();
        ledger.apply_trade(&trade(Exchange::SHFE, OpenClose::Open, Direction::Long, 4));
        // 卖出平今，应扣减多头桶
        ledger.apply_trade(&trade(Exchange::SHFE, OpenClose::CloseToday, Direction::Short, 3));

        let rec = &ledger.holdings()[&long_index()];
        assert_eq!(rec.total_quantity, 1);
        assert_eq!(rec.today_quantity, 1);
        assert_invariant(&ledger);
    }

    /// 大商所普通平仓: 先平今，剩余平昨
    #[test]
    fn test_generic_close_dce_today_first() {
        let ledger = AccountLedger::new();
        ledger.seed_pre_position(&PositionField {
            instrument_id: "test0001".to_string(),
            exchange: Exchange::DCE,
            direction: Direction::Long,
            hedge_flag: HedgeFlag::Speculation,
            yd_position: 3,
        });
        ledger.apply_trade(&trade(Exchange::DCE, OpenClose::Open, Direction::Long, 5));
        // today=5, pre=3; 普通平 6 → 先平今 5，再平昨 1
        ledger.apply_trade(&trade(Exchange::DCE, OpenClose::Close, Direction::Short, 6));

        let rec = &ledger.holdings()[&long_index()];
        assert_eq!(rec.today_quantity, 0);
        assert_eq!(rec.pre_quantity, 2);
        assert_eq!(rec.total_quantity, 2);
        assert_invariant(&ledger);
    }

    /// 中金所/郑商所普通平仓: 先开先平，先平昨再平今
    #[test]
    fn test_generic_close_cffex_yesterday_first() {
        let ledger = AccountLedger::new();
        ledger.seed_pre_position(&PositionField {
            instrument_id: "test0001".to_string(),
            exchange: Exchange::CFFEX,
            direction: Direction::Long,
            hedge_flag: HedgeFlag::Speculation,
            yd_position: 3,
        });
        ledger.apply_trade(&trade(Exchange::CFFEX, OpenClose::Open, Direction::Long, 5));
        // today=5, pre=3; 普通平 6 → 先平昨 3，再平今 3
        ledger.apply_trade(&trade(Exchange::CFFEX, OpenClose::Close, Direction::Short, 6));

        let rec = &ledger.holdings()[&long_index()];
        assert_eq!(rec.today_quantity, 2);
        assert_eq!(rec.pre_quantity, 0);
        assert_eq!(rec.total_quantity, 2);
        assert_invariant(&ledger);
    }

    /// 显式平昨只扣昨仓
    #[test]
    fn test_explicit_close_yesterday() {
        let ledger = AccountLedger::new();
        ledger.seed_pre_position(&PositionField {
            instrument_id: "test0001".to_string(),
            exchange: Exchange::SHFE,
            direction: Direction::Long,
            hedge_flag: HedgeFlag::Speculation,
            yd_position: 4,
        });
        ledger.apply_trade(&trade(Exchange::SHFE, OpenClose::Open, Direction::Long, 2));
        ledger.apply_trade(&trade(Exchange::SHFE, OpenClose::CloseYesterday, Direction::Short, 3));

        let rec = &ledger.holdings()[&long_index()];
        assert_eq!(rec.today_quantity, 2);
        assert_eq!(rec.pre_quantity, 1);
        assert_eq!(rec.total_quantity, 3);
        assert_invariant(&ledger);
    }

    /// 多空持仓桶互不影响
    #[test]
    fn test_long_short_buckets_independent() {
        let ledger = AccountLedger::new();
        ledger.apply_trade(&trade(Exchange::DCE, OpenClose::Open, Direction::Long, 5));
        ledger.apply_trade(&trade(Exchange::DCE, OpenClose::Open, Direction::Short, 3));

        let holdings = ledger.holdings();
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[&long_index()].total_quantity, 5);
        assert_invariant(&ledger);
    }

    /// 连续成交序列下不变量保持
    #[test]
    fn test_invariant_over_fill_sequence() {
        let ledger = AccountLedger::new();
        ledger.seed_pre_position(&PositionField {
            instrument_id: "test0001".to_string(),
            exchange: Exchange::DCE,
            direction: Direction::Long,
            hedge_flag: HedgeFlag::Speculation,
            yd_position: 10,
        });
        let seq = [
            (OpenClose::Open, 4),
            (OpenClose::Close, 6),
            (OpenClose::Open, 2),
            (OpenClose::Close, 8),
            (OpenClose::Open, 1),
        ];
        for (open_close, volume) in seq {
            let direction = if open_close == OpenClose::Open {
                Direction::Long
            } else {
                Direction::Short
            };
            ledger.apply_trade(&trade(Exchange::DCE, open_close, direction, volume));
            assert_invariant(&ledger);
        }
        let rec = &ledger.holdings()[&long_index()];
        assert_eq!(rec.total_quantity, 3);
    }

    /// 昨持仓查询多行合并
    #[test]
    fn test_seed_pre_position_merges_rows() {
        let ledger = AccountLedger::new();
        let row = PositionField {
            instrument_id: "test0001".to_string(),
            exchange: Exchange::DCE,
            direction: Direction::Long,
            hedge_flag: HedgeFlag::Speculation,
            yd_position: 3,
        };
        ledger.seed_pre_position(&row);
        ledger.seed_pre_position(&row);

        let rec = &ledger.holdings()[&long_index()];
        assert_eq!(rec.total_quantity, 6);
        assert_eq!(rec.pre_quantity, 6);
        assert_eq!(rec.today_quantity, 0);
    }

    // ==================== 委托回报测试 ====================

    /// 首次回报建档并进入可撤集合
    #[test]
    fn test_first_order_return_creates_record() {
        let ledger = AccountLedger::new();
        let outcome = ledger.apply_order_return(&order_return(7, OrderStatus::NoTradeQueueing));
        assert_eq!(outcome, OrderPushOutcome::NewRecord);

        let index = OrderIndex { front_id: 1, session_id: 2, order_ref: 7 };
        assert!(ledger.contains_order(index));
        assert_eq!(ledger.cancelable_orders(), vec![index]);
    }

    /// 后续回报原地更新，全成后移出可撤集合
    #[test]
    fn test_order_return_updates_and_filters_cancelable() {
        let ledger = AccountLedger::new();
        ledger.apply_order_return(&order_return(7, OrderStatus::NoTradeQueueing));

        let mut push = order_return(7, OrderStatus::PartTradedQueueing);
        push.traded_volume = 4;
        push.remained_volume = 6;
        assert_eq!(ledger.apply_order_return(&push), OrderPushOutcome::Updated);
        assert_eq!(ledger.cancelable_orders().len(), 1);

        let mut done = order_return(7, OrderStatus::AllTraded);
        done.traded_volume = 10;
        done.remained_volume = 0;
        ledger.apply_order_return(&done);
        assert!(ledger.cancelable_orders().is_empty());

        let index = OrderIndex { front_id: 1, session_id: 2, order_ref: 7 };
        let rec = ledger.order_record(index).unwrap();
        assert_eq!(rec.status, OrderStatus::AllTraded);
        assert_eq!(rec.traded_volume, 10);
        assert_eq!(rec.remained_volume, 0);
    }

    /// 交易所拒单置 RejectedByExchange 并移出可撤集合
    #[test]
    fn test_exchange_reject_marks_record() {
        let ledger = AccountLedger::new();
        ledger.apply_order_return(&order_return(9, OrderStatus::NoTradeQueueing));

        let mut reject = order_return(9, OrderStatus::NoTradeQueueing);
        reject.submit_rejected = true;
        reject.status_msg = "price out of band".to_string();
        assert_eq!(
            ledger.apply_order_return(&reject),
            OrderPushOutcome::ExchangeRejected
        );

        let index = OrderIndex { front_id: 1, session_id: 2, order_ref: 9 };
        assert_eq!(ledger.order_status(index), Some(OrderStatus::RejectedByExchange));
        assert!(ledger.cancelable_orders().is_empty());
    }

    /// 柜台拒单编号可查询
    #[test]
    fn test_server_reject_bookkeeping() {
        let ledger = AccountLedger::new();
        assert!(!ledger.is_server_rejected(11));
        ledger.note_server_reject(11);
        assert!(ledger.is_server_rejected(11));
    }

    // ==================== 衍生查询测试 ====================

    /// 净持仓按方向折算
    #[test]
    fn test_net_holdings() {
        let ledger = AccountLedger::new();
        ledger.apply_trade(&trade(Exchange::DCE, OpenClose::Open, Direction::Long, 5));
        ledger.apply_trade(&trade(Exchange::DCE, OpenClose::Open, Direction::Short, 2));

        let net = ledger.net_holdings();
        assert_eq!(net["test0001"], 3);
    }
}
