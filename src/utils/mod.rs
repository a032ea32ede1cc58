//! 工具模块

pub mod config;

use chrono::Local;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::{Direction, Order, OrderPriceType, Ticker, Volume};

/// 当前本地时间字符串 (YYYY-MM-DD hh:mm:ss.mmm)
pub fn now_string() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// 从合约代码提取产品代码：取前导字母部分并转大写
///
/// 手续费率应答可能按产品返回，如 `cu2512` 的费率记录在 `CU` 下。
pub fn product_id(ticker: &str) -> String {
    ticker
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

/// 生成随机交易订单，用于通道联通性测试
pub fn generate_random_orders(
    account_name: &str,
    broker_name: &str,
    tickers: &[Ticker],
    n: usize,
) -> Vec<Order> {
    let mut rng = rand::thread_rng();
    (0..n)
        .filter_map(|_| {
            let ticker = tickers.choose(&mut rng)?;
            let direction = if rng.gen_bool(0.5) {
                Direction::Long
            } else {
                Direction::Short
            };
            let volume: Volume = rng.gen_range(1..=5);
            let mut order = Order::new(account_name, broker_name, ticker.clone(), direction, volume);
            order.price_type = OrderPriceType::LastPrice;
            Some(order)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试产品代码提取
    #[test]
    fn test_product_id() {
        assert_eq!(product_id("cu2512"), "CU");
        assert_eq!(product_id("IF2601"), "IF");
        assert_eq!(product_id("SR601C5600"), "SR");
        assert_eq!(product_id("2512"), "");
    }

    /// 测试随机订单生成数量与参数
    #[test]
    fn test_generate_random_orders() {
        let tickers = vec!["cu2512".to_string(), "IF2601".to_string()];
        let orders = generate_random_orders("acct", "broker", &tickers, 10);
        assert_eq!(orders.len(), 10);
        for order in &orders {
            assert!(order.volume >= 1 && order.volume <= 5);
            assert!(tickers.contains(&order.instrument_id));
            assert_eq!(order.account_name, "acct");
        }
    }

    /// 空合约池时不生成订单
    #[test]
    fn test_generate_random_orders_empty_pool() {
        let orders = generate_random_orders("acct", "broker", &[], 5);
        assert!(orders.is_empty());
    }
}
