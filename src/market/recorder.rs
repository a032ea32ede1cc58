//! 行情数据记录
//!
//! 每笔归一化行情经 [`DataRecorder::write`] 分发给注册的记录器。
//! [`QueuedDataRecorder`] 提供通用的队列化外壳：推送线程只入队，
//! 独立工作线程调用落库实现，短时间的大量写入不会阻塞行情线程。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;

use crate::core::MarketDepth;

/// 行情记录器：行情源对所有落库目标的统一出口
pub trait DataRecorder: Send + Sync {
    /// 接收一笔归一化行情
    fn write(&self, depth: &MarketDepth);
}

/// 落库实现，由工作线程串行调用
pub trait DepthWriter: Send + 'static {
    /// 写入一笔行情
    fn write_db(&mut self, depth: &MarketDepth);
}

/// 带写入队列的行情记录器
pub struct QueuedDataRecorder {
    tx: Option<Sender<MarketDepth>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedDataRecorder {
    /// 创建记录器并启动落库工作线程
    pub fn new<W: DepthWriter>(mut writer: W) -> Self {
        let (tx, rx) = unbounded::<MarketDepth>();
        let worker = std::thread::spawn(move || {
            while let Ok(depth) = rx.recv() {
                writer.write_db(&depth);
            }
        });
        Self {
            tx: Some(tx),
            worker: Mutex::new(Some(worker)),
        }
    }
}

impl DataRecorder for QueuedDataRecorder {
    fn write(&self, depth: &MarketDepth) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(depth.clone());
        }
    }
}

impl Drop for QueuedDataRecorder {
    /// 关闭队列并等待工作线程写完余量
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.lock().take() {
            if let Err(e) = worker.join() {
                log::error!("Data recorder worker panicked: {:?}", e);
            }
        }
    }
}

/// CSV 文件落库
///
/// 行格式: 更新时间, 合约, 最新价, 成交量, 成交额, 买一价, 买一量,
/// 卖一价, 卖一量, 持仓量
pub struct CsvDepthWriter {
    file_path: PathBuf,
}

impl CsvDepthWriter {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl DepthWriter for CsvDepthWriter {
    fn write_db(&mut self, depth: &MarketDepth) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .and_then(|mut file| {
                writeln!(
                    file,
                    "{},{},{},{},{},{},{},{},{},{}",
                    depth.update_time,
                    depth.instrument_id,
                    depth.ohlclvt.last,
                    depth.ohlclvt.volume,
                    depth.ohlclvt.turnover,
                    depth.bid[0].price,
                    depth.bid[0].volume,
                    depth.ask[0].price,
                    depth.ask[0].volume,
                    depth.open_interest
                )
            });
        if let Err(e) = result {
            log::error!(
                "Failed to write market depth to {}: {}",
                self.file_path.display(),
                e
            );
        }
    }
}
