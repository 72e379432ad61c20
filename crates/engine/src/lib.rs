pub mod binance;
pub mod executor;
pub mod lock;
pub mod market_data;
pub mod worker;

#[cfg(test)]
mod testing;

pub use binance::BinanceClient;
pub use executor::OrderExecutor;
pub use lock::{ExecutionLock, LockGuard};
pub use market_data::MarketDataGateway;
pub use worker::{StopToken, Worker, WorkerHandle, WorkerSettings};
