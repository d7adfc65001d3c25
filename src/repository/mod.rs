//! 数据访问层
//!
//! 每个模块对应一张表，导出自由函数，调用方传入连接池或事务。

pub mod balances;
pub mod counters;
pub mod deposit_addresses;
pub mod payments;
pub mod sweeps;
pub mod withdrawals;
