//! 业务服务层

pub mod address_service;
pub mod deposit_service;
pub mod ledger_service;
pub mod price_service;
pub mod solana_rpc;
pub mod sweep_service;
pub mod tron_rpc;
