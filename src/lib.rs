//! ChipCore - 链上充值与归集网关
//!
//! 从单个主助记词派生每用户充值地址（Solana ed25519 / TRON secp256k1），
//! 验证链上交易后以"每个 txn_id 至多入账一次"的保证为内部账本入账，
//! 并支持管理员将充值地址上的资金归集到金库地址。

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod repository;
pub mod service;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{AppError, AppErrorCode};
