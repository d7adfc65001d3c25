//! 基础设施模块

pub mod db;
pub mod jwt;
pub mod logging;
pub mod secret_sanitize;
pub mod ttl_cache;
