//! 充值/归集领域错误分类
//!
//! 验证类失败（Validation/NotFound/Verification/BelowMinimum）不改变任何状态；
//! 唯一约束冲突在服务内部消解为成功，不会以错误形式出现在这里。

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DepositError {
    /// 配置错误（助记词/金库地址/合约地址缺失），不可重试
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 请求参数错误，客户端可修正
    #[error("validation failed: {0}")]
    Validation(String),

    /// 链上或存储中找不到交易/地址/记录
    #[error("not found: {0}")]
    NotFound(String),

    /// 链上执行失败或收款人/合约/金额不匹配
    #[error("verification failed: {0}")]
    Verification(String),

    /// 折算后金额低于最低入账门槛
    #[error("amount below minimum deposit of {minimum}")]
    BelowMinimum { minimum: Decimal },

    /// 余额不足（提现扣减 / 归集超出可归集上限）
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// 源地址原生资产不足以支付手续费/能量
    #[error("insufficient fee balance: {0}")]
    InsufficientFee(String),

    /// 价格源不可用
    #[error("price unavailable: {0}")]
    PriceUnavailable(String),

    /// RPC超时/不可达等外部依赖错误，客户端可重试
    #[error("external dependency error: {0}")]
    External(String),

    /// 广播后的归集失败（已落审计记录）
    #[error("sweep failed: {0}")]
    Sweep(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DepositError {
    /// 状态未变更的纯验证类失败
    pub fn is_validation_like(&self) -> bool {
        matches!(
            self,
            DepositError::Validation(_)
                | DepositError::NotFound(_)
                | DepositError::Verification(_)
                | DepositError::BelowMinimum { .. }
        )
    }
}
