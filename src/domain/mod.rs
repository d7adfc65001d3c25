//! 领域模型
//! 链/币种注册表与HD派生，不依赖任何外部I/O

pub mod chain;
pub mod currency;
pub mod derivation;
pub mod error;

pub use chain::Blockchain;
pub use currency::{Currency, CurrencyKind, CurrencyRegistry};
pub use derivation::HdWallet;
pub use error::DepositError;
