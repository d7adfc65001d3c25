//! 充值地址分配
//!
//! 每个 (用户, 链) 恰好一个地址。分配流程：
//! 计数器原子自增 → 派生 → 带双唯一约束插入。
//! (user, blockchain) 冲突说明同用户并发请求已有人赢，回退计数器并读回已有记录；
//! (blockchain, index) 冲突说明索引被占用，从自增重试（最多3次）。

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    domain::{chain::Blockchain, derivation::HdWallet, error::DepositError},
    infrastructure::db::PgPool,
    metrics,
    repository::{counters, deposit_addresses, deposit_addresses::DepositAddress},
};

const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

/// 分配结果：地址记录 + 本次是否新建
#[derive(Debug)]
pub struct AllocatedAddress {
    pub record: DepositAddress,
    pub created: bool,
}

pub struct AddressService {
    pool: PgPool,
    wallet: Arc<HdWallet>,
}

impl AddressService {
    pub fn new(pool: PgPool, wallet: Arc<HdWallet>) -> Self {
        Self { pool, wallet }
    }

    fn counter_name(blockchain: Blockchain) -> String {
        format!("deposit_address:{}", blockchain)
    }

    /// 读取已分配地址，不触发分配
    pub async fn get(
        &self,
        user_id: Uuid,
        blockchain: Blockchain,
    ) -> Result<Option<DepositAddress>, DepositError> {
        let existing =
            deposit_addresses::get_by_user_and_chain(&self.pool, user_id, blockchain.as_str())
                .await?;
        Ok(existing)
    }

    /// 取或建：幂等，任意并发调用最终返回同一条记录
    pub async fn get_or_create(
        &self,
        user_id: Uuid,
        blockchain: Blockchain,
    ) -> Result<AllocatedAddress, DepositError> {
        if let Some(existing) = self.get(user_id, blockchain).await? {
            return Ok(AllocatedAddress {
                record: existing,
                created: false,
            });
        }

        let counter_name = Self::counter_name(blockchain);

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let counter_value = counters::increment(&self.pool, &counter_name).await?;
            let index = (counter_value - 1) as u32;
            let address = self.wallet.address(blockchain, index)?;

            match deposit_addresses::create(
                &self.pool,
                user_id,
                blockchain.as_str(),
                index as i64,
                &address,
            )
            .await
            {
                Ok(record) => {
                    metrics::inc_address_allocated();
                    info!(
                        user_id = %user_id,
                        blockchain = %blockchain,
                        derivation_index = index,
                        "deposit address allocated"
                    );
                    return Ok(AllocatedAddress {
                        record,
                        created: true,
                    });
                }
                Err(e) => match unique_constraint_name(&e) {
                    Some(constraint) if constraint == "deposit_addresses_user_chain_key" => {
                        // 同用户并发请求已赢得插入，回退计数器（仅当本次分配仍是最新）
                        let rolled_back =
                            counters::decrement_if_latest(&self.pool, &counter_name, counter_value)
                                .await?;
                        if !rolled_back {
                            warn!(
                                blockchain = %blockchain,
                                derivation_index = index,
                                "counter moved on, leaving allocation gap"
                            );
                        }
                        let existing = deposit_addresses::get_by_user_and_chain(
                            &self.pool,
                            user_id,
                            blockchain.as_str(),
                        )
                        .await?
                        .ok_or_else(|| {
                            DepositError::Verification(
                                "duplicate address insert but no existing record".into(),
                            )
                        })?;
                        return Ok(AllocatedAddress {
                            record: existing,
                            created: false,
                        });
                    }
                    Some(constraint) if constraint == "deposit_addresses_chain_index_key" => {
                        // 索引被占用（计数器落后于表），从自增重试
                        warn!(
                            blockchain = %blockchain,
                            derivation_index = index,
                            attempt,
                            "derivation index already taken, retrying allocation"
                        );
                        continue;
                    }
                    _ => return Err(e.into()),
                },
            }
        }

        Err(DepositError::Verification(format!(
            "address allocation for {} failed after {} attempts",
            blockchain, MAX_ALLOCATION_ATTEMPTS
        )))
    }
}

/// 23505 唯一约束冲突 → 约束名
fn unique_constraint_name(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return db_err.constraint().map(String::from);
        }
    }
    None
}
