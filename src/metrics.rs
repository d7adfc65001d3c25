use std::{
    collections::HashMap,
    sync::{Mutex, OnceLock},
};

static METRICS: OnceLock<Mutex<MetricsState>> = OnceLock::new();

struct MetricsState {
    total: u64,
    errors: u64,
    per_endpoint: HashMap<&'static str, u64>,
    per_endpoint_err: HashMap<&'static str, u64>,
    // 链RPC成功/失败与时延统计（毫秒）
    rpc_ok: u64,
    rpc_err: u64,
    rpc_latency_sum_ms: u128,
    // 简易直方图分桶（毫秒）：<50, <100, <250, <500, <1000, >=1000
    rpc_hist_buckets: [u64; 6],
    // 充值/归集业务指标
    deposits_credited: u64,
    deposits_rejected: u64,
    deposits_duplicate: u64,
    sweeps_confirmed: u64,
    sweeps_failed: u64,
    addresses_allocated: u64,
}

fn state() -> &'static Mutex<MetricsState> {
    METRICS.get_or_init(|| {
        Mutex::new(MetricsState {
            total: 0,
            errors: 0,
            per_endpoint: HashMap::new(),
            per_endpoint_err: HashMap::new(),
            rpc_ok: 0,
            rpc_err: 0,
            rpc_latency_sum_ms: 0,
            rpc_hist_buckets: [0; 6],
            deposits_credited: 0,
            deposits_rejected: 0,
            deposits_duplicate: 0,
            sweeps_confirmed: 0,
            sweeps_failed: 0,
            addresses_allocated: 0,
        })
    })
}

fn lock() -> std::sync::MutexGuard<'static, MetricsState> {
    match state().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

pub fn count_ok(endpoint: &'static str) {
    let mut s = lock();
    s.total += 1;
    *s.per_endpoint.entry(endpoint).or_insert(0) += 1;
}

pub fn count_err(endpoint: &'static str) {
    let mut s = lock();
    s.total += 1;
    s.errors += 1;
    *s.per_endpoint.entry(endpoint).or_insert(0) += 1;
    *s.per_endpoint_err.entry(endpoint).or_insert(0) += 1;
}

pub fn observe_rpc_latency_ms(latency_ms: u128, ok: bool) {
    let mut s = lock();
    if ok {
        s.rpc_ok += 1;
    } else {
        s.rpc_err += 1;
    }
    s.rpc_latency_sum_ms += latency_ms;
    let b = if latency_ms < 50 {
        0
    } else if latency_ms < 100 {
        1
    } else if latency_ms < 250 {
        2
    } else if latency_ms < 500 {
        3
    } else if latency_ms < 1000 {
        4
    } else {
        5
    };
    s.rpc_hist_buckets[b] += 1;
}

pub fn inc_deposit_credited() {
    lock().deposits_credited += 1;
}

pub fn inc_deposit_rejected() {
    lock().deposits_rejected += 1;
}

pub fn inc_deposit_duplicate() {
    lock().deposits_duplicate += 1;
}

pub fn inc_sweep_confirmed() {
    lock().sweeps_confirmed += 1;
}

pub fn inc_sweep_failed() {
    lock().sweeps_failed += 1;
}

pub fn inc_address_allocated() {
    lock().addresses_allocated += 1;
}

pub fn render_prometheus() -> String {
    let s = lock();
    let mut out = String::new();
    out.push_str("# HELP chipcore_requests_total Total requests\n");
    out.push_str("# TYPE chipcore_requests_total counter\n");
    out.push_str(&format!("chipcore_requests_total {}\n", s.total));

    out.push_str("# HELP chipcore_errors_total Total error responses\n");
    out.push_str("# TYPE chipcore_errors_total counter\n");
    out.push_str(&format!("chipcore_errors_total {}\n", s.errors));

    out.push_str("# HELP chipcore_endpoint_requests_total Requests per endpoint\n");
    out.push_str("# TYPE chipcore_endpoint_requests_total counter\n");
    for (k, v) in s.per_endpoint.iter() {
        out.push_str(&format!(
            "chipcore_endpoint_requests_total{{endpoint=\"{}\"}} {}\n",
            k, v
        ));
    }

    out.push_str("# HELP chipcore_endpoint_errors_total Errors per endpoint\n");
    out.push_str("# TYPE chipcore_endpoint_errors_total counter\n");
    for (k, v) in s.per_endpoint_err.iter() {
        out.push_str(&format!(
            "chipcore_endpoint_errors_total{{endpoint=\"{}\"}} {}\n",
            k, v
        ));
    }

    // 链RPC统计
    out.push_str("# HELP chipcore_rpc_requests_total Chain RPC requests\n");
    out.push_str("# TYPE chipcore_rpc_requests_total counter\n");
    out.push_str(&format!(
        "chipcore_rpc_requests_total{{result=\"ok\"}} {}\n",
        s.rpc_ok
    ));
    out.push_str(&format!(
        "chipcore_rpc_requests_total{{result=\"err\"}} {}\n",
        s.rpc_err
    ));

    out.push_str("# HELP chipcore_rpc_latency_ms_sum Sum of chain RPC latency in ms\n");
    out.push_str("# TYPE chipcore_rpc_latency_ms_sum counter\n");
    out.push_str(&format!(
        "chipcore_rpc_latency_ms_sum {}\n",
        s.rpc_latency_sum_ms
    ));

    out.push_str("# HELP chipcore_rpc_latency_ms_bucket Chain RPC latency histogram buckets\n");
    out.push_str("# TYPE chipcore_rpc_latency_ms_bucket histogram\n");
    let bounds = [50, 100, 250, 500, 1000];
    for (i, bound) in bounds.iter().enumerate() {
        out.push_str(&format!(
            "chipcore_rpc_latency_ms_bucket{{le=\"{}\"}} {}\n",
            bound, s.rpc_hist_buckets[i]
        ));
    }
    // +Inf 桶
    out.push_str(&format!(
        "chipcore_rpc_latency_ms_bucket{{le=\"+Inf\"}} {}\n",
        s.rpc_hist_buckets.iter().sum::<u64>()
    ));

    // 充值指标
    out.push_str("# HELP chipcore_deposits_credited_total Deposits credited to the ledger\n");
    out.push_str("# TYPE chipcore_deposits_credited_total counter\n");
    out.push_str(&format!(
        "chipcore_deposits_credited_total {}\n",
        s.deposits_credited
    ));

    out.push_str("# HELP chipcore_deposits_rejected_total Deposits rejected by verification\n");
    out.push_str("# TYPE chipcore_deposits_rejected_total counter\n");
    out.push_str(&format!(
        "chipcore_deposits_rejected_total {}\n",
        s.deposits_rejected
    ));

    out.push_str("# HELP chipcore_deposits_duplicate_total Deposit verifications resolved as already-processed\n");
    out.push_str("# TYPE chipcore_deposits_duplicate_total counter\n");
    out.push_str(&format!(
        "chipcore_deposits_duplicate_total {}\n",
        s.deposits_duplicate
    ));

    // 归集指标
    out.push_str("# HELP chipcore_sweeps_confirmed_total Confirmed treasury sweeps\n");
    out.push_str("# TYPE chipcore_sweeps_confirmed_total counter\n");
    out.push_str(&format!(
        "chipcore_sweeps_confirmed_total {}\n",
        s.sweeps_confirmed
    ));

    out.push_str("# HELP chipcore_sweeps_failed_total Failed treasury sweeps\n");
    out.push_str("# TYPE chipcore_sweeps_failed_total counter\n");
    out.push_str(&format!("chipcore_sweeps_failed_total {}\n", s.sweeps_failed));

    out.push_str("# HELP chipcore_addresses_allocated_total Deposit addresses allocated\n");
    out.push_str("# TYPE chipcore_addresses_allocated_total counter\n");
    out.push_str(&format!(
        "chipcore_addresses_allocated_total {}\n",
        s.addresses_allocated
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        count_ok("deposit_solana");
        inc_deposit_credited();
        observe_rpc_latency_ms(42, true);
        let rendered = render_prometheus();
        assert!(rendered.contains("chipcore_requests_total"));
        assert!(rendered.contains("chipcore_deposits_credited_total"));
        assert!(rendered.contains("chipcore_rpc_latency_ms_bucket{le=\"50\"}"));
    }
}
