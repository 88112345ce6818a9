//! End-to-end shard behavior through the public store surface.

use std::sync::{Arc, Mutex};

use fmps_core::{AlgoV, AlgoW, Progress, ServerConfig, BIAS_KEY, PUSH_FEA_CNT};
use fmps_store::{SgdStore, StoreError, StoreStats, UpdateHandle};

const KEY: u64 = 42;

fn base_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.linear.alpha = 0.1;
    config.linear.beta = 1.0;
    config.linear.lambda_l1 = 0.1;
    config.linear.lambda_l2 = 0.0;
    config.linear.algo_w = AlgoW::FtrlDmlc;
    config.embedding.dim = 2;
    config.embedding.threshold = 2;
    config.embedding.alpha = 0.1;
    config.embedding.beta = 1.0;
    config
}

fn store_with(config: ServerConfig) -> (SgdStore, Arc<StoreStats>) {
    let stats = Arc::new(StoreStats::new());
    let handle = UpdateHandle::with_seed(config, Arc::clone(&stats), 7).unwrap();
    (SgdStore::new(handle), stats)
}

fn push_count(store: &mut SgdStore, key: u64, count: f32) {
    store.start(true, PUSH_FEA_CNT);
    store.push(key, &[count]).unwrap();
    store.finish();
}

fn push_grad(store: &mut SgdStore, key: u64, grad: &[f32]) {
    store.start(true, 0);
    store.push(key, grad).unwrap();
    store.finish();
}

#[test]
fn test_count_push_below_threshold_stays_scalar() {
    let (mut store, stats) = store_with(base_config());
    push_count(&mut store, KEY, 1.0);

    let entry = store.entry(KEY).unwrap();
    assert_eq!(entry.fea_cnt(), 1);
    assert_eq!(entry.size(), 1);
    assert_eq!(stats.snapshot(), Progress::default());
}

#[test]
fn test_threshold_reached_allocates_embedding() {
    let (mut store, stats) = store_with(base_config());
    push_count(&mut store, KEY, 1.0);
    push_count(&mut store, KEY, 1.0);

    let entry = store.entry(KEY).unwrap();
    assert_eq!(entry.fea_cnt(), 2);
    assert_eq!(entry.size(), 3);
    assert!(entry.active_embedding());
    assert_eq!(stats.snapshot().new_v, 2);

    // Fresh slots come from [v_min, v_max].
    let config = store.handle().config().embedding.clone();
    for &w in &entry.weights()[1..] {
        assert!(w >= config.v_min() && w <= config.v_max());
    }
    // Their accumulators start at zero.
    assert_eq!(&entry.accumulators()[2..], &[0.0, 0.0]);
}

#[test]
fn test_first_gradient_push_ftrl_dmlc() {
    let (mut store, stats) = store_with(base_config());
    push_grad(&mut store, KEY, &[0.5]);

    let entry = store.entry(KEY).unwrap();
    assert_eq!(entry.minibatch_occurrence(), 1);
    assert!((entry.w0() - (-0.026_666_7)).abs() < 1e-5);
    assert_eq!(stats.snapshot().new_w, 1);
}

#[test]
fn test_embedding_gradient_adagrad_identity() {
    let mut config = base_config();
    config.embedding.algo_v = AlgoV::AdagradV;
    let (mut store, _stats) = store_with(config);

    push_count(&mut store, KEY, 2.0);
    assert_eq!(store.entry(KEY).unwrap().size(), 3);

    // Pin the embedding to known values.
    {
        let entry = store.entry_mut(KEY).unwrap();
        let mut v = entry.v_state().unwrap();
        v.w.copy_from_slice(&[0.2, -0.2]);
        v.cg.copy_from_slice(&[0.0, 0.0]);
    }

    push_grad(&mut store, KEY, &[0.0, 0.1, -0.1]);

    let entry = store.entry(KEY).unwrap();
    // w_i <- prox(-g_i + w_i/eta_i, eta_i, l1, l2) with eta = 0.1/1.1.
    assert!((entry.weights()[1] - 0.190_909).abs() < 1e-5);
    assert!((entry.weights()[2] - -0.190_909).abs() < 1e-5);
    // A zero linear gradient leaves w[0] at zero.
    assert_eq!(entry.w0(), 0.0);
}

#[test]
fn test_bias_key_never_grows_embedding() {
    let (mut store, stats) = store_with(base_config());
    for _ in 0..10 {
        push_count(&mut store, BIAS_KEY, 1.0);
    }
    push_grad(&mut store, BIAS_KEY, &[0.5]);

    let entry = store.entry(BIAS_KEY).unwrap();
    assert_eq!(entry.size(), 1);
    assert_eq!(stats.snapshot().new_v, 0);
}

#[test]
fn test_bias_key_embedding_opt_in() {
    let mut config = base_config();
    config.linear.learn_bias_embedding = true;
    let (mut store, _stats) = store_with(config);
    push_count(&mut store, BIAS_KEY, 2.0);

    assert_eq!(store.entry(BIAS_KEY).unwrap().size(), 3);
}

#[test]
fn test_group_prox_zeroes_embedding_and_reports() {
    let mut config = base_config();
    config.embedding.algo_v = AlgoV::Ftrl;
    config.embedding.lambda_l1_2 = 10.0;
    let (mut store, stats) = store_with(config);

    push_count(&mut store, KEY, 2.0);
    assert_eq!(stats.snapshot().new_v, 2);
    assert!(store.entry(KEY).unwrap().active_embedding());

    // A weak gradient leaves the dual norm far below l1_2 * sqrt(n).
    push_grad(&mut store, KEY, &[0.5, 0.01, 0.01]);

    let entry = store.entry(KEY).unwrap();
    assert_eq!(&entry.weights()[1..], &[0.0, 0.0]);
    assert!(!entry.active_embedding());
    assert_eq!(stats.snapshot().new_v, 0);
}

#[test]
fn test_group_prox_reactivation_counts_again() {
    let mut config = base_config();
    config.embedding.algo_v = AlgoV::Ftrl;
    config.embedding.lambda_l1_2 = 0.05;
    let (mut store, stats) = store_with(config);
    push_count(&mut store, KEY, 2.0);

    // Kill the group with a tiny gradient, then revive it with a strong
    // one; the slot count must go 2 -> 0 -> 2.
    {
        let entry = store.entry_mut(KEY).unwrap();
        let mut v = entry.v_state().unwrap();
        v.w.copy_from_slice(&[0.0, 0.0]);
    }
    push_grad(&mut store, KEY, &[0.5, 1e-4, 1e-4]);
    assert!(!store.entry(KEY).unwrap().active_embedding());
    assert_eq!(stats.snapshot().new_v, 0);

    push_grad(&mut store, KEY, &[0.5, 3.0, -3.0]);
    assert!(store.entry(KEY).unwrap().active_embedding());
    assert_eq!(stats.snapshot().new_v, 2);
}

#[test]
fn test_pull_short_form_for_scalar_entry() {
    let (mut store, _stats) = store_with(base_config());
    push_grad(&mut store, KEY, &[0.5]);

    let mut send = vec![9.0; 8];
    store.start(false, 0);
    store.pull(KEY, &mut send);
    store.finish();

    assert_eq!(send.len(), 1);
    assert!((send[0] - (-0.026_666_7)).abs() < 1e-5);
}

#[test]
fn test_pull_full_form_for_embedded_entry() {
    let (mut store, _stats) = store_with(base_config());
    push_count(&mut store, KEY, 2.0);
    push_grad(&mut store, KEY, &[0.5, 0.1, -0.1]);

    let mut send = Vec::new();
    store.start(false, 0);
    store.pull(KEY, &mut send);
    store.finish();

    assert_eq!(send.len(), 3);
    assert_eq!(send, store.entry(KEY).unwrap().weights());
}

#[test]
fn test_pull_l1_shrk_suppresses_dead_embedding() {
    let mut config = base_config();
    config.linear.l1_shrk = true;
    let (mut store, _stats) = store_with(config);

    // Make w[0] non-zero first so the resize is allowed under l1_shrk.
    push_grad(&mut store, KEY, &[0.5]);
    push_count(&mut store, KEY, 2.0);
    assert_eq!(store.entry(KEY).unwrap().size(), 3);

    // Drag the dual back inside the dead zone: w[0] returns to zero.
    let z = 0.5;
    push_grad(&mut store, KEY, &[-(z - 0.05), 0.0, 0.0]);
    assert_eq!(store.entry(KEY).unwrap().w0(), 0.0);

    let mut send = Vec::new();
    store.start(false, 0);
    store.pull(KEY, &mut send);
    store.finish();
    assert_eq!(send, vec![0.0]);
}

#[test]
fn test_l1_shrk_denies_embedding_to_dead_weight() {
    let mut config = base_config();
    config.linear.l1_shrk = true;
    let (mut store, stats) = store_with(config);

    push_count(&mut store, KEY, 5.0);
    let entry = store.entry(KEY).unwrap();
    assert_eq!(entry.size(), 1);
    assert_eq!(stats.snapshot().new_v, 0);
}

#[test]
fn test_zero_crossing_bookkeeping() {
    let (mut store, stats) = store_with(base_config());

    push_grad(&mut store, KEY, &[0.5]);
    assert_eq!(stats.snapshot().new_w, 1);

    // Back inside the dead zone: the signed count returns to zero.
    let z = 0.5;
    push_grad(&mut store, KEY, &[-(z - 0.05)]);
    assert_eq!(store.entry(KEY).unwrap().w0(), 0.0);
    assert_eq!(stats.snapshot().new_w, 0);
}

#[test]
fn test_resize_saturates_at_full_dimension() {
    let (mut store, stats) = store_with(base_config());
    push_count(&mut store, KEY, 2.0);
    assert_eq!(store.entry(KEY).unwrap().size(), 3);
    let v_after = stats.snapshot().new_v;

    push_count(&mut store, KEY, 10.0);
    assert_eq!(store.entry(KEY).unwrap().size(), 3);
    assert_eq!(stats.snapshot().new_v, v_after);
}

#[test]
fn test_threshold_step_grows_with_count() {
    let mut config = base_config();
    config.embedding.dim = 4;
    config.embedding.threshold = 2;
    config.embedding.threshold_step = 2;
    let (mut store, stats) = store_with(config);

    // fea_cnt = 2: grow by the step, capped by fea_cnt + 1.
    push_count(&mut store, KEY, 2.0);
    assert_eq!(store.entry(KEY).unwrap().size(), 3);
    assert_eq!(stats.snapshot().new_v, 2);

    // fea_cnt = 4: next increment reaches the full dimension.
    push_count(&mut store, KEY, 2.0);
    assert_eq!(store.entry(KEY).unwrap().size(), 5);
    assert_eq!(stats.snapshot().new_v, 4);
}

#[test]
fn test_gradient_longer_than_entry_is_fatal() {
    let (mut store, _stats) = store_with(base_config());
    store.start(true, 0);
    let err = store.push(KEY, &[0.5, 0.1, 0.2]).unwrap_err();
    assert!(matches!(err, StoreError::GradientTooLong { key: KEY, .. }));
}

#[test]
fn test_empty_payload_is_fatal() {
    let (mut store, _stats) = store_with(base_config());
    store.start(true, 0);
    let err = store.push(KEY, &[]).unwrap_err();
    assert!(matches!(err, StoreError::EmptyPayload { key: KEY }));
}

#[test]
fn test_entry_arrays_sized_consistently_after_every_push() {
    let mut config = base_config();
    config.embedding.dim = 3;
    config.embedding.algo_v = AlgoV::FtrlAdam;
    let (mut store, _stats) = store_with(config);

    push_count(&mut store, KEY, 2.0);
    push_grad(&mut store, KEY, &[0.5, 0.1, -0.1, 0.2]);

    let entry = store.entry_mut(KEY).unwrap();
    assert_eq!(entry.size(), 4);
    assert_eq!(entry.weights().len(), 4);
    assert_eq!(entry.accumulators().len(), 5);
    let mut v = entry.v_state().unwrap();
    assert_eq!(v.dual.as_mut().unwrap().len(), 3);
    assert_eq!(v.momentum.as_mut().unwrap().len(), 3);
}

#[test]
fn test_reporter_emits_every_num_servers_finishes() {
    let mut config = base_config();
    config.num_servers = 2;
    let (mut store, stats) = store_with(config);

    let reports: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    store
        .handle_mut()
        .set_reporter(move |prog| sink.lock().unwrap().push(prog));

    push_grad(&mut store, KEY, &[0.5]);
    assert!(reports.lock().unwrap().is_empty());

    push_grad(&mut store, 43, &[0.5]);
    let emitted = reports.lock().unwrap().clone();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].new_w, 2);
    // Counters reset on emission.
    assert_eq!(stats.snapshot(), Progress::default());
}

#[test]
fn test_pull_of_unknown_key_returns_zero_weight() {
    let (mut store, _stats) = store_with(base_config());
    let mut send = Vec::new();
    store.start(false, 0);
    store.pull(999, &mut send);
    store.finish();
    assert_eq!(send, vec![0.0]);
    assert_eq!(store.len(), 1);
}
