//! DST: SimStorage Against RelationalStorage
//!
//! Drives both backends with the same seeded operation stream and checks
//! that every read agrees. SimStorage is only useful as a stand-in if it
//! answers queries exactly like the SQL engine.

mod common;

use std::sync::Arc;

use common::{account, Account};
use relstore::config::StoreConfig;
use relstore::context::Context;
use relstore::decorator::{Instrumentation, MeasurementLog, Outcome};
use relstore::dst::{DeterministicRng, FaultConfig, FaultInjectorBuilder, FaultType, SimConfig};
use relstore::storage::{
    asc, desc, eq, gt, lte, OrderBy, Predicate, Query, RelationalStorage, SimStorage, Storage,
    StorageError, StorageExt,
};

const OWNERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

fn random_account(rng: &mut DeterministicRng) -> Account {
    account(
        rng.next_int(1, 40),
        *rng.pick(&OWNERS),
        rng.next_int(0, 1_000),
    )
}

fn random_predicate(rng: &mut DeterministicRng) -> Box<dyn Predicate> {
    match rng.next_index(3) {
        0 => Box::new(eq("owner", *rng.pick(&OWNERS))),
        1 => Box::new(gt("balance", rng.next_int(0, 1_000))),
        _ => Box::new(lte("id", rng.next_int(1, 40))),
    }
}

/// Orders always end on the key so both backends agree on ties.
fn random_order(rng: &mut DeterministicRng) -> OrderBy {
    match rng.next_index(3) {
        0 => asc("id"),
        1 => desc("balance").then_asc("id"),
        _ => asc("owner").then_desc("id"),
    }
}

async fn run_parity(seed: u64) {
    let mut rng = DeterministicRng::new(seed);
    let ctx = Context::new().with_attribute("seed", seed.to_string());

    let config = StoreConfig::sqlite_memory();
    let pool = config.connect().await.unwrap();
    let sql = RelationalStorage::<Account>::new(pool, &config).await.unwrap();
    let sim = SimStorage::<Account>::new(SimConfig::with_seed(seed)).unwrap();

    for step in 0..200 {
        match rng.next_index(10) {
            0..=4 => {
                let a = random_account(&mut rng);
                assert_eq!(
                    sql.put(&ctx, &a).await.unwrap(),
                    sim.put(&ctx, &a).await.unwrap(),
                    "seed {seed} step {step}: put"
                );
            }
            5 => {
                let id = rng.next_int(1, 40);
                assert_eq!(
                    sql.find(&ctx, &id).await.unwrap(),
                    sim.find(&ctx, &id).await.unwrap(),
                    "seed {seed} step {step}: find {id}"
                );
            }
            6 => {
                let a = random_account(&mut rng);
                assert_eq!(
                    sql.remove(&ctx, &a).await.unwrap().map(|r| r.id),
                    sim.remove(&ctx, &a).await.unwrap().map(|r| r.id),
                    "seed {seed} step {step}: remove"
                );
            }
            7 => {
                let predicate = random_predicate(&mut rng);
                let order = random_order(&mut rng);
                let query = Query::all()
                    .with_predicate(predicate.as_ref())
                    .with_order(&order)
                    .with_limit(rng.next_int(0, 3));
                assert_eq!(
                    sql.remove_all(&ctx, &query).await.unwrap(),
                    sim.remove_all(&ctx, &query).await.unwrap(),
                    "seed {seed} step {step}: remove_all {query:?}"
                );
            }
            _ => {
                let predicate = random_predicate(&mut rng);
                let order = random_order(&mut rng);
                let mut query = Query::all()
                    .with_order(&order)
                    .with_skip(rng.next_int(0, 5))
                    .with_limit(rng.next_int(0, 8));
                if rng.next_bool(0.5) {
                    query = query.with_predicate(predicate.as_ref());
                }
                assert_eq!(
                    sql.select_all(&ctx, &query).await.unwrap(),
                    sim.select_all(&ctx, &query).await.unwrap(),
                    "seed {seed} step {step}: select {query:?}"
                );
            }
        }
    }

    let order = asc("id");
    let everything = Query::all().with_order(&order);
    assert_eq!(
        sql.select_all(&ctx, &everything).await.unwrap(),
        sim.select_all(&ctx, &everything).await.unwrap(),
        "seed {seed}: final contents"
    );
}

#[tokio::test]
async fn test_dst_sim_matches_relational_multiple_seeds() {
    for seed in [0, 1, 42, 12_345, 999_999] {
        run_parity(seed).await;
    }
}

#[tokio::test]
async fn test_dst_large_integers_agree_across_backends() {
    let ctx = Context::new();
    let config = StoreConfig::sqlite_memory();
    let sql = RelationalStorage::<Account>::new(config.connect().await.unwrap(), &config)
        .await
        .unwrap();
    let sim = SimStorage::<Account>::new(SimConfig::with_seed(7)).unwrap();

    let big = 1_i64 << 53;
    for (id, balance) in [(1, big), (2, big + 1), (3, big - 1), (4, i64::MAX)] {
        let a = account(id, "alice", balance);
        sql.put(&ctx, &a).await.unwrap();
        sim.put(&ctx, &a).await.unwrap();
    }

    let exact = eq("balance", big + 1);
    let above = gt("balance", big);
    let order = desc("balance").then_asc("id");
    let queries = [
        Query::all().with_predicate(&exact),
        Query::all().with_predicate(&above).with_order(&order),
        Query::all().with_order(&order),
    ];
    for query in &queries {
        assert_eq!(
            sql.select_all(&ctx, query).await.unwrap(),
            sim.select_all(&ctx, query).await.unwrap(),
            "{query:?}"
        );
    }
    assert_eq!(sim.select_all(&ctx, &queries[0]).await.unwrap().len(), 1);
}

// =============================================================================
// Faults through decorators
// =============================================================================

#[tokio::test]
async fn test_dst_injected_faults_are_measured_once() {
    let faults = FaultInjectorBuilder::new(DeterministicRng::new(42))
        .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 0.5).with_filter("put"))
        .build();
    let sim = SimStorage::<Account>::with_fault_injector(Arc::new(faults)).unwrap();
    let log = Arc::new(MeasurementLog::new());
    let storage = sim.decorate(Instrumentation::new(log.clone()));
    let ctx = Context::new();

    let mut failures = 0;
    for i in 0..50 {
        match storage.put(&ctx, &account(i, "alice", i)).await {
            Ok(_) => {}
            Err(e) => {
                assert!(matches!(e, StorageError::SimulatedFault { .. }));
                failures += 1;
            }
        }
    }

    assert!(failures > 0 && failures < 50, "failures: {failures}");
    assert_eq!(log.count("Account:put"), 50);
    let failed = log
        .records()
        .iter()
        .filter(|r| r.outcome == Outcome::Failed)
        .count();
    assert_eq!(failed, failures);
}
