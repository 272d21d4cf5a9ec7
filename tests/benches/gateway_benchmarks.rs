//! # Karma-Gate Benchmarks
//!
//! | Path | Operation | Target |
//! |------|-----------|--------|
//! | kg-01 Signal Validator | Envelope validation | < 50μs |
//! | kg-02 Security Manager | Sign + verify | < 50μs |
//! | kg-03 Audit Log | Append through the writer task | < 1ms |
//! | kg-03 Audit Log | Verify 10k-entry chain | < 100ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kg_01_signal_validator::SignalValidator;
use kg_02_security_manager::{SecurityManager, SignalSecurity};
use kg_03_audit_log::{
    AuditEvent, AuditLog, ChainHasher, InMemoryAuditStore, Sha256Hasher, Sha3Hasher,
};
use shared_bus::ReplayCache;
use shared_types::{
    AuthorizationState, Clock, ProductContext, ReasonCode, RequestId, SharedSecret, SignalDraft,
    SignalKind, SubjectId, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;

fn draft() -> SignalDraft {
    SignalDraft {
        subject_id: SubjectId::parse("bench-subject").unwrap(),
        context: ProductContext::Game,
        kind: SignalKind::Restrict,
        severity: 0.8,
        reason_code: ReasonCode::parse("CHEAT_DETECTED_001").unwrap(),
        ttl: 300,
        requires_ack: true,
    }
}

fn security() -> SecurityManager {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(ReplayCache::new(10_000_000, 3_600, clock.clone()));
    SecurityManager::new(SharedSecret::generate(), cache, clock)
}

// ============================================================================
// kg-01 / kg-02: Signals
// ============================================================================

fn bench_signal_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("kg-02-security-manager");
    group.measurement_time(Duration::from_secs(5));

    let manager = security();
    let draft = draft();

    group.bench_function("sign", |b| b.iter(|| manager.sign(black_box(&draft)).unwrap()));

    // Every verify inserts a fresh nonce, so each iteration signs too.
    group.bench_function("sign_and_verify", |b| {
        b.iter(|| {
            let signal = manager.sign(&draft).unwrap();
            manager.verify(black_box(&signal)).unwrap();
        })
    });
    group.finish();

    let mut group = c.benchmark_group("kg-01-signal-validator");
    let validator = SignalValidator::default();
    let wire = serde_json::to_value(manager.sign(&draft).unwrap().to_envelope()).unwrap();
    group.bench_function("validate_envelope", |b| {
        b.iter(|| validator.validate(black_box(&wire)).unwrap())
    });
    group.finish();
}

// ============================================================================
// kg-03: Audit Log
// ============================================================================

fn bench_audit_append(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("kg-03-audit-log/append");
    group.throughput(Throughput::Elements(1));

    let hashers: [(&str, Arc<dyn ChainHasher>); 2] =
        [("sha256", Arc::new(Sha256Hasher)), ("sha3-256", Arc::new(Sha3Hasher))];
    for (name, hasher) in hashers {
        let log = runtime.block_on(async {
            AuditLog::open(
                Arc::new(InMemoryAuditStore::new()),
                hasher,
                Arc::new(SystemClock),
            )
            .unwrap()
        });
        group.bench_with_input(BenchmarkId::from_parameter(name), &log, |b, log| {
            b.iter(|| {
                runtime
                    .block_on(log.append(
                        AuditEvent::resolution(RequestId::new(), AuthorizationState::Allowed)
                            .unwrap(),
                    ))
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_audit_verify(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("kg-03-audit-log/verify_chain");
    group.sample_size(20);

    for size in [1_000u64, 10_000] {
        let log = runtime.block_on(async {
            let log = AuditLog::open(
                Arc::new(InMemoryAuditStore::new()),
                Arc::new(Sha256Hasher),
                Arc::new(SystemClock),
            )
            .unwrap();
            for _ in 0..size {
                log.append(AuditEvent::resolution(RequestId::new(), AuthorizationState::Denied).unwrap())
                    .await
                    .unwrap();
            }
            log
        });
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &log, |b, log| {
            b.iter(|| runtime.block_on(log.verify_chain()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_signal_path,
    bench_audit_append,
    bench_audit_verify
);
criterion_main!(benches);
