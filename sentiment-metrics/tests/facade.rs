use std::{sync::Arc, thread};

use approx::assert_relative_eq;
use proptest::prelude::*;
use sentiment_metrics::{
    InMemoryRegistry, SentimentMetrics, ANALYSIS_DURATION, ANALYSIS_TOTAL, COMPANIES_DETECTED,
    CONFIDENCE_SCORE,
};

fn facade() -> (Arc<InMemoryRegistry>, SentimentMetrics) {
    let registry = Arc::new(InMemoryRegistry::new());
    let metrics = SentimentMetrics::new(Arc::clone(&registry)).expect("facade should build");
    (registry, metrics)
}

#[test]
fn concurrent_recording_loses_no_updates() {
    const THREADS: usize = 8;
    const ITERATIONS: u64 = 500;

    let (registry, metrics) = facade();

    thread::scope(|s| {
        for t in 0..THREADS {
            let metrics = &metrics;
            s.spawn(move || {
                let company = if t % 2 == 0 { "Acme" } else { "Globex" };
                for i in 0..ITERATIONS {
                    metrics.record_analysis("positive", company).unwrap();
                    metrics.record_duration(i, company, "finbert").unwrap();
                    metrics.record_confidence(0.5, "positive", company).unwrap();
                    metrics.record_companies_detected(t as i32);
                }
            });
        }
    });

    let snapshot = registry.snapshot();
    let per_company = ITERATIONS * (THREADS as u64 / 2);
    for company in ["Acme", "Globex"] {
        assert_eq!(
            snapshot.counter(ANALYSIS_TOTAL, &[("sentiment", "positive"), ("company", company)]),
            Some(per_company)
        );

        let timer_tags = [("company", company), ("model", "finbert")];
        let timer = snapshot.timer(ANALYSIS_DURATION, &timer_tags).unwrap();
        assert_eq!(timer.count() as u64, per_company);
        assert_relative_eq!(timer.max(), (ITERATIONS - 1) as f64);

        let summary_tags = [("sentiment", "positive"), ("company", company)];
        let summary = snapshot.summary(CONFIDENCE_SCORE, &summary_tags).unwrap();
        assert_eq!(summary.count() as u64, per_company);
        assert_relative_eq!(summary.mean(), 50.0, epsilon = 1e-9);
    }

    // Whichever thread wrote last, the gauge shows a value some thread actually wrote.
    let gauge = snapshot.gauge(COMPANIES_DETECTED, &[]).unwrap();
    assert!((0.0..THREADS as f64).contains(&gauge));
    assert_eq!(gauge, f64::from(metrics.companies_detected()));
}

#[test]
fn gauge_reads_never_tear_under_concurrent_writes() {
    let (registry, metrics) = facade();
    let allowed = [i32::MIN, -1, 0, 1, i32::MAX];

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..1_000 {
                for value in allowed {
                    metrics.record_companies_detected(value);
                }
            }
        });

        s.spawn(|| {
            for _ in 0..1_000 {
                let read = registry.snapshot().gauge(COMPANIES_DETECTED, &[]).unwrap();
                assert!(allowed.iter().any(|v| f64::from(*v) == read), "torn read: {}", read);
            }
        });
    });
}

#[test]
fn separate_registries_are_isolated() {
    let (first, first_metrics) = facade();
    let (second, _second_metrics) = facade();

    first_metrics.record_analysis("positive", "Acme").unwrap();
    first_metrics.record_companies_detected(5);

    assert_eq!(
        first.snapshot().counter(ANALYSIS_TOTAL, &[("sentiment", "positive"), ("company", "Acme")]),
        Some(1)
    );
    assert_eq!(second.snapshot().len(), 1);
    assert_eq!(second.snapshot().gauge(COMPANIES_DETECTED, &[]), Some(0.0));
}

proptest! {
    #[test]
    fn gauge_is_last_write_wins(counts in proptest::collection::vec(any::<i32>(), 1..64)) {
        let (registry, metrics) = facade();
        for count in &counts {
            metrics.record_companies_detected(*count);
            metrics.record_analysis("neutral", "Acme").unwrap();
        }

        let last = *counts.last().unwrap();
        prop_assert_eq!(registry.snapshot().gauge(COMPANIES_DETECTED, &[]), Some(f64::from(last)));
    }

    #[test]
    fn analysis_counter_increases_by_call_count(
        sentiment in "[a-z]{1,8}",
        company in "[A-Za-z]{1,12}",
        n in 1u64..200,
    ) {
        let (registry, metrics) = facade();
        for _ in 0..n {
            metrics.record_analysis(&sentiment, &company).unwrap();
        }

        let tags = [("sentiment", sentiment.as_str()), ("company", company.as_str())];
        prop_assert_eq!(registry.snapshot().counter(ANALYSIS_TOTAL, &tags), Some(n));
    }

    #[test]
    fn confidence_is_recorded_times_one_hundred(confidence in 0.0f64..=1.0) {
        let (registry, metrics) = facade();
        metrics.record_confidence(confidence, "positive", "Acme").unwrap();

        let snapshot = registry.snapshot();
        let summary = snapshot
            .summary(CONFIDENCE_SCORE, &[("sentiment", "positive"), ("company", "Acme")])
            .unwrap();
        prop_assert_eq!(summary.count(), 1);
        prop_assert!((summary.total() - confidence * 100.0).abs() < 1e-9);
    }

    #[test]
    fn duration_adds_exactly_one_observation(millis in any::<u32>()) {
        let (registry, metrics) = facade();
        metrics.record_duration(u64::from(millis), "Acme", "finbert").unwrap();

        let snapshot = registry.snapshot();
        let timer = snapshot
            .timer(ANALYSIS_DURATION, &[("company", "Acme"), ("model", "finbert")])
            .unwrap();
        prop_assert_eq!(timer.count(), 1);
        prop_assert_eq!(timer.total(), f64::from(millis));
        prop_assert_eq!(timer.max(), f64::from(millis));
    }
}
