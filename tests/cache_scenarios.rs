// ==============================================
// CACHE SCENARIO TESTS (integration)
// ==============================================
//
// End-to-end behavior of the public facade: admission, eviction, ordering of
// deletes against in-flight sets, and the capacity and mirror invariants.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sketchcache::prelude::*;

fn cache(max_cost: i64) -> Cache<u64, u64> {
    CacheBuilder::new(10_000, max_cost)
        .ignore_internal_cost(true)
        .metrics(true)
        .seed(11)
        .build()
        .unwrap()
}

// ==============================================
// Round trip
// ==============================================

mod round_trip {
    use super::*;

    #[test]
    fn set_wait_get() {
        let c = cache(100);
        assert!(c.set(&1, 100, 1));
        c.wait();
        assert_eq!(c.get(&1).as_deref(), Some(&100));
        assert_eq!(c.len(), 1);
        c.check_invariants().unwrap();
    }

    #[test]
    fn string_keys() {
        let c: Cache<str, String> = CacheBuilder::new(1_000, 100)
            .ignore_internal_cost(true)
            .build()
            .unwrap();
        c.set("alpha", "a".into(), 1);
        c.set("beta", "b".into(), 1);
        c.wait();
        assert_eq!(c.get("alpha").as_deref().map(String::as_str), Some("a"));
        assert_eq!(c.get("beta").as_deref().map(String::as_str), Some("b"));
        assert!(c.get("gamma").is_none());
    }

    #[test]
    fn delete_ordering_against_inflight_sets() {
        // set v1, del, set v2 with no wait in between must end at v2.
        for _ in 0..200 {
            let c = cache(100);
            c.set(&7, 1, 1);
            c.del(&7);
            c.set(&7, 2, 1);
            c.wait();
            assert_eq!(c.get(&7).as_deref(), Some(&2));
            c.check_invariants().unwrap();
        }
    }

    #[test]
    fn delete_after_set_leaves_nothing() {
        for _ in 0..200 {
            let c = cache(100);
            c.set(&3, 1, 1);
            c.del(&3);
            c.wait();
            assert!(c.get(&3).is_none());
            assert_eq!(c.used_cost(), 0);
            c.check_invariants().unwrap();
        }
    }
}

// ==============================================
// Eviction and admission
// ==============================================

mod eviction {
    use super::*;

    #[test]
    fn total_cost_never_exceeds_max_cost() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evicted);
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 10)
            .ignore_internal_cost(true)
            .metrics(true)
            .on_evict(move |_: &Item<u64>| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .build()
            .unwrap();

        for key in 0..100u64 {
            c.set(&key, key, 1);
        }
        c.wait();

        assert!(c.used_cost() <= 10);
        assert!(c.len() <= 10);
        c.check_invariants().unwrap();

        let snap = c.metrics().unwrap().snapshot();
        assert_eq!(snap.keys_evicted as usize, evicted.load(Ordering::Relaxed));
        assert_eq!(
            snap.keys_added - snap.keys_evicted,
            c.len() as u64,
            "every admitted key is either resident or evicted"
        );
    }

    #[test]
    fn one_more_key_than_fits_evicts_exactly_one() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evicted);
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 10)
            .ignore_internal_cost(true)
            .on_evict(move |item: &Item<u64>| {
                assert_eq!(item.cost, 1);
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .build()
            .unwrap();

        for key in 0..10u64 {
            assert!(c.set(&key, key, 1));
        }
        c.wait();
        assert_eq!(c.len(), 10);
        assert_eq!(evicted.load(Ordering::Relaxed), 0);

        c.set(&10, 10, 1);
        c.wait();

        assert_eq!(evicted.load(Ordering::Relaxed), 1);
        assert_eq!(c.len(), 10);
        assert_eq!(c.used_cost(), 10);
        assert_eq!(c.get(&10).as_deref(), Some(&10));
        let gone: Vec<u64> = (0..10u64).filter(|k| c.get(k).is_none()).collect();
        assert_eq!(gone.len(), 1, "expected one evicted key, got {gone:?}");
        c.check_invariants().unwrap();
    }

    #[test]
    fn frequently_read_keys_survive_a_scan() {
        let c = cache(10);
        for key in 0..10u64 {
            c.set(&key, key, 1);
        }
        c.wait();

        // Build read frequency for the residents.
        for _ in 0..50 {
            for key in 0..10u64 {
                c.get(&key);
            }
        }
        std::thread::sleep(Duration::from_millis(100));

        // A one-off scan of new keys should mostly bounce off.
        for key in 1_000..1_100u64 {
            c.set(&key, key, 1);
        }
        c.wait();

        let survivors = (0..10u64).filter(|k| c.get(k).is_some()).count();
        assert!(survivors >= 8, "only {survivors} hot keys survived");
        let snap = c.metrics().unwrap().snapshot();
        assert!(snap.sets_rejected > 0);
        c.check_invariants().unwrap();
    }

    #[test]
    fn oversized_item_is_never_admitted() {
        let c = cache(10);
        c.set(&1, 1, 11);
        c.wait();
        assert!(c.get(&1).is_none());
        assert_eq!(c.used_cost(), 0);
    }

    #[test]
    fn maximal_cost_is_rejected_without_stalling_writes() {
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 1_000).build().unwrap();
        assert!(c.set(&1, 1, i64::MAX));
        c.wait();
        assert!(c.get(&1).is_none());
        assert_eq!(c.used_cost(), 0);

        c.set(&2, 2, 1);
        c.wait();
        assert_eq!(c.get(&2).as_deref(), Some(&2));

        // Growing a resident entry to the maximum drops it.
        c.set(&2, 3, i64::MAX);
        c.wait();
        assert!(c.get(&2).is_none());
        assert_eq!(c.used_cost(), 0);
        c.check_invariants().unwrap();
    }

    #[test]
    fn shrinking_budget_applies_on_next_write() {
        let c = cache(20);
        for key in 0..20u64 {
            c.set(&key, key, 1);
        }
        c.wait();
        assert_eq!(c.used_cost(), 20);

        c.update_max_cost(5);
        assert_eq!(c.max_cost(), 5);
        // Nothing is evicted until the next admission decision.
        assert_eq!(c.used_cost(), 20);

        c.set(&999, 999, 1);
        c.wait();
        assert!(c.used_cost() <= 5);
        c.check_invariants().unwrap();
    }

    #[test]
    fn growing_cost_on_update_evicts_others() {
        let c = cache(10);
        for key in 0..10u64 {
            c.set(&key, key, 1);
        }
        c.wait();
        c.set(&0, 0, 6);
        c.wait();
        assert!(c.used_cost() <= 10);
        assert_eq!(c.get(&0).as_deref(), Some(&0));
        c.check_invariants().unwrap();
    }
}

// ==============================================
// Callbacks and lifecycle
// ==============================================

mod lifecycle {
    use super::*;

    #[test]
    fn every_value_reaches_on_exit_once() {
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&exits);
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 5)
            .ignore_internal_cost(true)
            .on_exit(move |_: &u64| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .build()
            .unwrap();

        for key in 0..50u64 {
            c.set(&key, key, 1);
        }
        c.wait();
        let resident = c.len();
        c.clear();
        assert_eq!(exits.load(Ordering::Relaxed), 50);
        assert!(resident <= 5);
    }

    #[test]
    fn wait_after_clear_still_returns() {
        let c = cache(100);
        c.set(&1, 1, 1);
        c.clear();
        c.wait();
        assert!(c.get(&1).is_none());
        c.set(&2, 2, 1);
        c.wait();
        assert_eq!(c.get(&2).as_deref(), Some(&2));
    }

    #[test]
    fn dropping_an_open_cache_stops_its_threads() {
        for _ in 0..50 {
            let c = cache(100);
            c.set(&1, 1, 1);
            drop(c);
        }
    }

    #[test]
    fn metrics_export_as_prometheus_text() {
        use sketchcache::metrics::{MetricsExporter, PrometheusTextExporter};

        let c = cache(100);
        c.set(&1, 1, 1);
        c.wait();
        c.get(&1);
        c.get(&2);

        let exporter = PrometheusTextExporter::new("sketchcache", Vec::new());
        exporter.export(&c.snapshot().unwrap());
        let text = String::from_utf8(exporter.into_inner()).unwrap();
        assert!(text.contains("sketchcache_hits_total 1"));
        assert!(text.contains("sketchcache_misses_total 1"));
        assert!(text.contains("sketchcache_keys_added_total 1"));
        assert!(text.contains("# TYPE sketchcache_hit_ratio gauge"));
    }
}
