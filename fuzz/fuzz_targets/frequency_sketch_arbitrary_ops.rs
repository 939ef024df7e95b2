#![no_main]

use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sketchcache::ds::MAX_COUNT;
use sketchcache::policy::FrequencySketch;

// Fuzz arbitrary increment/estimate/reset sequences on the admission sketch.
//
// Estimates are bounded by the 4-bit counter ceiling plus the doorkeeper
// bonus, and never drop while only increments happen.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let num_counters = (usize::from(data[0]) + 1) * 8;
    let mut sketch = FrequencySketch::new(num_counters, &mut StdRng::seed_from_u64(u64::from(data[1])));

    for chunk in data[2..].chunks(2) {
        let op = chunk[0] % 8;
        let key = u64::from(*chunk.get(1).unwrap_or(&0));

        match op {
            0 => sketch.reset(),
            1 => {
                sketch.clear();
                assert_eq!(sketch.estimate(key), 0);
            },
            _ => {
                let before = sketch.estimate(key);
                let incrs_before = sketch.increments();
                sketch.increment(key);
                let after = sketch.estimate(key);
                // A reset may have halved counters in between.
                if sketch.increments() > incrs_before {
                    assert!(after >= before);
                }
            },
        }

        assert!(sketch.estimate(key) <= i64::from(MAX_COUNT) + 1);
    }
});
