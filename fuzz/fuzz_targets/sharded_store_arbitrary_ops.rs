#![no_main]

use std::collections::HashMap;
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use sketchcache::store::{Item, ShardedStore, UpdateOutcome};

// Fuzz arbitrary set/update/del/get sequences on the sharded store against a
// HashMap model keyed by primary hash.
//
// Conflict hashes are drawn from a tiny range so collisions are frequent.
fuzz_target!(|data: &[u8]| {
    let store: ShardedStore<u8> = ShardedStore::default();
    let mut model: HashMap<u64, (u64, u8)> = HashMap::new();

    for chunk in data.chunks(3) {
        if chunk.len() < 3 {
            break;
        }
        let op = chunk[0] % 4;
        let key = u64::from(chunk[1] % 32);
        let conflict = u64::from(chunk[1] / 32) + 1;
        let value = chunk[2];
        let item = Item {
            key,
            conflict,
            value: Arc::new(value),
            cost: 1,
            expiration: None,
        };

        match op {
            0 => {
                let written = store.set(&item);
                match model.get(&key) {
                    Some((stored, _)) if *stored != conflict => assert!(!written),
                    _ => {
                        assert!(written);
                        model.insert(key, (conflict, value));
                    },
                }
            },
            1 => match (store.update(&item), model.get(&key).copied()) {
                (UpdateOutcome::Updated(old), Some((stored, prev))) => {
                    assert_eq!(stored, conflict);
                    assert_eq!(*old, prev);
                    model.insert(key, (conflict, value));
                },
                (UpdateOutcome::Missing, None) => {},
                (UpdateOutcome::Missing, Some((stored, _))) => assert_ne!(stored, conflict),
                (outcome, expected) => panic!("update {outcome:?} vs model {expected:?}"),
            },
            2 => {
                let removed = store.del(key, conflict);
                match model.get(&key).copied() {
                    Some((stored, prev)) if stored == conflict => {
                        assert_eq!(removed.map(|(c, v)| (c, *v)), Some((stored, prev)));
                        model.remove(&key);
                    },
                    _ => assert!(removed.is_none()),
                }
            },
            _ => {
                let got = store.get(key, conflict).map(|v| *v);
                let expected = model
                    .get(&key)
                    .filter(|(stored, _)| *stored == conflict)
                    .map(|(_, v)| *v);
                assert_eq!(got, expected);
            },
        }
    }

    assert_eq!(store.len(), model.len());
});
