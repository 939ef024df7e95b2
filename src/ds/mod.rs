pub mod bloom;
pub mod cm_sketch;
pub mod ring;
pub mod shard;

pub use bloom::Doorkeeper;
pub use cm_sketch::{CM_DEPTH, CountMinSketch, MAX_COUNT};
pub use ring::{AccessBatcher, BatchConsumer};
pub use shard::{NUM_SHARDS, ShardSelector};

/// SplitMix64 finalizer; spreads low-entropy hashes across all 64 bits.
#[inline]
pub(crate) fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
