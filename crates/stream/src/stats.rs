use std::time::Duration;

use meander_common::ChunkCoord;

/// Outcome of the most recent observer move.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStats {
    pub observer: ChunkCoord,
    /// Chunks that survived the shift and kept their buffers.
    pub reused: usize,
    pub generated: usize,
    pub evicted: usize,
    /// The move spanned a full grid edge and every slot was discarded.
    pub full_reset: bool,
    pub elapsed: Duration,
}

/// Running totals since the grid was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamTotals {
    pub updates: u64,
    pub generated: u64,
    pub evicted: u64,
    pub full_resets: u64,
}

impl StreamTotals {
    pub fn record(&mut self, stats: &StreamStats) {
        self.updates += 1;
        self.generated += stats.generated as u64;
        self.evicted += stats.evicted as u64;
        if stats.full_reset {
            self.full_resets += 1;
        }
    }
}

/// What one render pass over the resident chunks did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub drawn: usize,
    pub materialized: usize,
}
