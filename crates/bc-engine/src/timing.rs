//! Tempo/loop snapshot shared by the scheduler, coordinator and metronome.
//!
//! Every subsystem holds a clone of the same `SharedTiming`, so a tempo or
//! loop change is observed identically by all of them. Reads are lock-free
//! (`ArcSwap::load`); writers replace the whole snapshot.

use std::sync::Arc;

use arc_swap::ArcSwap;
use bc_ir::{CycleConfig, SchedulingContext};

/// Immutable tempo + loop snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimingSnapshot {
    pub context: SchedulingContext,
    pub cycle: CycleConfig,
}

/// Handle to the shared timing cell. Clones share one cell.
#[derive(Clone, Debug)]
pub struct SharedTiming {
    cell: Arc<ArcSwap<TimingSnapshot>>,
}

impl SharedTiming {
    pub fn new(context: SchedulingContext) -> Self {
        Self {
            cell: Arc::new(ArcSwap::from_pointee(TimingSnapshot {
                context,
                cycle: CycleConfig::disabled(),
            })),
        }
    }

    /// Current snapshot.
    #[inline]
    pub fn snapshot(&self) -> TimingSnapshot {
        **self.cell.load()
    }

    #[inline]
    pub fn context(&self) -> SchedulingContext {
        self.cell.load().context
    }

    #[inline]
    pub fn cycle(&self) -> CycleConfig {
        self.cell.load().cycle
    }

    /// Replace the scheduling context, keeping the loop range.
    pub fn set_context(&self, context: SchedulingContext) {
        self.cell.rcu(|current| TimingSnapshot {
            context,
            cycle: current.cycle,
        });
    }

    /// Replace the loop range, keeping the scheduling context.
    pub fn set_cycle(&self, cycle: CycleConfig) {
        self.cell.rcu(|current| TimingSnapshot {
            context: current.context,
            cycle,
        });
    }

    /// Whether two handles refer to the same cell.
    pub fn shares_cell_with(&self, other: &SharedTiming) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Default for SharedTiming {
    fn default() -> Self {
        Self::new(SchedulingContext::default())
    }
}
