//! Limiter aggregator
//!
//! Every kicker owns one slot holding an optional upper (fastest allowed)
//! and lower (slowest allowed) OPP index. Resolution picks, per side, the
//! enabled request with the highest priority; on equal priority the more
//! extreme index wins (larger for upper, smaller for lower). Because the
//! slots are scanned in fixed kicker order and ties only move to strictly
//! more extreme indices, the result does not depend on the order in which
//! requests arrived.

use core::fmt;

use gpufreq_api::{KickerId, LimitPriority, ResolvedWindow};

/// One kicker's limit request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterEntry {
    /// Kicker name
    pub name: &'static str,
    /// Owning kicker
    pub kicker: KickerId,
    /// Priority of both bounds
    pub priority: LimitPriority,
    /// Fastest index allowed, `None` for no limit
    pub upper_idx: Option<usize>,
    /// Slowest index allowed, `None` for no limit
    pub lower_idx: Option<usize>,
    /// Whether the upper bound takes part in resolution
    pub upper_enabled: bool,
    /// Whether the lower bound takes part in resolution
    pub lower_enabled: bool,
}

impl LimiterEntry {
    /// Fresh entry with no limits
    pub const fn new(kicker: KickerId) -> Self {
        Self {
            name: kicker.name(),
            kicker,
            priority: kicker.default_priority(),
            upper_idx: None,
            lower_idx: None,
            upper_enabled: true,
            lower_enabled: true,
        }
    }

    fn active_upper(&self) -> Option<usize> {
        self.upper_idx.filter(|_| self.upper_enabled)
    }

    fn active_lower(&self) -> Option<usize> {
        self.lower_idx.filter(|_| self.lower_enabled)
    }
}

/// Winning bound of one side before conflicts are settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundWinner {
    /// Resolved index
    pub idx: usize,
    /// Kicker that set it, `None` when it is the segment boundary
    pub kicker: Option<KickerId>,
    /// Priority it won with
    pub priority: LimitPriority,
}

/// Result of scanning the table, before an inverted window is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitScan {
    /// Upper bound winner
    pub upper: BoundWinner,
    /// Lower bound winner
    pub lower: BoundWinner,
}

/// Fixed table of limiter slots, one per kicker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterTable {
    entries: [LimiterEntry; KickerId::COUNT],
    segment_max_idx: usize,
    segment_min_idx: usize,
    window: ResolvedWindow,
}

impl LimiterTable {
    /// Create the table for a segment, all slots unconstrained
    pub fn new(segment_max_idx: usize, segment_min_idx: usize) -> Self {
        Self {
            entries: KickerId::ALL.map(LimiterEntry::new),
            segment_max_idx,
            segment_min_idx,
            window: ResolvedWindow::unconstrained(segment_max_idx, segment_min_idx),
        }
    }

    /// Slot of a kicker
    pub fn entry(&self, kicker: KickerId) -> &LimiterEntry {
        &self.entries[kicker.index()]
    }

    /// All slots in kicker order
    pub fn entries(&self) -> &[LimiterEntry] {
        &self.entries
    }

    /// Window from the last resolution
    pub fn window(&self) -> ResolvedWindow {
        self.window
    }

    fn clamp_idx(&self, idx: usize) -> usize {
        idx.clamp(self.segment_max_idx, self.segment_min_idx)
    }

    /// Change a kicker's priority
    pub fn set_priority(&mut self, kicker: KickerId, priority: LimitPriority) -> bool {
        let entry = &mut self.entries[kicker.index()];
        if entry.priority == priority {
            return false;
        }
        entry.priority = priority;
        self.window = self.resolve_window();
        true
    }

    /// Store a kicker's bounds; returns whether anything changed
    ///
    /// Indices are clamped into the segment before being stored.
    pub fn update_limit(&mut self, kicker: KickerId, upper: Option<usize>, lower: Option<usize>) -> bool {
        let upper = upper.map(|idx| self.clamp_idx(idx));
        let lower = lower.map(|idx| self.clamp_idx(idx));

        let entry = &mut self.entries[kicker.index()];
        if entry.upper_idx == upper && entry.lower_idx == lower {
            return false;
        }
        entry.upper_idx = upper;
        entry.lower_idx = lower;

        gf_debug!("limit {} upper {:?} lower {:?}", kicker, upper, lower);
        self.window = self.resolve_window();
        true
    }

    /// Enable or disable a kicker's bounds; returns whether anything changed
    pub fn update_limit_enable(&mut self, kicker: KickerId, upper_enabled: bool, lower_enabled: bool) -> bool {
        let entry = &mut self.entries[kicker.index()];
        if entry.upper_enabled == upper_enabled && entry.lower_enabled == lower_enabled {
            return false;
        }
        entry.upper_enabled = upper_enabled;
        entry.lower_enabled = lower_enabled;

        gf_debug!("limit {} enable upper {} lower {}", kicker, upper_enabled, lower_enabled);
        self.window = self.resolve_window();
        true
    }

    /// Pick the winning bound of each side
    pub fn scan(&self) -> LimitScan {
        let mut upper = BoundWinner {
            idx: self.segment_max_idx,
            kicker: None,
            priority: LimitPriority::NONE,
        };
        let mut lower = BoundWinner {
            idx: self.segment_min_idx,
            kicker: None,
            priority: LimitPriority::NONE,
        };

        for entry in self.entries.iter() {
            if let Some(idx) = entry.active_upper() {
                if entry.priority > upper.priority
                    || (entry.priority == upper.priority && idx > upper.idx)
                {
                    upper = BoundWinner {
                        idx,
                        kicker: Some(entry.kicker),
                        priority: entry.priority,
                    };
                }
            }
            if let Some(idx) = entry.active_lower() {
                if entry.priority > lower.priority
                    || (entry.priority == lower.priority && idx < lower.idx)
                {
                    lower = BoundWinner {
                        idx,
                        kicker: Some(entry.kicker),
                        priority: entry.priority,
                    };
                }
            }
        }

        LimitScan { upper, lower }
    }

    /// Resolve all slots into one window
    ///
    /// An inverted window (upper slower than lower) is settled by resetting
    /// the side with the lower priority to the segment boundary; on equal
    /// priority the lower bound gives way.
    pub fn resolve_window(&self) -> ResolvedWindow {
        let LimitScan { upper, lower } = self.scan();
        let mut window = ResolvedWindow {
            upper_limited_idx: upper.idx,
            lower_limited_idx: lower.idx,
            upper_kicker: upper.kicker,
            lower_kicker: lower.kicker,
        };

        if window.upper_limited_idx > window.lower_limited_idx {
            if upper.priority >= lower.priority {
                window.lower_limited_idx = self.segment_min_idx;
                window.lower_kicker = None;
            } else {
                window.upper_limited_idx = self.segment_max_idx;
                window.upper_kicker = None;
            }
            gf_debug!(
                "inverted limit window settled to [{}, {}]",
                window.upper_limited_idx,
                window.lower_limited_idx
            );
        }

        window
    }
}

impl fmt::Display for LimiterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<14} {:>4} {:>6} {:>6} {:>4} {:>4}", "kicker", "prio", "upper", "lower", "u_en", "l_en")?;
        for entry in self.entries.iter() {
            let upper = entry.upper_idx.map_or(-1, |idx| idx as i64);
            let lower = entry.lower_idx.map_or(-1, |idx| idx as i64);
            writeln!(
                f,
                "{:<14} {:>4} {:>6} {:>6} {:>4} {:>4}",
                entry.name,
                entry.priority.0,
                upper,
                lower,
                entry.upper_enabled as u8,
                entry.lower_enabled as u8
            )?;
        }
        write!(
            f,
            "window [{}, {}] upper by {} lower by {}",
            self.window.upper_limited_idx,
            self.window.lower_limited_idx,
            self.window.upper_kicker.map_or("NONE", KickerId::name),
            self.window.lower_kicker.map_or("NONE", KickerId::name)
        )
    }
}
