use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::SensingConfig;
use crate::symbol::Symbol;

/// Shape of the line as seen over the last few events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePattern {
    #[default]
    DefaultLine,
    /// Nothing but white for a long stretch.
    LongWhiteSection,
    /// Short black dashes separated by white gaps.
    ShortBlackSections,
}

/// A run of identical symbols collapsed into one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    /// First symbol of the run.
    pub symbol: Symbol,
    /// Number of ticks the run has lasted so far.
    pub ticks: u32,
}

/// Fixed-capacity ring of recent symbol events. The oldest entry is dropped
/// once full; the buffer never shrinks.
#[derive(Debug, Clone)]
pub struct SymbolHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl SymbolHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a symbol. Returns `true` when it started a new entry and
    /// `false` when it only extended the current run.
    pub fn push(&mut self, symbol: Symbol) -> bool {
        if let Some(last) = self.entries.back_mut() {
            if last.symbol.same_states(&symbol) {
                last.ticks = last.ticks.saturating_add(1);
                return false;
            }
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { symbol, ticks: 1 });
        true
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pattern(&self, config: &SensingConfig) -> LinePattern {
        if let Some(latest) = self.latest() {
            if latest.symbol.all_white() && latest.ticks >= config.long_white_ticks {
                return LinePattern::LongWhiteSection;
            }
        }

        let dashes = self
            .entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .filter(|(dash, gap)| {
                dash.symbol.center().is_black()
                    && dash.ticks <= config.short_black_ticks
                    && gap.symbol.center().is_white()
            })
            .count();
        if dashes >= config.dashed_min_segments {
            LinePattern::ShortBlackSections
        } else {
            LinePattern::DefaultLine
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Readings, Tri};

    fn sym(left: Tri, right: Tri, center: Tri) -> Symbol {
        Symbol::new(left, right, center, Readings::default())
    }

    fn white() -> Symbol {
        sym(Tri::White, Tri::White, Tri::White)
    }

    fn dash() -> Symbol {
        sym(Tri::White, Tri::White, Tri::Black)
    }

    #[test]
    fn identical_symbols_collapse_into_one_run() {
        let mut history = SymbolHistory::new(8);
        assert!(history.push(white()));
        assert!(!history.push(white()));
        assert!(!history.push(white()));
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().ticks, 3);

        assert!(history.push(dash()));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn overwrites_oldest_and_never_exceeds_capacity() {
        let mut history = SymbolHistory::new(3);
        let left = sym(Tri::Black, Tri::White, Tri::White);
        let right = sym(Tri::White, Tri::Black, Tri::White);
        for symbol in [white(), left, right, dash()] {
            history.push(symbol);
        }
        assert_eq!(history.len(), 3);
        let first = history.iter().next().unwrap();
        assert!(first.symbol.same_states(&left));
    }

    #[test]
    fn long_white_run_is_detected() {
        let config = SensingConfig::default();
        let mut history = SymbolHistory::new(8);
        history.push(dash());
        for _ in 0..9 {
            history.push(white());
        }
        assert_eq!(history.pattern(&config), LinePattern::DefaultLine);
        history.push(white());
        assert_eq!(history.pattern(&config), LinePattern::LongWhiteSection);
    }

    #[test]
    fn alternating_short_dashes_form_a_dashed_line() {
        let config = SensingConfig::default();
        let mut history = SymbolHistory::new(8);
        for _ in 0..3 {
            history.push(dash());
            history.push(white());
            history.push(white());
        }
        assert_eq!(history.pattern(&config), LinePattern::ShortBlackSections);
    }

    #[test]
    fn long_black_runs_are_not_dashes() {
        let config = SensingConfig::default();
        let mut history = SymbolHistory::new(8);
        for _ in 0..3 {
            for _ in 0..5 {
                history.push(dash());
            }
            history.push(white());
        }
        assert_eq!(history.pattern(&config), LinePattern::DefaultLine);
    }
}
