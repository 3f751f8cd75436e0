//! Auto-book eligibility and search-window rules.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::domain::Term;

/// Slots must start more than this far ahead to be booked automatically
pub const DEFAULT_MIN_LEAD_HOURS: i64 = 14;

/// Length of one search window
pub const DEFAULT_WINDOW_DAYS: i64 = 14;

/// Longest accepted search window
pub const MAX_WINDOW_DAYS: i64 = 365;

/// Decides which slot, if any, may be booked without asking the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoBookRule {
    pub min_lead: Duration,
}

impl Default for AutoBookRule {
    fn default() -> Self {
        Self {
            min_lead: Duration::hours(DEFAULT_MIN_LEAD_HOURS),
        }
    }
}

impl AutoBookRule {
    pub fn new(min_lead: Duration) -> Self {
        Self { min_lead }
    }

    pub fn qualifies(&self, term: &Term, now: NaiveDateTime) -> bool {
        term.date_time_from - now > self.min_lead
    }

    /// First qualifying slot in search order. Not re-sorted: the earliest
    /// slot is not necessarily the one chosen.
    pub fn select<'a>(&self, terms: impl IntoIterator<Item = &'a Term>, now: NaiveDateTime) -> Option<&'a Term> {
        terms.into_iter().find(|t| self.qualifies(t, now))
    }
}

/// Two consecutive date windows; the second is searched only when the
/// first comes back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub days: i64,
}

impl Default for SearchWindow {
    fn default() -> Self {
        Self {
            days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl SearchWindow {
    /// Window length is clamped to `1..=MAX_WINDOW_DAYS`
    pub fn new(days: i64) -> Self {
        Self {
            days: days.clamp(1, MAX_WINDOW_DAYS),
        }
    }

    pub fn first(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today, today + Duration::days(self.days))
    }

    pub fn second(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today + Duration::days(self.days), today + Duration::days(self.days * 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::mock::term_at;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-06-01 12:00", "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_qualifies_strictly_beyond_lead() {
        let rule = AutoBookRule::default();
        assert!(rule.qualifies(&term_at(now() + Duration::hours(20), false), now()));
        assert!(!rule.qualifies(&term_at(now() + Duration::hours(10), false), now()));
        assert!(!rule.qualifies(&term_at(now() + Duration::hours(14), false), now()));
        assert!(rule.qualifies(&term_at(now() + Duration::hours(14) + Duration::seconds(1), false), now()));
    }

    #[test]
    fn test_select_keeps_search_order() {
        let rule = AutoBookRule::default();
        let later = term_at(now() + Duration::days(5), false);
        let sooner = term_at(now() + Duration::days(1), false);
        let too_soon = term_at(now() + Duration::hours(2), false);
        let terms = vec![too_soon, later.clone(), sooner];

        let chosen = rule.select(&terms, now()).unwrap();
        assert_eq!(chosen, &later);
    }

    #[test]
    fn test_select_none_qualifying() {
        let rule = AutoBookRule::default();
        let terms = vec![term_at(now() + Duration::hours(1), false)];
        assert!(rule.select(&terms, now()).is_none());
        assert!(rule.select(&Vec::<Term>::new(), now()).is_none());
    }

    #[test]
    fn test_search_windows_cover_28_days() {
        let window = SearchWindow::default();
        let today = now().date();
        let (from1, to1) = window.first(today);
        let (from2, to2) = window.second(today);
        assert_eq!(from1, today);
        assert_eq!(to1, from2);
        assert_eq!((to2 - today).num_days(), 28);
    }

    #[test]
    fn test_window_length_is_clamped() {
        assert_eq!(SearchWindow::new(i64::MAX).days, MAX_WINDOW_DAYS);
        assert_eq!(SearchWindow::new(0).days, 1);

        let today = now().date();
        let (_, to) = SearchWindow::new(i64::MAX).second(today);
        assert_eq!((to - today).num_days(), MAX_WINDOW_DAYS * 2);
    }
}
