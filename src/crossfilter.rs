use serde::Serialize;
use std::collections::BTreeSet;

/// Emitted when a region with data is clicked and crossfiltering is on.
/// `field` is the dimension's internal name, `value` the region name the data used.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CrossfilterEvent {
    pub field: String,
    pub value: String,
}

/// Current crossfilter selection. Toggling an event adds it, toggling it again clears it.
#[derive(Debug, Default)]
pub struct Crossfilter {
    selected: BTreeSet<CrossfilterEvent>,
}

impl Crossfilter {
    /// Returns whether `event` is selected afterwards.
    pub fn toggle(&mut self, event: CrossfilterEvent) -> bool {
        if self.selected.remove(&event) {
            false
        } else {
            self.selected.insert(event);
            true
        }
    }

    pub fn selected(&self) -> impl Iterator<Item = &CrossfilterEvent> {
        self.selected.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(value: &str) -> CrossfilterEvent {
        CrossfilterEvent {
            field: "users.country".to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_toggle_selects_then_clears() {
        let mut cf = Crossfilter::default();
        assert!(cf.toggle(event("France")));
        assert!(cf.selected().any(|e| e == &event("France")));
        assert!(cf.toggle(event("Chad")));
        assert_eq!(cf.selected().count(), 2);

        assert!(!cf.toggle(event("France")));
        assert_eq!(cf.selected().collect::<Vec<_>>(), vec![&event("Chad")]);
    }
}
