use crate::action::ActionId;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Per-problem record of how many times each action was invoked.
///
/// The counts tilt action selection toward diversity: between two otherwise
/// equivalent candidates the less-used one wins. An optional shared mirror
/// lets external observers read the counts without touching the problem;
/// the core itself never locks on its own data.
#[derive(Debug, Default)]
pub struct Historical {
    counts: BTreeMap<ActionId, u32>,
    shared: Option<Arc<Mutex<BTreeMap<ActionId, u32>>>>,
}

impl Historical {
    pub fn new() -> Self {
        Default::default()
    }

    /// Installs and returns a shared read mirror of the counts.
    pub fn shared_view(&mut self) -> Arc<Mutex<BTreeMap<ActionId, u32>>> {
        let mirror = Arc::new(Mutex::new(self.counts.clone()));
        self.shared = Some(mirror.clone());
        mirror
    }

    pub fn notify_action_done(&mut self, action_id: &str) {
        *self.counts.entry(action_id.to_string()).or_insert(0) += 1;
        if let Some(mirror) = &self.shared {
            if let Ok(mut counts) = mirror.lock() {
                *counts.entry(action_id.to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn count_for(&self, action_id: &str) -> u32 {
        self.counts.get(action_id).copied().unwrap_or(0)
    }

    pub fn has_action_already_been_done(&self, action_id: &str) -> bool {
        self.count_for(action_id) > 0
    }
}

// copies made for plan simulation must not keep feeding the external mirror
impl Clone for Historical {
    fn clone(&self) -> Self {
        Historical {
            counts: self.counts.clone(),
            shared: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting() {
        let mut h = Historical::new();
        assert!(!h.has_action_already_been_done("greet"));
        h.notify_action_done("greet");
        h.notify_action_done("greet");
        assert_eq!(h.count_for("greet"), 2);
        assert!(h.has_action_already_been_done("greet"));
    }

    #[test]
    fn shared_mirror_tracks_counts_but_not_clones() {
        let mut h = Historical::new();
        let mirror = h.shared_view();
        h.notify_action_done("greet");
        assert_eq!(mirror.lock().unwrap().get("greet"), Some(&1));

        let mut copy = h.clone();
        copy.notify_action_done("greet");
        assert_eq!(copy.count_for("greet"), 2);
        // the simulation copy did not touch the mirror
        assert_eq!(mirror.lock().unwrap().get("greet"), Some(&1));
    }
}
