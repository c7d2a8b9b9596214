// src/registry/registry.rs
use super::backend::BackendDescriptor;
use tracing::info;

/// Desired flags for one registry index, as submitted by the control plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggle {
    pub active: bool,
    pub default: bool,
}

/// Ordered, index-stable list of backends.
///
/// Entries are never added, removed or reordered after construction. At most
/// one entry is default, and whenever any entry is active exactly one active
/// entry is default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    backends: Vec<BackendDescriptor>,
}

impl Registry {
    /// Build the startup registry: every entry active, default resolved.
    pub fn new(backends: Vec<BackendDescriptor>) -> Self {
        let mut registry = Self { backends };
        for backend in &mut registry.backends {
            backend.set_active(true);
            backend.set_default_flag(false);
        }
        registry.recompute_default();
        registry
    }

    pub fn backends(&self) -> &[BackendDescriptor] {
        &self.backends
    }

    pub fn get(&self, idx: usize) -> Option<&BackendDescriptor> {
        self.backends.get(idx)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn default_index(&self) -> Option<usize> {
        self.backends.iter().position(|b| b.is_default())
    }

    /// Keep the current default if it is still active, otherwise promote the
    /// first active entry. Clears the flag everywhere else.
    pub fn recompute_default(&mut self) {
        let chosen = self
            .backends
            .iter()
            .position(|b| b.is_active() && b.is_default())
            .or_else(|| self.backends.iter().position(|b| b.is_active()));

        self.mark_default(chosen);
    }

    /// Make `idx` the default if it names an active entry; otherwise behave
    /// like [`recompute_default`](Self::recompute_default).
    pub fn set_default(&mut self, idx: usize) {
        match self.backends.get(idx) {
            Some(backend) if backend.is_active() => self.mark_default(Some(idx)),
            _ => self.recompute_default(),
        }
    }

    /// Apply a batch of desired flags keyed by index.
    ///
    /// Indices missing from `desired` are treated as `(false, false)`. Active
    /// flags are applied first (deactivation clears `default`); then the last
    /// active index that asked to be default wins, and without such a request
    /// the default is recomputed.
    pub fn apply_toggle_set(&mut self, desired: &[Toggle]) {
        let mut requested_default = None;

        for (idx, backend) in self.backends.iter_mut().enumerate() {
            let toggle = desired.get(idx).copied().unwrap_or_default();
            if toggle.active != backend.is_active() {
                if toggle.active {
                    info!("set active: {}", backend.host());
                } else {
                    info!("set inactive: {}", backend.host());
                }
            }
            backend.set_active(toggle.active);
            if toggle.active && toggle.default {
                requested_default = Some(idx);
            }
        }

        match requested_default {
            Some(idx) => self.set_default(idx),
            None => self.recompute_default(),
        }
    }

    fn mark_default(&mut self, chosen: Option<usize>) {
        for (idx, backend) in self.backends.iter_mut().enumerate() {
            let is_chosen = chosen == Some(idx);
            if is_chosen && !backend.is_default() {
                info!("set default server: {}", backend.host());
            }
            backend.set_default_flag(is_chosen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry(hosts: &[&str]) -> Registry {
        Registry::new(hosts.iter().map(|h| BackendDescriptor::new(*h)).collect())
    }

    fn toggles(pairs: &[(bool, bool)]) -> Vec<Toggle> {
        pairs
            .iter()
            .map(|&(active, default)| Toggle { active, default })
            .collect()
    }

    fn assert_invariant(r: &Registry) {
        let defaults: Vec<_> = r
            .backends()
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_default())
            .collect();
        assert!(defaults.len() <= 1, "more than one default: {:?}", r);
        if let Some((_, b)) = defaults.first() {
            assert!(b.is_active());
        }
        if r.backends().iter().any(|b| b.is_active()) {
            assert_eq!(defaults.len(), 1, "active entries but no default: {:?}", r);
        }
    }

    #[test]
    fn startup_picks_first_entry() {
        let r = registry(&["a:1", "b:1", "c:1"]);
        assert_eq!(r.default_index(), Some(0));
        assert!(r.backends().iter().all(|b| b.is_active()));
        assert_invariant(&r);
    }

    #[test]
    fn empty_registry_has_no_default() {
        let mut r = registry(&[]);
        r.recompute_default();
        assert_eq!(r.default_index(), None);
    }

    #[test]
    fn recompute_keeps_active_default() {
        let mut r = registry(&["a:1", "b:1"]);
        r.set_default(1);
        r.recompute_default();
        assert_eq!(r.default_index(), Some(1));
    }

    #[test]
    fn set_default_on_active_entry() {
        let mut r = registry(&["a:1", "b:1", "c:1"]);
        r.set_default(2);
        assert_eq!(r.default_index(), Some(2));
        assert_invariant(&r);
    }

    #[test]
    fn set_default_on_inactive_entry_recomputes() {
        let mut r = registry(&["a:1", "b:1", "c:1"]);
        r.apply_toggle_set(&toggles(&[(true, false), (true, true), (false, false)]));
        assert_eq!(r.default_index(), Some(1));

        let mut expected = r.clone();
        expected.recompute_default();
        r.set_default(2);
        assert_eq!(r, expected);
        r.set_default(99);
        assert_eq!(r, expected);
    }

    #[test]
    fn deactivating_default_moves_it() {
        let mut r = registry(&["a:1", "b:1"]);
        r.apply_toggle_set(&toggles(&[(false, true), (true, false)]));
        assert!(!r.get(0).unwrap().is_default());
        assert_eq!(r.default_index(), Some(1));
    }

    #[test]
    fn toggle_without_default_request_keeps_previous() {
        let mut r = registry(&["a:1", "b:1", "c:1"]);
        r.set_default(1);
        r.apply_toggle_set(&toggles(&[(true, false), (true, false), (false, false)]));
        assert_eq!(r.default_index(), Some(1));
    }

    #[test]
    fn last_requested_default_wins() {
        let mut r = registry(&["a:1", "b:1", "c:1"]);
        r.apply_toggle_set(&toggles(&[(true, true), (true, false), (true, true)]));
        assert_eq!(r.default_index(), Some(2));
    }

    #[test]
    fn default_request_on_inactive_entry_is_ignored() {
        let mut r = registry(&["a:1", "b:1"]);
        r.apply_toggle_set(&toggles(&[(true, false), (false, true)]));
        assert_eq!(r.default_index(), Some(0));
        assert!(!r.get(1).unwrap().is_default());
    }

    #[test]
    fn missing_indices_are_deactivated() {
        let mut r = registry(&["a:1", "b:1", "c:1"]);
        r.apply_toggle_set(&toggles(&[(false, false), (true, false)]));
        assert!(!r.get(2).unwrap().is_active());
        assert_eq!(r.default_index(), Some(1));
    }

    #[test]
    fn all_inactive_leaves_no_default() {
        let mut r = registry(&["a:1", "b:1"]);
        r.apply_toggle_set(&[]);
        assert_eq!(r.default_index(), None);
        assert_invariant(&r);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Recompute,
        SetDefault(usize),
        Apply(Vec<(bool, bool)>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Recompute),
            (0usize..8).prop_map(Op::SetDefault),
            proptest::collection::vec((any::<bool>(), any::<bool>()), 0..7).prop_map(Op::Apply),
        ]
    }

    proptest! {
        #[test]
        fn invariant_holds_for_any_sequence(
            n in 0usize..6,
            ops in proptest::collection::vec(op_strategy(), 0..20),
        ) {
            let hosts: Vec<String> = (0..n).map(|i| format!("h{}:1", i)).collect();
            let mut r = Registry::new(hosts.iter().map(BackendDescriptor::new).collect());
            assert_invariant(&r);
            for op in ops {
                match op {
                    Op::Recompute => r.recompute_default(),
                    Op::SetDefault(idx) => r.set_default(idx),
                    Op::Apply(pairs) => r.apply_toggle_set(&toggles(&pairs)),
                }
                assert_invariant(&r);

                let mut again = r.clone();
                again.recompute_default();
                prop_assert_eq!(&again, &r);
            }
        }
    }
}
