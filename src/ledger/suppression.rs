use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Scoped marker telling the mutation gateway that the rollover cascade is
/// posting its own transfers.
///
/// The state is a depth counter shared with every live [`CascadeGuard`];
/// dropping a guard pops one level, so the marker is released on every exit
/// path including early returns and unwinding.
#[derive(Debug, Default)]
pub struct CascadeSuppression {
    depth: Arc<AtomicUsize>,
}

impl CascadeSuppression {
    pub fn enter(&self) -> CascadeGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        CascadeGuard {
            depth: Arc::clone(&self.depth),
        }
    }

    pub fn is_active(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

// A cloned ledger starts outside any cascade.
impl Clone for CascadeSuppression {
    fn clone(&self) -> Self {
        Self::default()
    }
}

#[must_use = "suppression ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CascadeGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for CascadeGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest_and_release() {
        let suppression = CascadeSuppression::default();
        assert!(!suppression.is_active());
        {
            let _outer = suppression.enter();
            {
                let _inner = suppression.enter();
                assert!(suppression.is_active());
            }
            assert!(suppression.is_active());
        }
        assert!(!suppression.is_active());
    }

    #[test]
    fn guard_is_released_on_early_return() {
        fn failing(suppression: &CascadeSuppression) -> Result<(), String> {
            let _guard = suppression.enter();
            Err("boom".into())
        }
        let suppression = CascadeSuppression::default();
        assert!(failing(&suppression).is_err());
        assert!(!suppression.is_active());
    }

    #[test]
    fn clones_do_not_share_state() {
        let suppression = CascadeSuppression::default();
        let _guard = suppression.enter();
        assert!(!suppression.clone().is_active());
    }
}
