//! # Folding Control
//!
//! Constant folding evaluates an operator over constant inputs during
//! normalization. Immutable and leakproof operators always fold. Volatile
//! operators never do. Stable operators (e.g. `now()`) return the same value
//! for the whole statement but may differ between executions of a prepared
//! plan, so they fold only when the caller allows it, and the factory records
//! that such a fold happened so the resulting memo is not reused across
//! executions.

use crate::properties::Volatility;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldingControl {
    allow_stable: bool,
    encountered_stable_fold: bool,
}

impl FoldingControl {
    /// A control that disallows stable folds.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_stable_folds(&mut self) {
        self.allow_stable = true;
    }

    pub fn disallow_stable_folds(&mut self) {
        self.allow_stable = false;
    }

    /// Whether an operator of the given volatility may be folded. Records a
    /// permitted stable fold.
    pub fn can_fold_operator(&mut self, volatility: Volatility) -> bool {
        match volatility {
            Volatility::Leakproof | Volatility::Immutable => true,
            Volatility::Stable if self.allow_stable => {
                self.encountered_stable_fold = true;
                true
            }
            Volatility::Stable | Volatility::Volatile => false,
        }
    }

    /// Same test as [`can_fold_operator`](Self::can_fold_operator), without
    /// recording anything.
    pub fn allows(&self, volatility: Volatility) -> bool {
        match volatility {
            Volatility::Leakproof | Volatility::Immutable => true,
            Volatility::Stable => self.allow_stable,
            Volatility::Volatile => false,
        }
    }

    /// Whether a stable operator was folded since the control was created.
    pub fn permitted_stable_fold(&self) -> bool {
        self.encountered_stable_fold
    }

    pub(crate) fn stable_folds_allowed(&self) -> bool {
        self.allow_stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_folds_need_permission() {
        let mut fc = FoldingControl::new();
        assert!(fc.can_fold_operator(Volatility::Immutable));
        assert!(!fc.can_fold_operator(Volatility::Stable));
        assert!(!fc.permitted_stable_fold());

        fc.allow_stable_folds();
        assert!(fc.allows(Volatility::Stable));
        assert!(!fc.permitted_stable_fold());
        assert!(fc.can_fold_operator(Volatility::Stable));
        assert!(fc.permitted_stable_fold());
        assert!(!fc.can_fold_operator(Volatility::Volatile));

        fc.disallow_stable_folds();
        assert!(!fc.can_fold_operator(Volatility::Stable));
        assert!(fc.permitted_stable_fold());
    }
}
