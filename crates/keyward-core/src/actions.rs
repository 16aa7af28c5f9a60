//! Capability bits.
//!
//! An [`Actions`] value is a bitmask over the closed set of [`Action`]s.
//! Member rows carry one, resolution unions them, and a [`Predicate`]
//! decides whether the union is sufficient.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Action {
    /// Read metadata and content.
    View = 1 << 0,
    /// Create new versions of a live resource.
    Edit = 1 << 1,
    /// Soft-delete a resource.
    Delete = 1 << 2,
    /// Bring a soft-deleted resource back, and read old versions.
    Restore = 1 << 3,
    /// Privileged access to history and administrative reads.
    Sudo = 1 << 4,
    /// Add and remove policy members.
    Share = 1 << 5,
    /// Read audit-sensitive listings.
    Audit = 1 << 6,
}

impl Action {
    /// Every action, in bit order.
    pub const ALL: [Action; 7] = [
        Action::View,
        Action::Edit,
        Action::Delete,
        Action::Restore,
        Action::Sudo,
        Action::Share,
        Action::Audit,
    ];

    /// The bit this action occupies.
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Lowercase name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Restore => "restore",
            Action::Sudo => "sudo",
            Action::Share => "share",
            Action::Audit => "audit",
        }
    }
}

/// A set of actions represented as a bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Actions(u32);

impl Actions {
    /// No actions.
    pub const NONE: Actions = Actions(0);

    const MASK: u32 = (1 << Action::ALL.len()) - 1;

    /// Every defined action.
    pub const fn all() -> Self {
        Actions(Self::MASK)
    }

    /// Build a set from a list of actions.
    pub fn of(actions: &[Action]) -> Self {
        let mut set = Self::NONE;
        for &action in actions {
            set.enable(action);
        }
        set
    }

    /// Create from raw bits. Undefined bits are dropped.
    pub const fn from_bits(bits: u32) -> Self {
        Actions(bits & Self::MASK)
    }

    /// Get the raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Turn on a single action.
    pub fn enable(&mut self, action: Action) -> &mut Self {
        self.0 |= action.bit();
        self
    }

    /// Union another set into this one.
    pub fn enable_all(&mut self, other: Actions) -> &mut Self {
        self.0 |= other.0;
        self
    }

    /// Turn off a single action.
    pub fn disable(&mut self, action: Action) -> &mut Self {
        self.0 &= !action.bit();
        self
    }

    /// Union, by value.
    pub const fn union(self, other: Actions) -> Actions {
        Actions(self.0 | other.0)
    }

    /// Check whether a single action is set.
    pub const fn contains(&self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    /// Every bit of `required` is present.
    pub const fn has_all(&self, required: Actions) -> bool {
        self.0 & required.0 == required.0
    }

    /// At least one bit of `candidates` is present.
    pub const fn has_any(&self, candidates: Actions) -> bool {
        self.0 & candidates.0 != 0
    }

    /// At least one bit at all.
    pub const fn is_any(&self) -> bool {
        self.0 != 0
    }

    /// Enumerate the set bits as actions.
    pub fn flatten(&self) -> Vec<Action> {
        Action::ALL
            .iter()
            .copied()
            .filter(|a| self.contains(*a))
            .collect()
    }
}

impl From<Action> for Actions {
    fn from(action: Action) -> Self {
        Actions(action.bit())
    }
}

impl FromIterator<Action> for Actions {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut set = Actions::NONE;
        for action in iter {
            set.enable(action);
        }
        set
    }
}

impl std::ops::BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Actions) -> Actions {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for Actions {
    fn bitor_assign(&mut self, rhs: Actions) {
        self.enable_all(rhs);
    }
}

impl fmt::Debug for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.flatten().into_iter().map(Action::name).collect();
        write!(f, "Actions[{}]", names.join("|"))
    }
}

/// An authorization requirement evaluated against a resolved [`Actions`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// Every listed action is required.
    Has(Actions),
    /// At least one of the listed actions is required.
    HasAny(Actions),
    /// Any action at all.
    Any,
}

impl Predicate {
    /// Require a single action.
    pub fn has(action: Action) -> Self {
        Predicate::Has(action.into())
    }

    /// Require at least one of the given actions.
    pub fn has_any(actions: &[Action]) -> Self {
        Predicate::HasAny(Actions::of(actions))
    }

    /// Evaluate against a resolved set.
    pub fn allows(&self, held: Actions) -> bool {
        match self {
            Predicate::Has(required) => held.has_all(*required),
            Predicate::HasAny(candidates) => held.has_any(*candidates),
            Predicate::Any => held.is_any(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_and_flatten() {
        let mut set = Actions::NONE;
        set.enable(Action::Edit).enable(Action::View);
        assert_eq!(set.flatten(), vec![Action::View, Action::Edit]);
    }

    #[test]
    fn test_enable_all_is_union() {
        let mut a = Actions::of(&[Action::View]);
        a.enable_all(Actions::of(&[Action::Delete, Action::View]));
        assert_eq!(a, Actions::of(&[Action::View, Action::Delete]));
    }

    #[test]
    fn test_from_bits_drops_unknown() {
        let set = Actions::from_bits(u32::MAX);
        assert_eq!(set, Actions::all());
        assert_eq!(set.flatten().len(), Action::ALL.len());
    }

    #[test]
    fn test_predicates() {
        let held = Actions::of(&[Action::View, Action::Edit]);

        assert!(Predicate::has(Action::View).allows(held));
        assert!(!Predicate::Has(Actions::of(&[Action::View, Action::Sudo])).allows(held));
        assert!(Predicate::has_any(&[Action::Sudo, Action::Edit]).allows(held));
        assert!(!Predicate::has_any(&[Action::Sudo, Action::Restore]).allows(held));
        assert!(Predicate::Any.allows(held));
        assert!(!Predicate::Any.allows(Actions::NONE));
    }

    #[test]
    fn test_has_empty_requirement_is_vacuous() {
        assert!(Predicate::Has(Actions::NONE).allows(Actions::NONE));
        assert!(!Predicate::HasAny(Actions::NONE).allows(Actions::all()));
    }

    #[test]
    fn test_debug_lists_names() {
        let set = Actions::of(&[Action::Share, Action::View]);
        assert_eq!(format!("{:?}", set), "Actions[view|share]");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn union_never_loses_bits(a in any::<u32>(), b in any::<u32>()) {
                let (a, b) = (Actions::from_bits(a), Actions::from_bits(b));
                let joined = a | b;
                prop_assert!(joined.has_all(a));
                prop_assert!(joined.has_all(b));
            }

            #[test]
            fn predicates_are_monotone(held in any::<u32>(), extra in any::<u32>(), req in any::<u32>()) {
                let held = Actions::from_bits(held);
                let wider = held | Actions::from_bits(extra);
                for pred in [Predicate::Has(Actions::from_bits(req)), Predicate::HasAny(Actions::from_bits(req)), Predicate::Any] {
                    if pred.allows(held) {
                        prop_assert!(pred.allows(wider));
                    }
                }
            }
        }
    }
}
