//! Bridge between the protocol and configuration semantics

use crate::error::NomadResult;

/// Outcome of evaluating a change against a configuration
#[derive(Clone, Debug, PartialEq)]
pub enum PotentialApplicationResult<T> {
    /// The change is acceptable and yields this configuration
    Allow(T),
    /// The change is refused for this reason
    Reject(String),
}

impl<T> PotentialApplicationResult<T> {
    /// Whether the change is acceptable
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Computes and applies configuration changes for a node.
///
/// `try_apply` is called at prepare time and must not have side effects: the
/// resulting configuration is only staged. `apply` is called once the change
/// is committed, to push it into the running system.
pub trait ChangeApplicator<C, T>: Send + Sync + 'static {
    /// Evaluate `change` against the committed configuration (`None` before
    /// the first commit)
    fn try_apply(&self, existing: Option<&T>, change: &C) -> PotentialApplicationResult<T>;

    /// Apply a committed change to the running system
    fn apply(&self, _change: &C) -> NomadResult<()> {
        Ok(())
    }
}
