//! Who may touch what.
//!
//! [`evaluate`] decides a single-object request from three independent rules,
//! OR-combined per [`Action`]. [`OwnerScope`] restricts collection queries to
//! the caller's own rows. Neither touches storage: callers load the target first
//! and hand in what the rules need.

mod scope;

use std::collections::HashSet;

use uuid::Uuid;

use crate::{db::Principal, AppError, AppResult};

pub use scope::OwnerScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadOwn,
    /// update, partial update, delete
    Mutate,
    ReadFriendShared,
    AdminOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    IsOwner,
    IsStaffOrSuperuser,
    IsFriendOfOwner,
}

impl Action {
    pub fn rules(self) -> &'static [Rule] {
        use Rule::*;
        match self {
            Action::ReadOwn => &[IsOwner],
            Action::Mutate => &[IsOwner, IsStaffOrSuperuser],
            Action::ReadFriendShared => &[IsOwner, IsFriendOfOwner],
            Action::AdminOverride => &[IsStaffOrSuperuser],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotOwner,
    NotFriend,
    NotPrivileged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Whether a non-owner may learn that an object exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Denials read as `NotFound`.
    OwnerScoped,
    /// Denials read as `Forbidden`.
    Public,
}

/// What the rules look at on the object side.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub owner: Uuid,
    pub owner_friends: HashSet<Uuid>,
}

impl Target {
    pub fn owned_by(owner: Uuid) -> Self {
        Self { owner, owner_friends: HashSet::new() }
    }

    pub fn with_owner_friends(mut self, friends: impl IntoIterator<Item = Uuid>) -> Self {
        self.owner_friends = friends.into_iter().collect();
        self
    }
}

impl Rule {
    pub fn holds(self, principal: &Principal, target: &Target) -> bool {
        match self {
            Rule::IsOwner => target.owner == principal.id,
            Rule::IsStaffOrSuperuser => principal.is_staff || principal.is_superuser,
            Rule::IsFriendOfOwner => target.owner_friends.contains(&principal.id),
        }
    }

    fn deny_reason(self) -> DenyReason {
        match self {
            Rule::IsOwner => DenyReason::NotOwner,
            Rule::IsFriendOfOwner => DenyReason::NotFriend,
            Rule::IsStaffOrSuperuser => DenyReason::NotPrivileged,
        }
    }
}

pub fn evaluate(principal: &Principal, action: Action, target: &Target) -> Decision {
    let rules = action.rules();
    if rules.iter().any(|rule| rule.holds(principal, target)) {
        return Decision::Allow;
    }
    // the last rule is the one the caller was "closest" to needing
    let reason = rules.last().map(|rule| rule.deny_reason()).unwrap_or(DenyReason::NotPrivileged);
    Decision::Deny(reason)
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    /// Turns a denial into the status a caller is allowed to see.
    pub fn enforce(self, action: Action, visibility: Visibility) -> AppResult<()> {
        let Decision::Deny(reason) = self else {
            return Ok(());
        };
        match (action, visibility) {
            (Action::AdminOverride, _) | (_, Visibility::Public) => Err(AppError::Forbidden(reason)),
            (_, Visibility::OwnerScoped) => Err(AppError::NotFound),
        }
    }
}

/// [`evaluate`] then [`Decision::enforce`].
pub fn authorize(principal: &Principal, action: Action, target: &Target, visibility: Visibility) -> AppResult<()> {
    evaluate(principal, action, target).enforce(action, visibility)
}
