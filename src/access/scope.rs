use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::db::Principal;

/// Restricts a collection to rows owned by one principal.
///
/// Only constructible from a resolved [`Principal`], so an anonymous caller is
/// turned away by the extractor before any scoped query is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerScope {
    owner: Uuid,
}

impl OwnerScope {
    pub fn of(principal: &Principal) -> Self {
        Self { owner: principal.id }
    }

    pub fn contains(&self, owner_id: Uuid) -> bool {
        self.owner == owner_id
    }

    /// Appends `<owner_column> = ?` to a query that already has its `WHERE`.
    pub fn push_filter<'a>(&self, query: &mut QueryBuilder<'a, Sqlite>, owner_column: &str) {
        query.push(owner_column).push(" = ").push_bind(self.owner);
    }
}
