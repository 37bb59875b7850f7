//! Relation definitions between schemas.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::Ident;

/// How two schemas are related.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// The declaring schema holds the foreign key (n:1).
    BelongsTo,
    /// The target schema holds the foreign key (1:n).
    HasMany,
}

impl RelationKind {
    /// Check if the relation resolves to a list.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::HasMany)
    }

    /// Check if the relation resolves to at most one record.
    pub fn is_one(&self) -> bool {
        matches!(self, Self::BelongsTo)
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelongsTo => write!(f, "n:1"),
            Self::HasMany => write!(f, "1:n"),
        }
    }
}

/// A relation declared on a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Name the related records are attached under.
    pub name: Ident,
    /// Name of the related schema.
    pub target: SmolStr,
    /// Foreign key column. Lives on the declaring schema for
    /// [`RelationKind::BelongsTo`] and on the target for [`RelationKind::HasMany`].
    pub foreign_key: SmolStr,
    /// Relation kind.
    pub kind: RelationKind,
    /// Condition source applied to every load of this relation.
    pub default_filter: Option<SmolStr>,
}

impl Relation {
    /// Declare a belongs-to relation.
    pub fn belongs_to(
        name: impl Into<Ident>,
        target: impl Into<SmolStr>,
        foreign_key: impl Into<SmolStr>,
    ) -> Self {
        Self::new(name, target, foreign_key, RelationKind::BelongsTo)
    }

    /// Declare a has-many relation.
    pub fn has_many(
        name: impl Into<Ident>,
        target: impl Into<SmolStr>,
        foreign_key: impl Into<SmolStr>,
    ) -> Self {
        Self::new(name, target, foreign_key, RelationKind::HasMany)
    }

    fn new(
        name: impl Into<Ident>,
        target: impl Into<SmolStr>,
        foreign_key: impl Into<SmolStr>,
        kind: RelationKind,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            foreign_key: foreign_key.into(),
            kind,
            default_filter: None,
        }
    }

    /// Attach a condition (in query syntax) applied whenever the relation loads.
    pub fn with_default_filter(mut self, condition: impl Into<SmolStr>) -> Self {
        self.default_filter = Some(condition.into());
        self
    }

    /// Get the relation name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}
