use crate::core::Collection;

/// A foreign key from `collection.column` to `references.referenced_column`.
///
/// `IdSet` columns are checked element by element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub collection: Collection,
    pub column: &'static str,
    pub references: Collection,
    pub referenced_column: &'static str,
}

impl ForeignKey {
    pub const fn new(
        collection: Collection,
        column: &'static str,
        references: Collection,
        referenced_column: &'static str,
    ) -> Self {
        Self {
            collection,
            column,
            references,
            referenced_column,
        }
    }
}

/// Foreign keys of the organization schema.
pub const ORGANIZATION_FOREIGN_KEYS: &[ForeignKey] = &[
    ForeignKey::new(Collection::Roles, "sector_id", Collection::Sectors, "id"),
    ForeignKey::new(Collection::Units, "org_key", Collection::Companies, "org_key"),
    ForeignKey::new(Collection::Units, "sector_ids", Collection::Sectors, "id"),
    ForeignKey::new(Collection::Units, "role_ids", Collection::Roles, "id"),
    ForeignKey::new(Collection::Collaborators, "unit_id", Collection::Units, "id"),
    ForeignKey::new(Collection::Collaborators, "sector_id", Collection::Sectors, "id"),
    ForeignKey::new(Collection::Collaborators, "role_id", Collection::Roles, "id"),
    ForeignKey::new(Collection::Forms, "unit_id", Collection::Units, "id"),
];
