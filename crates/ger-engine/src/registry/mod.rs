//! Entity Schema Registry
//!
//! Static description of every governed entity type: backing table,
//! declared field order, soft-delete capability and the parent/child
//! ownership relations the deletion guard walks. The registry is built once
//! at startup via [`EntityRegistry::bootstrap`], self-validated, and then
//! injected read-only into the command and query handlers.
//!
//! Unknown entity-type tokens are rejected at the boundary
//! (`EntityType::from_str`); they are never treated as wildcards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or consulting the registry.
///
/// These are configuration errors: [`EntityRegistry::bootstrap`] surfaces
/// them at process start, not on first use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown entity type: {0:?}")]
    UnknownEntityType(String),

    #[error("Entity type '{0}' is registered more than once")]
    DuplicateEntity(EntityType),

    #[error("Relation {parent} -> {child} via '{foreign_key}' is not mirrored by the child")]
    MirrorMismatch {
        parent: EntityType,
        child: EntityType,
        foreign_key: String,
    },

    #[error("Foreign key '{foreign_key}' is not a declared field of '{child}'")]
    ForeignKeyNotDeclared {
        child: EntityType,
        foreign_key: String,
    },

    #[error("Relation {parent} -> {child} counts active dependents only, but '{child}' does not soft-delete")]
    ScopeRequiresSoftDelete {
        parent: EntityType,
        child: EntityType,
    },

    #[error("Ownership graph contains a cycle through '{0}'")]
    CycleDetected(EntityType),
}

/// The closed set of governed entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Sphere,
    Institution,
    Body,
    ManagingUnit,
    Sector,
    Position,
    Bank,
    BankBranch,
    Creditor,
    DocumentCategory,
    DocumentSubcategory,
}

impl EntityType {
    /// Every governed entity type, in registry declaration order.
    pub const ALL: [EntityType; 11] = [
        Self::Sphere,
        Self::Institution,
        Self::Body,
        Self::ManagingUnit,
        Self::Sector,
        Self::Position,
        Self::Bank,
        Self::BankBranch,
        Self::Creditor,
        Self::DocumentCategory,
        Self::DocumentSubcategory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sphere => "sphere",
            Self::Institution => "institution",
            Self::Body => "body",
            Self::ManagingUnit => "managing_unit",
            Self::Sector => "sector",
            Self::Position => "position",
            Self::Bank => "bank",
            Self::BankBranch => "bank_branch",
            Self::Creditor => "creditor",
            Self::DocumentCategory => "document_category",
            Self::DocumentSubcategory => "document_subcategory",
        }
    }

    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Sphere => "spheres",
            Self::Institution => "institutions",
            Self::Body => "bodies",
            Self::ManagingUnit => "managing_units",
            Self::Sector => "sectors",
            Self::Position => "positions",
            Self::Bank => "banks",
            Self::BankBranch => "bank_branches",
            Self::Creditor => "creditors",
            Self::DocumentCategory => "document_categories",
            Self::DocumentSubcategory => "document_subcategories",
        }
    }

    /// Declared column order; drives the stable presentation order of field
    /// diffs for this entity type.
    pub fn declared_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Sphere => &["id", "name", "code", "active"],
            Self::Institution => &["id", "name", "sphere_id", "active"],
            Self::Body => &["id", "name", "institution_id", "active"],
            Self::ManagingUnit => &["id", "name", "body_id", "active"],
            Self::Sector => &["id", "name", "managing_unit_id", "active"],
            Self::Position => &["id", "title", "sector_id", "managing_unit_id", "active"],
            Self::Bank => &["id", "name", "code", "active"],
            Self::BankBranch => &["id", "name", "code", "bank_id", "active"],
            Self::Creditor => &["id", "name", "tax_code"],
            Self::DocumentCategory => &["id", "name", "active"],
            Self::DocumentSubcategory => &["id", "name", "document_category_id", "active"],
        }
    }

    /// Whether the type carries a logical-active flag. Toggling that flag is
    /// an ordinary UPDATE; only physical row removal consults the guard.
    pub fn soft_delete(&self) -> bool {
        !matches!(self, Self::Creditor)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|et| et.as_str() == s)
            .ok_or_else(|| RegistryError::UnknownEntityType(s.to_string()))
    }
}

/// Deletion policy of a child relation. Every relation in this system is
/// RESTRICT; there is no cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    Restrict,
}

/// Which dependents count when the guard evaluates a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentScope {
    /// Every dependent row blocks, soft-deleted or not.
    All,
    /// Only rows with the active flag set block.
    ActiveOnly,
}

/// An ownership edge from the owning (parent) side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildRelation {
    pub child: EntityType,
    /// Field on the child referencing the parent's identifier.
    pub foreign_key: &'static str,
    pub policy: DeletionPolicy,
    pub scope: DependentScope,
}

/// An ownership edge from the owned (child) side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentRelation {
    pub parent: EntityType,
    pub foreign_key: &'static str,
}

/// Registry entry for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub entity_type: EntityType,
    pub parents: Vec<ParentRelation>,
    pub children: Vec<ChildRelation>,
}

impl EntityDescriptor {
    pub fn table(&self) -> &'static str {
        self.entity_type.table()
    }

    pub fn declared_fields(&self) -> &'static [&'static str] {
        self.entity_type.declared_fields()
    }

    pub fn soft_delete(&self) -> bool {
        self.entity_type.soft_delete()
    }
}

/// The process-wide entity schema registry.
///
/// Immutable after construction; share it as `Arc<EntityRegistry>` rather
/// than through any mutable global.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entries: Vec<EntityDescriptor>,
}

impl EntityRegistry {
    /// Build and validate the fixed registry of this system.
    pub fn bootstrap() -> Result<Self, RegistryError> {
        Self::from_entries(builtin_entries())
    }

    /// Build a registry from explicit entries, running the startup
    /// self-check.
    pub fn from_entries(entries: Vec<EntityDescriptor>) -> Result<Self, RegistryError> {
        let registry = Self { entries };
        registry.validate()?;
        Ok(registry)
    }

    /// Descriptor lookup. Fails only on a registry that does not cover the
    /// requested type, which `bootstrap()` rules out.
    pub fn descriptor(&self, entity_type: EntityType) -> Result<&EntityDescriptor, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.entity_type == entity_type)
            .ok_or_else(|| RegistryError::UnknownEntityType(entity_type.as_str().to_string()))
    }

    /// Child relations owned by `entity_type`, in declaration order.
    pub fn relations_owned_by(
        &self,
        entity_type: EntityType,
    ) -> Result<&[ChildRelation], RegistryError> {
        Ok(&self.descriptor(entity_type)?.children)
    }

    /// Parent relations of `entity_type`, in declaration order.
    pub fn parents_of(&self, entity_type: EntityType) -> Result<&[ParentRelation], RegistryError> {
        Ok(&self.descriptor(entity_type)?.parents)
    }

    /// Startup self-check: unique registration, mirrored relation
    /// declarations, foreign keys present in the child's declared fields,
    /// active-only scope limited to soft-deleting children, acyclic
    /// ownership graph.
    fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.entity_type) {
                return Err(RegistryError::DuplicateEntity(entry.entity_type));
            }
        }

        for entry in &self.entries {
            for relation in &entry.children {
                let child = self.descriptor(relation.child)?;
                let mirrored = child.parents.iter().any(|p| {
                    p.parent == entry.entity_type && p.foreign_key == relation.foreign_key
                });
                if !mirrored {
                    return Err(RegistryError::MirrorMismatch {
                        parent: entry.entity_type,
                        child: relation.child,
                        foreign_key: relation.foreign_key.to_string(),
                    });
                }
                if !child.declared_fields().contains(&relation.foreign_key) {
                    return Err(RegistryError::ForeignKeyNotDeclared {
                        child: relation.child,
                        foreign_key: relation.foreign_key.to_string(),
                    });
                }
                if relation.scope == DependentScope::ActiveOnly && !child.soft_delete() {
                    return Err(RegistryError::ScopeRequiresSoftDelete {
                        parent: entry.entity_type,
                        child: relation.child,
                    });
                }
            }
            for parent in &entry.parents {
                let owner = self.descriptor(parent.parent)?;
                let mirrored = owner.children.iter().any(|c| {
                    c.child == entry.entity_type && c.foreign_key == parent.foreign_key
                });
                if !mirrored {
                    return Err(RegistryError::MirrorMismatch {
                        parent: parent.parent,
                        child: entry.entity_type,
                        foreign_key: parent.foreign_key.to_string(),
                    });
                }
            }
        }

        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), RegistryError> {
        let mut done: HashSet<EntityType> = HashSet::new();
        for entry in &self.entries {
            let mut path: Vec<EntityType> = Vec::new();
            self.visit(entry.entity_type, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        node: EntityType,
        path: &mut Vec<EntityType>,
        done: &mut HashSet<EntityType>,
    ) -> Result<(), RegistryError> {
        if done.contains(&node) {
            return Ok(());
        }
        if path.contains(&node) {
            return Err(RegistryError::CycleDetected(node));
        }
        path.push(node);
        for relation in &self.descriptor(node)?.children {
            self.visit(relation.child, path, done)?;
        }
        path.pop();
        done.insert(node);
        Ok(())
    }
}

/// The fixed relation table of this system: the six-level hierarchy plus the
/// bank and document-category pairs and the standalone creditor registry.
fn builtin_entries() -> Vec<EntityDescriptor> {
    use DeletionPolicy::Restrict;
    use DependentScope::{ActiveOnly, All};
    use EntityType::*;

    fn child(
        child: EntityType,
        foreign_key: &'static str,
        scope: DependentScope,
    ) -> ChildRelation {
        ChildRelation { child, foreign_key, policy: Restrict, scope }
    }

    fn parent(parent: EntityType, foreign_key: &'static str) -> ParentRelation {
        ParentRelation { parent, foreign_key }
    }

    vec![
        EntityDescriptor {
            entity_type: Sphere,
            parents: vec![],
            children: vec![child(Institution, "sphere_id", All)],
        },
        EntityDescriptor {
            entity_type: Institution,
            parents: vec![parent(Sphere, "sphere_id")],
            children: vec![child(Body, "institution_id", All)],
        },
        EntityDescriptor {
            entity_type: Body,
            parents: vec![parent(Institution, "institution_id")],
            children: vec![child(ManagingUnit, "body_id", All)],
        },
        EntityDescriptor {
            entity_type: ManagingUnit,
            parents: vec![parent(Body, "body_id")],
            children: vec![
                child(Sector, "managing_unit_id", All),
                child(Position, "managing_unit_id", All),
            ],
        },
        EntityDescriptor {
            entity_type: Sector,
            parents: vec![parent(ManagingUnit, "managing_unit_id")],
            children: vec![child(Position, "sector_id", All)],
        },
        EntityDescriptor {
            entity_type: Position,
            parents: vec![
                parent(Sector, "sector_id"),
                parent(ManagingUnit, "managing_unit_id"),
            ],
            children: vec![],
        },
        EntityDescriptor {
            entity_type: Bank,
            parents: vec![],
            children: vec![child(BankBranch, "bank_id", All)],
        },
        EntityDescriptor {
            entity_type: BankBranch,
            parents: vec![parent(Bank, "bank_id")],
            children: vec![],
        },
        EntityDescriptor {
            entity_type: Creditor,
            parents: vec![],
            children: vec![],
        },
        EntityDescriptor {
            entity_type: DocumentCategory,
            parents: vec![],
            // Deactivated subcategories do not block deleting the category.
            children: vec![child(DocumentSubcategory, "document_category_id", ActiveOnly)],
        },
        EntityDescriptor {
            entity_type: DocumentSubcategory,
            parents: vec![parent(DocumentCategory, "document_category_id")],
            children: vec![],
        },
    ]
}
