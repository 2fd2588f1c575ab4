//! Client-edited organization tree, as submitted for reconciliation.
//!
//! Shapes are read leniently: only the fields the engine needs are
//! required, everything else defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identity::ClientId;

/// Key of a role in the resolved role map: `"<sector>/<role>"`.
pub fn role_key(sector: &str, role: &str) -> String {
    format!("{}/{}", sector, role)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationTree {
    pub company: CompanyInput,
    #[serde(default)]
    pub units: Vec<UnitInput>,
    #[serde(default)]
    pub collaborators: Vec<CollaboratorInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInput {
    #[serde(default)]
    pub id: Option<ClientId>,
    pub owner_id: String,
    pub name: String,
    /// Display fields (trade name, contact, address); opaque to the engine.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
    #[serde(default)]
    pub sectors: Vec<SectorInput>,
    #[serde(default)]
    pub roles: Vec<RoleInput>,
}

impl CompanyInput {
    pub fn new(owner_id: &str, name: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<ClientId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_sector(mut self, name: &str) -> Self {
        self.sectors.push(SectorInput::named(name));
        self
    }

    pub fn with_role(mut self, name: &str, sector: &str) -> Self {
        self.roles.push(RoleInput::new(name, sector));
        self
    }

    pub fn with_detail(mut self, key: &str, value: &str) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SectorRepr {
    Name(String),
    Entry {
        #[serde(default)]
        id: Option<ClientId>,
        name: String,
    },
}

/// A sector entry: a bare name, or `{id, name}` when the client tracks the
/// row (an id with a new name is a rename).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SectorRepr")]
pub struct SectorInput {
    pub id: Option<ClientId>,
    pub name: String,
}

impl SectorInput {
    pub fn named(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ClientId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Same entry with surrounding whitespace removed from the name.
    pub fn trimmed(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.trim().to_string(),
        }
    }
}

impl From<SectorRepr> for SectorInput {
    fn from(repr: SectorRepr) -> Self {
        match repr {
            SectorRepr::Name(name) => Self { id: None, name },
            SectorRepr::Entry { id, name } => Self { id, name },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInput {
    #[serde(default)]
    pub id: Option<ClientId>,
    pub name: String,
    #[serde(alias = "sectorName")]
    pub sector: String,
}

impl RoleInput {
    pub fn new(name: &str, sector: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            sector: sector.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ClientId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn key(&self) -> String {
        role_key(&self.sector, &self.name)
    }

    pub fn trimmed(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.trim().to_string(),
            sector: self.sector.trim().to_string(),
        }
    }
}

/// A role assignment on a unit, by natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub name: String,
    #[serde(alias = "sectorName")]
    pub sector: String,
}

impl RoleRef {
    pub fn key(&self) -> String {
        role_key(&self.sector, &self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitInput {
    pub id: ClientId,
    pub name: String,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
}

impl UnitInput {
    pub fn new(id: impl Into<ClientId>, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            sectors: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_sector(mut self, name: &str) -> Self {
        self.sectors.push(name.to_string());
        self
    }

    pub fn with_role(mut self, name: &str, sector: &str) -> Self {
        self.roles.push(RoleRef {
            name: name.to_string(),
            sector: sector.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorInput {
    #[serde(default)]
    pub id: Option<ClientId>,
    /// Client-side identifier of the owning unit, as used in `UnitInput::id`.
    pub unit_id: ClientId,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Personal fields (email, phone, document). Empty strings mean "not provided".
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl CollaboratorInput {
    pub fn new(id: impl Into<ClientId>, unit_id: impl Into<ClientId>, name: &str) -> Self {
        Self {
            id: Some(id.into()),
            unit_id: unit_id.into(),
            name: name.to_string(),
            sector: None,
            role: None,
            details: BTreeMap::new(),
        }
    }

    pub fn in_sector(mut self, sector: &str) -> Self {
        self.sector = Some(sector.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: &str) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// Identifier used in reports and id maps.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.key(),
            None => self.name.clone(),
        }
    }
}
