//! JSON seed for the in-memory store: the directory of users, organizations,
//! locations and resources, role assignments, and existing bookings.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::engine::InMemoryStore;
use crate::model::*;
use crate::repository::{LocationRoleLookup, OrganizationRoleLookup, StoreError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("reading seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing seed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("applying seed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrganizationManager {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocationManager {
    pub location_id: LocationId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub users: Vec<User>,
    pub organizations: Vec<Organization>,
    pub locations: Vec<Location>,
    pub resources: Vec<Resource>,
    pub organization_managers: Vec<OrganizationManager>,
    pub location_managers: Vec<LocationManager>,
    pub bookings: Vec<Booking>,
}

impl Seed {
    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, SeedError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Load everything into `store`. Role assignments go through the store's
    /// exclusion checks; bookings are taken as recorded.
    pub async fn apply(self, store: &InMemoryStore) -> Result<(), SeedError> {
        for user in self.users {
            store.insert_user(user);
        }
        for organization in self.organizations {
            store.insert_organization(organization);
        }
        for location in self.locations {
            store.insert_location(location);
        }
        for resource in self.resources {
            store.insert_resource(resource);
        }
        for m in self.organization_managers {
            store.assign_organization_manager(m.organization_id, m.user_id).await?;
        }
        for m in self.location_managers {
            store.assign_location_manager(m.location_id, m.user_id).await?;
        }
        for booking in self.bookings {
            store.insert_booking(booking).await?;
        }
        Ok(())
    }
}
