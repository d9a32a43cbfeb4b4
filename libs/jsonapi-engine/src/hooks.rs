//! Profile hooks (RFC 6906 profiles plugged into the pipeline).
//!
//! A profile is a URI-named set of callbacks invoked at well-defined
//! phases. Hooks mutate their phase argument in place; an error from a
//! hook becomes the request's outcome. Profiles run in registration order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use jsonapi_core::{ChangeSet, Criteria, Links, PageSpec, RelationshipObject};
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::error::Error;
use crate::negotiation::ProfileContext;

pub struct QueryPhase<'a> {
    pub type_name: &'a str,
    pub criteria: &'a mut Criteria,
}

pub struct FindCollectionPhase<'a> {
    pub type_name: &'a str,
    pub criteria: &'a mut Criteria,
}

pub struct FindOnePhase<'a> {
    pub type_name: &'a str,
    pub id: &'a str,
    pub criteria: &'a mut Criteria,
}

pub struct WritePhase<'a> {
    pub type_name: &'a str,
    /// Target id; absent on create.
    pub id: Option<&'a str>,
    pub change_set: &'a mut ChangeSet,
}

pub struct DeletePhase<'a> {
    pub type_name: &'a str,
    pub id: &'a str,
}

pub struct RelationshipsPhase<'a> {
    pub type_name: &'a str,
    pub id: &'a str,
    pub relationships: &'a mut BTreeMap<String, RelationshipObject>,
}

pub struct LinksPhase<'a> {
    pub links: &'a mut Links,
}

pub struct MetaPhase<'a> {
    pub meta: &'a mut Map<String, Value>,
}

pub struct RelationshipReadPhase<'a> {
    pub type_name: &'a str,
    pub id: &'a str,
    pub relationship: &'a str,
    pub page: &'a mut PageSpec,
}

/// One registered profile. Default implementations are no-ops; a profile
/// overrides the phases it cares about.
pub trait Profile: Send + Sync {
    /// The profile URI clients name in the media-type `profile` parameter.
    fn uri(&self) -> &str;

    fn on_parse_query(&self, phase: &mut QueryPhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_before_find_collection(&self, phase: &mut FindCollectionPhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_before_find_one(&self, phase: &mut FindOnePhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_before_create(&self, phase: &mut WritePhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_before_update(&self, phase: &mut WritePhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_before_delete(&self, phase: &mut DeletePhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_resource_relationships(&self, phase: &mut RelationshipsPhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_top_level_links(&self, phase: &mut LinksPhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_top_level_meta(&self, phase: &mut MetaPhase<'_>) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }

    fn on_before_relationship_read(
        &self,
        phase: &mut RelationshipReadPhase<'_>,
    ) -> Result<(), Error> {
        let _ = phase;
        Ok(())
    }
}

/// All registered profiles, in registration order.
pub struct HookDispatcher {
    profiles: Vec<Arc<dyn Profile>>,
}

impl HookDispatcher {
    pub fn new(profiles: Vec<Arc<dyn Profile>>) -> Self {
        Self { profiles }
    }

    pub fn known_uris(&self) -> BTreeSet<String> {
        self.profiles.iter().map(|p| p.uri().to_string()).collect()
    }

    /// Resolves the profiles active for this request: enabled by default,
    /// enabled for the current type, or requested via the media type.
    pub fn active(
        &self,
        config: &EngineConfig,
        type_name: &str,
        requested: &ProfileContext,
    ) -> ActiveProfiles {
        let per_type = config.profiles.per_type.get(type_name);
        let selected = self
            .profiles
            .iter()
            .filter(|p| {
                let uri = p.uri();
                config.profiles.enabled_by_default.iter().any(|u| u == uri)
                    || per_type.is_some_and(|uris| uris.iter().any(|u| u == uri))
                    || requested.is_active(uri)
            })
            .cloned()
            .collect();
        ActiveProfiles { profiles: selected }
    }
}

/// The profiles active for one request, invoked in registration order.
pub struct ActiveProfiles {
    profiles: Vec<Arc<dyn Profile>>,
}

impl ActiveProfiles {
    pub fn none() -> Self {
        Self {
            profiles: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Runs `f` for each active profile, stopping at the first error.
    pub fn each(
        &self,
        mut f: impl FnMut(&dyn Profile) -> Result<(), Error>,
    ) -> Result<(), Error> {
        for profile in &self.profiles {
            f(profile.as_ref())?;
        }
        Ok(())
    }
}
