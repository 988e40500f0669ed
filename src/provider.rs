// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The read-only zone data interface.
//!
//! Zone data lives in an external store; this server only ever reads
//! it. The [`ZoneProvider`] trait is the seam between the two: it
//! exposes the configured views, the zone names within a view, and the
//! records of a single zone. Implementations are queried per request
//! rather than cached, so that catalog serials never drift from the
//! store's actual contents.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::class::Class;
use crate::message::tsig::Key;
use crate::name::Name;
use crate::rr::{Rdata, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// VIEWS                                                              //
////////////////////////////////////////////////////////////////////////

/// A view: an authorization domain grouping a set of zones with the
/// TSIG key that may transfer them and the apex under which their
/// catalog zone is synthesized.
#[derive(Clone, Debug)]
pub struct View {
    name: String,
    key: Key,
    catalog_apex: Name,
}

impl View {
    pub fn new(name: impl Into<String>, key: Key, catalog_apex: Name) -> Self {
        Self {
            name: name.into(),
            key,
            catalog_apex,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn catalog_apex(&self) -> &Name {
        &self.catalog_apex
    }
}

////////////////////////////////////////////////////////////////////////
// RECORDS AND ZONES                                                  //
////////////////////////////////////////////////////////////////////////

/// A resource record as handed over by a provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub owner: Name,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: Box<Rdata>,
}

/// A zone: a name and its complete, ordered record set. The first
/// record must be the zone's SOA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Zone {
    pub name: Name,
    pub records: Vec<Record>,
}

impl Zone {
    /// Returns the zone's SOA record, verifying that it leads the
    /// record set.
    pub fn soa(&self) -> Option<&Record> {
        self.records
            .first()
            .filter(|record| record.rr_type == Type::SOA)
    }
}

////////////////////////////////////////////////////////////////////////
// THE PROVIDER TRAIT                                                 //
////////////////////////////////////////////////////////////////////////

/// Read-only access to the external zone store.
///
/// Every method is a point-in-time read; the store may be mutated
/// concurrently by its owner, and callers must not assume two calls
/// observe the same state.
pub trait ZoneProvider {
    /// Lists the currently configured views.
    fn views(&self) -> Result<Vec<Arc<View>>, ProviderError>;

    /// Lists the names of the zones belonging to `view`.
    fn zone_names(&self, view: &View) -> Result<Vec<Name>, ProviderError>;

    /// Fetches a zone of `view` by name, or `None` if the view has no
    /// such zone.
    fn zone(&self, view: &View, name: &Name) -> Result<Option<Zone>, ProviderError>;
}

/// An error from the underlying zone store.
#[derive(Debug)]
pub struct ProviderError(String);

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "zone store error: {}", self.0)
    }
}

impl std::error::Error for ProviderError {}

////////////////////////////////////////////////////////////////////////
// THE IN-MEMORY PROVIDER                                             //
////////////////////////////////////////////////////////////////////////

/// A [`ZoneProvider`] over in-memory data.
///
/// This backs the daemon's file-loaded zones as well as the test
/// suite. The whole data set is swapped atomically by
/// [`InMemoryProvider::replace`], so a configuration reload never
/// exposes a half-updated state.
#[derive(Default)]
pub struct InMemoryProvider {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    views: Vec<Arc<View>>,
    zones: HashMap<String, Vec<Zone>>,
}

impl InMemoryProvider {
    pub fn new(views: Vec<Arc<View>>, zones: HashMap<String, Vec<Zone>>) -> Self {
        Self {
            inner: RwLock::new(Inner { views, zones }),
        }
    }

    /// Replaces the full data set (views and zones) atomically.
    pub fn replace(&self, views: Vec<Arc<View>>, zones: HashMap<String, Vec<Zone>>) {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner { views, zones };
    }
}

impl ZoneProvider for InMemoryProvider {
    fn views(&self) -> Result<Vec<Arc<View>>, ProviderError> {
        Ok(self.inner.read().unwrap().views.clone())
    }

    fn zone_names(&self, view: &View) -> Result<Vec<Name>, ProviderError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .zones
            .get(view.name())
            .map(|zones| zones.iter().map(|zone| zone.name.clone()).collect())
            .unwrap_or_default())
    }

    fn zone(&self, view: &View, name: &Name) -> Result<Option<Zone>, ProviderError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .zones
            .get(view.name())
            .and_then(|zones| zones.iter().find(|zone| &zone.name == name))
            .cloned())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
