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

//! Synthesis of per-view catalog zones ([RFC 9432]).
//!
//! A view's catalog zone is never stored; it is computed from the
//! view's current zone list each time it is transferred. Member labels
//! are derived from the member names themselves, so the catalog's
//! contents depend only on the zone *set*, not on the order the
//! provider lists it in. The serial comes from the [`SerialStore`] and
//! changes exactly when the zone set's fingerprint does.
//!
//! [RFC 9432]: https://datatracker.ietf.org/doc/html/rfc9432

use std::collections::hash_map::{Entry, HashMap};
use std::fmt;

use lazy_static::lazy_static;
use sha2::{Digest, Sha256};

use crate::class::Class;
use crate::name::{self, Name};
use crate::provider::{ProviderError, Record, View, Zone, ZoneProvider};
use crate::rr::{Rdata, Ttl, Type};
use crate::serial::{self, SerialStore};
use crate::util::push_ascii_hex;

lazy_static! {
    static ref INVALID: Name = "invalid.".parse().unwrap();
    static ref VERSION_TXT: Box<Rdata> = Rdata::new_txt(&[b"2"]).unwrap();
}

/// The number of digest octets used for a member label (24 hex
/// characters). A collision within a view is treated as fatal for that
/// view rather than silently merging two members.
const LABEL_DIGEST_LEN: usize = 12;

// SOA timing fields for the synthesized catalog. The catalog is not
// meant to be resolved, only transferred, so these follow the usual
// convention for catalog zones.
const SOA_REFRESH: u32 = 60;
const SOA_RETRY: u32 = 10;
const SOA_EXPIRE: u32 = 1_209_600;
const SOA_MINIMUM: u32 = 0;

////////////////////////////////////////////////////////////////////////
// SYNTHESIS                                                          //
////////////////////////////////////////////////////////////////////////

/// Synthesizes `view`'s catalog zone from its current zone list.
///
/// This consults the provider for the member names, resolves the
/// serial through the store, and produces the full record set: the
/// apex SOA and NS, the schema-version TXT, and one PTR per member
/// under `zones.<apex>`.
pub fn synthesize<P>(provider: &P, store: &SerialStore, view: &View) -> Result<Zone, SynthesisError>
where
    P: ZoneProvider + ?Sized,
{
    let mut members: Vec<Name> = provider
        .zone_names(view)?
        .iter()
        .map(Name::to_lowercase)
        .collect();
    members.sort_by(|a, b| a.wire().cmp(b.wire()));
    members.dedup();

    let fingerprint = fingerprint(&members);
    let serial = store.resolve(view.name(), &fingerprint)?;

    let apex = view.catalog_apex();
    let zones = apex.prepend_label(b"zones")?;
    let mut records = Vec::with_capacity(members.len() + 3);
    let apex_rr = |rr_type, rdata| Record {
        owner: apex.clone(),
        rr_type,
        class: Class::IN,
        ttl: Ttl::ZERO,
        rdata,
    };
    records.push(apex_rr(
        Type::SOA,
        Rdata::new_soa(
            &INVALID,
            &INVALID,
            serial,
            SOA_REFRESH,
            SOA_RETRY,
            SOA_EXPIRE,
            SOA_MINIMUM,
        ),
    ));
    records.push(apex_rr(Type::NS, Rdata::new_ns(&INVALID)));
    records.push(Record {
        owner: apex.prepend_label(b"version")?,
        rr_type: Type::TXT,
        class: Class::IN,
        ttl: Ttl::ZERO,
        rdata: VERSION_TXT.clone(),
    });

    let mut labels: HashMap<String, Name> = HashMap::with_capacity(members.len());
    for member in members {
        let label = member_label(&member);
        match labels.entry(label) {
            Entry::Occupied(occupied) => {
                return Err(SynthesisError::Collision {
                    label: occupied.key().clone(),
                    first: occupied.get().clone(),
                    second: member,
                });
            }
            Entry::Vacant(vacant) => {
                records.push(Record {
                    owner: zones.prepend_label(vacant.key().as_bytes())?,
                    rr_type: Type::PTR,
                    class: Class::IN,
                    ttl: Ttl::ZERO,
                    rdata: Rdata::new_ptr(&member),
                });
                vacant.insert(member);
            }
        }
    }

    Ok(Zone {
        name: apex.clone(),
        records,
    })
}

/// Computes the fingerprint of a sorted, deduplicated, lowercased list
/// of member names: the SHA-256 digest (as lowercase hex) of their
/// concatenated wire forms. Wire names are self-delimiting, so the
/// concatenation is unambiguous.
fn fingerprint(members: &[Name]) -> String {
    let mut hasher = Sha256::new();
    for member in members {
        hasher.update(member.wire());
    }
    let mut fingerprint = String::with_capacity(64);
    push_ascii_hex(&hasher.finalize(), &mut fingerprint);
    fingerprint
}

/// Computes a member's label: the first [`LABEL_DIGEST_LEN`] octets of
/// the SHA-256 digest of its lowercased wire form, as lowercase hex.
fn member_label(member: &Name) -> String {
    let digest = Sha256::digest(member.wire());
    let mut label = String::with_capacity(2 * LABEL_DIGEST_LEN);
    push_ascii_hex(&digest[..LABEL_DIGEST_LEN], &mut label);
    label
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while synthesizing a catalog zone.
#[derive(Debug)]
pub enum SynthesisError {
    Provider(ProviderError),
    Serial(serial::Error),
    Collision {
        label: String,
        first: Name,
        second: Name,
    },
    BadName(name::Error),
}

impl From<ProviderError> for SynthesisError {
    fn from(error: ProviderError) -> Self {
        Self::Provider(error)
    }
}

impl From<serial::Error> for SynthesisError {
    fn from(error: serial::Error) -> Self {
        Self::Serial(error)
    }
}

impl From<name::Error> for SynthesisError {
    fn from(error: name::Error) -> Self {
        Self::BadName(error)
    }
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Provider(e) => e.fmt(f),
            Self::Serial(e) => write!(f, "failed to resolve catalog serial: {e}"),
            Self::Collision {
                label,
                first,
                second,
            } => write!(
                f,
                "member label collision: {first} and {second} both map to {label}"
            ),
            Self::BadName(e) => write!(f, "failed to construct catalog owner name: {e}"),
        }
    }
}

impl std::error::Error for SynthesisError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::message::tsig::{Algorithm, Key};
    use crate::provider::InMemoryProvider;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(test: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "zonegate-catalog-{test}-{:08x}",
                rand::random::<u32>(),
            ));
            fs::create_dir(&path).unwrap();
            Self(path)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn view() -> Arc<View> {
        let key_name: Name = "test-key.".parse().unwrap();
        let key = Key::new(&key_name, Algorithm::HmacSha256, b"secret".as_slice());
        Arc::new(View::new("test", key, "test.catz.".parse().unwrap()))
    }

    fn member_zone(name: &str) -> Zone {
        let name: Name = name.parse().unwrap();
        let soa = Record {
            owner: name.clone(),
            rr_type: Type::SOA,
            class: Class::IN,
            ttl: Ttl::from(3600),
            rdata: Rdata::new_soa(&Name::root(), &Name::root(), 1, 60, 10, 1209600, 0),
        };
        Zone {
            name,
            records: vec![soa],
        }
    }

    fn provider_with(view: &Arc<View>, members: &[&str]) -> InMemoryProvider {
        let zones = members.iter().map(|name| member_zone(name)).collect();
        InMemoryProvider::new(
            vec![view.clone()],
            [("test".to_owned(), zones)].into_iter().collect(),
        )
    }

    #[test]
    fn synthesizes_the_expected_record_set() {
        let dir = TempDir::new("records");
        let store = SerialStore::new(&dir.0);
        let view = view();
        let provider = provider_with(&view, &["example.com.", "example.net."]);

        let catalog = synthesize(&provider, &store, &view).unwrap();
        assert_eq!(catalog.name, *view.catalog_apex());
        assert_eq!(catalog.records.len(), 5);

        let soa = catalog.soa().unwrap();
        assert_eq!(soa.owner, *view.catalog_apex());
        assert_eq!(soa.ttl, Ttl::ZERO);
        assert_eq!(soa.rdata.soa_serial(), Some(1));
        assert_eq!(catalog.records[1].rr_type, Type::NS);
        assert_eq!(catalog.records[2].rr_type, Type::TXT);
        assert_eq!(catalog.records[2].owner, "version.test.catz.".parse().unwrap());
        assert_eq!(catalog.records[2].rdata.octets(), b"\x012");
        for ptr in &catalog.records[3..] {
            assert_eq!(ptr.rr_type, Type::PTR);
            assert_eq!(ptr.ttl, Ttl::ZERO);
            let labels: Vec<_> = ptr.owner.labels().collect();
            assert_eq!(labels[0].len(), 24);
            assert_eq!(labels[1], b"zones");
        }
        let ptr_targets: Vec<&[u8]> = catalog.records[3..]
            .iter()
            .map(|r| r.rdata.octets())
            .collect();
        assert!(ptr_targets.contains(&b"\x07example\x03com\x00".as_slice()));
        assert!(ptr_targets.contains(&b"\x07example\x03net\x00".as_slice()));
    }

    #[test]
    fn listing_order_and_case_do_not_matter() {
        let dir = TempDir::new("order");
        let store = SerialStore::new(&dir.0);
        let view = view();

        let forward = provider_with(&view, &["example.com.", "example.net.", "example.org."]);
        let first = synthesize(&forward, &store, &view).unwrap();

        let shuffled = provider_with(&view, &["EXAMPLE.ORG.", "example.net.", "Example.Com."]);
        let second = synthesize(&shuffled, &store, &view).unwrap();

        // Same zone set, so the same serial and identical records.
        assert_eq!(first, second);
    }

    #[test]
    fn serial_changes_only_with_the_zone_set() {
        let dir = TempDir::new("serial");
        let store = SerialStore::new(&dir.0);
        let view = view();

        let provider = provider_with(&view, &["example.com."]);
        let catalog = synthesize(&provider, &store, &view).unwrap();
        assert_eq!(catalog.soa().unwrap().rdata.soa_serial(), Some(1));

        // Re-synthesizing without changes keeps the serial.
        let catalog = synthesize(&provider, &store, &view).unwrap();
        assert_eq!(catalog.soa().unwrap().rdata.soa_serial(), Some(1));

        // Adding a member bumps it.
        let provider = provider_with(&view, &["example.com.", "example.net."]);
        let catalog = synthesize(&provider, &store, &view).unwrap();
        assert_eq!(catalog.soa().unwrap().rdata.soa_serial(), Some(2));

        // Removing it again is also a change, never a rollback.
        let provider = provider_with(&view, &["example.com."]);
        let catalog = synthesize(&provider, &store, &view).unwrap();
        assert_eq!(catalog.soa().unwrap().rdata.soa_serial(), Some(3));
    }

    #[test]
    fn member_labels_are_stable() {
        // Pinned so that labels never change across releases: a label
        // change would make downstream consumers see every member as
        // deleted and re-added.
        let member: Name = "example.com.".parse().unwrap();
        assert_eq!(member_label(&member), "902e9c464fa43fcab109d1a6");

        let upper: Name = "EXAMPLE.COM.".parse().unwrap();
        assert_eq!(member_label(&upper.to_lowercase()), member_label(&member));
    }

    #[test]
    fn duplicate_listings_collapse_to_one_member() {
        let dir = TempDir::new("dup");
        let store = SerialStore::new(&dir.0);
        let view = view();
        let provider = provider_with(&view, &["example.com.", "EXAMPLE.com."]);
        let catalog = synthesize(&provider, &store, &view).unwrap();
        assert_eq!(catalog.records.len(), 4);
    }
}
