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

//! Implements view and zone loading.
//!
//! Zone files use a simple line-based format: one record per line,
//! `<owner> <ttl> <type> <rdata fields...>`, with `#` starting a
//! comment. The first record of a file must be the zone's SOA. This is
//! deliberately not a full RFC 1035 master-file parser; the zones this
//! server transfers are machine-generated.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, error};

use zonegate::class::Class;
use zonegate::message::tsig::Key;
use zonegate::name::Name;
use zonegate::provider::{Record, View, Zone};
use zonegate::rr::{Rdata, Ttl, Type};

use crate::config::{Config, ZoneConfig};

/// The views and zones loaded from a configuration, ready to hand to
/// an
/// [`InMemoryProvider`](zonegate::provider::InMemoryProvider).
pub struct LoadedData {
    pub views: Vec<Arc<View>>,
    pub zones: HashMap<String, Vec<Zone>>,
}

/// Loads the views and zones configured in `config`.
///
/// A bad view (e.g. an undecodable secret) is a hard error, since it
/// changes who can authenticate. A zone that fails to load is logged
/// and skipped, so one broken zone file does not take the whole
/// service down.
pub fn load(config: &Config) -> Result<LoadedData> {
    let mut views = Vec::new();
    for (view_name, view_config) in &config.views {
        let secret = BASE64
            .decode(&view_config.secret)
            .with_context(|| format!("invalid base64 secret for view {view_name:?}"))?;
        let key = Key::new(&view_config.key_name.0, view_config.algorithm.0, secret);
        let apex = view_config.catalog_apex(view_name)?;
        views.push(Arc::new(View::new(view_name.clone(), key, apex)));
    }

    let mut zones: HashMap<String, Vec<Zone>> = HashMap::new();
    let mut zones_failed = 0;
    for zone_config in &config.zones {
        debug!(
            "Loading {} (view {}) from {}.",
            zone_config.name.0,
            zone_config.view,
            zone_config.path.display(),
        );
        match load_zone(zone_config) {
            Ok(zone) => zones.entry(zone_config.view.clone()).or_default().push(zone),
            Err(e) => {
                let mut message = format!("Failed to load {}:", zone_config.name.0);
                for (i, cause) in e.chain().enumerate() {
                    write!(message, "\n[{}] {}", i + 1, cause).unwrap();
                }
                error!("{}", message);
                zones_failed += 1;
            }
        }
    }

    if zones_failed > 0 {
        if zones_failed == 1 {
            error!("1 zone failed to load.");
        } else {
            error!("{} zones failed to load.", zones_failed);
        }
    }

    Ok(LoadedData { views, zones })
}

/// Loads a single zone from its file.
fn load_zone(zone_config: &ZoneConfig) -> Result<Zone> {
    let contents = fs::read_to_string(&zone_config.path)
        .with_context(|| format!("failed to read {}", zone_config.path.display()))?;

    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let record =
            parse_record(line).with_context(|| format!("line {} is invalid", index + 1))?;
        records.push(record);
    }

    let name = zone_config.name.0.clone();
    match records.first() {
        Some(first) if first.rr_type == Type::SOA && first.owner == name => (),
        Some(_) => bail!("the first record must be the SOA of {name}"),
        None => bail!("the zone file contains no records"),
    }
    Ok(Zone { name, records })
}

/// Parses one record line: `<owner> <ttl> <type> <rdata fields...>`.
fn parse_record(line: &str) -> Result<Record> {
    let mut fields = line.split_ascii_whitespace();
    let owner: Name = fields
        .next()
        .ok_or_else(|| anyhow!("missing owner"))?
        .parse()
        .map_err(|e| anyhow!("invalid owner: {e}"))?;
    let ttl: u32 = fields
        .next()
        .ok_or_else(|| anyhow!("missing TTL"))?
        .parse()
        .context("invalid TTL")?;
    let rr_type: Type = fields
        .next()
        .ok_or_else(|| anyhow!("missing record type"))?
        .parse()
        .map_err(|e| anyhow!("invalid record type: {e}"))?;
    let rdata_fields: Vec<&str> = fields.collect();
    let rdata = parse_rdata(rr_type, &rdata_fields)?;
    Ok(Record {
        owner,
        rr_type,
        class: Class::IN,
        ttl: Ttl::from(ttl),
        rdata,
    })
}

fn parse_rdata(rr_type: Type, fields: &[&str]) -> Result<Box<Rdata>> {
    match rr_type {
        Type::SOA => {
            let &[mname, rname, serial, refresh, retry, expire, minimum] = fields else {
                bail!("SOA RDATA must have exactly seven fields");
            };
            Ok(Rdata::new_soa(
                &parse_name(mname)?,
                &parse_name(rname)?,
                parse_u32(serial, "serial")?,
                parse_u32(refresh, "refresh")?,
                parse_u32(retry, "retry")?,
                parse_u32(expire, "expire")?,
                parse_u32(minimum, "minimum")?,
            ))
        }
        Type::NS | Type::CNAME | Type::PTR => {
            let &[name] = fields else {
                bail!("{rr_type} RDATA must be a single domain name");
            };
            name_rdata(&parse_name(name)?)
        }
        Type::A => {
            let &[addr] = fields else {
                bail!("A RDATA must be a single IPv4 address");
            };
            let addr: Ipv4Addr = addr.parse().context("invalid IPv4 address")?;
            Ok(octets_rdata(&addr.octets())?)
        }
        Type::AAAA => {
            let &[addr] = fields else {
                bail!("AAAA RDATA must be a single IPv6 address");
            };
            let addr: Ipv6Addr = addr.parse().context("invalid IPv6 address")?;
            Ok(octets_rdata(&addr.octets())?)
        }
        Type::MX => {
            let &[preference, exchange] = fields else {
                bail!("MX RDATA must be a preference and an exchange");
            };
            let preference: u16 = preference.parse().context("invalid MX preference")?;
            let mut octets = preference.to_be_bytes().to_vec();
            octets.extend_from_slice(parse_name(exchange)?.wire());
            octets_rdata(&octets)
        }
        Type::SRV => {
            let &[priority, weight, port, target] = fields else {
                bail!("SRV RDATA must be a priority, weight, port, and target");
            };
            let mut octets = Vec::with_capacity(6);
            for (field, what) in [(priority, "priority"), (weight, "weight"), (port, "port")] {
                let value: u16 = field
                    .parse()
                    .with_context(|| format!("invalid SRV {what}"))?;
                octets.extend_from_slice(&value.to_be_bytes());
            }
            octets.extend_from_slice(parse_name(target)?.wire());
            octets_rdata(&octets)
        }
        Type::TXT => {
            if fields.is_empty() {
                bail!("TXT RDATA must have at least one string");
            }
            let strings: Vec<&[u8]> = fields.iter().map(|s| s.as_bytes()).collect();
            Rdata::new_txt(&strings).map_err(|e| anyhow!("invalid TXT RDATA: {e}"))
        }
        _ => bail!("unsupported record type {rr_type}"),
    }
}

fn parse_name(field: &str) -> Result<Name> {
    field
        .parse()
        .map_err(|e| anyhow!("invalid domain name {field:?}: {e}"))
}

fn parse_u32(field: &str, what: &str) -> Result<u32> {
    field
        .parse()
        .with_context(|| format!("invalid SOA {what}"))
}

fn name_rdata(name: &Name) -> Result<Box<Rdata>> {
    octets_rdata(name.wire())
}

fn octets_rdata(octets: &[u8]) -> Result<Box<Rdata>> {
    octets
        .to_vec()
        .try_into()
        .map_err(|e| anyhow!("RDATA too long: {e}"))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_record_types() {
        let soa = parse_record("example.com. 3600 SOA ns1.example.com. hostmaster.example.com. 7 60 10 1209600 0").unwrap();
        assert_eq!(soa.rr_type, Type::SOA);
        assert_eq!(soa.rdata.soa_serial(), Some(7));

        let a = parse_record("www.example.com. 300 A 192.0.2.1").unwrap();
        assert_eq!(a.rdata.octets(), &[192, 0, 2, 1]);

        let aaaa = parse_record("www.example.com. 300 AAAA 2001:db8::1").unwrap();
        assert_eq!(aaaa.rdata.len(), 16);

        let mx = parse_record("example.com. 300 MX 10 mail.example.com.").unwrap();
        assert_eq!(&mx.rdata.octets()[..2], &[0, 10]);

        let txt = parse_record("example.com. 300 TXT hello world").unwrap();
        assert_eq!(txt.rdata.octets(), b"\x05hello\x05world");
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(parse_record("example.com. 300").is_err());
        assert!(parse_record("example.com. notanumber A 192.0.2.1").is_err());
        assert!(parse_record("example.com. 300 A not-an-address").is_err());
        assert!(parse_record("relative.name 300 A 192.0.2.1").is_err());
        assert!(parse_record("example.com. 300 SOA too few fields").is_err());
    }
}
