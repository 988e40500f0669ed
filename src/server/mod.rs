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

//! The query-handling core of the server.
//!
//! [`Server::handle_query`] turns one received message into an
//! [`Outcome`]: a single response, a multi-message zone transfer, or
//! nothing at all. Every query must carry a valid TSIG signature from
//! one of the configured views' keys; the key is looked up and the
//! signature verified before any zone data is consulted, so an
//! unauthenticated client learns nothing about what the server holds.

mod axfr;

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, warn};

use crate::catalog;
use crate::message::tsig::{self, Algorithm, Key, Mode, PreparedTsig, ReadTsig, VerificationError};
use crate::message::{writer, ExtendedRcode, Opcode, Qclass, Qtype, Question, Rcode, Reader, Writer};
use crate::provider::{Zone, ZoneProvider};
use crate::rr::Type;
use crate::serial::SerialStore;

pub use axfr::{Error as TransferError, Transfer};

/// The fudge value used for outgoing TSIG RRs (seconds).
pub(crate) const TSIG_FUDGE: u16 = 300;

pub(crate) fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

////////////////////////////////////////////////////////////////////////
// SERVERS                                                            //
////////////////////////////////////////////////////////////////////////

/// The transport-independent server: query parsing, authentication,
/// and response construction over a [`ZoneProvider`].
pub struct Server<P> {
    provider: P,
    serials: SerialStore,
}

/// What [`Server::handle_query`] decided to do with a received message.
pub enum Outcome {
    /// Send a single response message of the given length.
    Single(usize),
    /// Stream the messages of a zone transfer.
    Transfer(Transfer),
    /// Send nothing.
    Drop,
}

impl<P: ZoneProvider> Server<P> {
    pub fn new(provider: P, serials: SerialStore) -> Self {
        Self { provider, serials }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Handles one received message, serializing any single response
    /// into `buf`. `buf` must be able to hold a maximum-size message.
    pub fn handle_query(&self, received: &[u8], buf: &mut [u8]) -> Outcome {
        self.handle_query_at(received, buf, unix_time())
    }

    fn handle_query_at(&self, received: &[u8], buf: &mut [u8], now: u64) -> Outcome {
        let mut reader = match Reader::try_from(received) {
            Ok(reader) => reader,
            Err(_) => {
                debug!("dropping message without a full header");
                return Outcome::Drop;
            }
        };
        // Never respond to a response (RFC 1035 § 7.3).
        if reader.qr() {
            return Outcome::Drop;
        }
        let id = reader.id();
        let rd = reader.rd();

        match Opcode::try_from(reader.opcode()) {
            Ok(Opcode::Query) => (),
            opcode => {
                debug!("refusing message with opcode {:?}", reader.opcode());
                return plain_error(buf, id, rd, opcode.ok(), Rcode::NotImp, None);
            }
        }
        if reader.qdcount() != 1 {
            return plain_error(buf, id, rd, Some(Opcode::Query), Rcode::FormErr, None);
        }
        let question = match reader.read_question() {
            Ok(question) => question,
            Err(e) => {
                debug!("malformed question: {e}");
                return plain_error(buf, id, rd, Some(Opcode::Query), Rcode::FormErr, None);
            }
        };
        let formerr =
            |buf: &mut [u8]| plain_error(buf, id, rd, Some(Opcode::Query), Rcode::FormErr, Some(&question));

        for _ in 0..reader.ancount() as u32 + reader.nscount() as u32 {
            if reader.skip_rr().is_err() {
                return formerr(buf);
            }
        }

        // The TSIG RR, if any, must be the last record of the message
        // (RFC 8945 § 5.1).
        let arcount = reader.arcount();
        let mut tsig = None;
        let mut tsig_rr_start = 0;
        for i in 0..arcount {
            let start = reader.cursor();
            let rr = match reader.read_rr() {
                Ok(rr) => rr,
                Err(e) => {
                    debug!("malformed additional record: {e}");
                    return formerr(buf);
                }
            };
            if rr.rr_type == Type::TSIG {
                if i != arcount - 1 {
                    debug!("TSIG RR is not the last record");
                    return formerr(buf);
                }
                match ReadTsig::from_rr(&rr) {
                    Ok(read) => {
                        tsig = Some(read);
                        tsig_rr_start = start;
                    }
                    Err(e) => {
                        debug!("{e}");
                        return formerr(buf);
                    }
                }
            }
        }
        if !reader.at_end() {
            return formerr(buf);
        }
        let Some(tsig) = tsig else {
            warn!("refusing unsigned query for {}", question.qname);
            return plain_error(buf, id, rd, Some(Opcode::Query), Rcode::Refused, Some(&question));
        };

        // Look up the key. This happens before the zone data is
        // touched, and a failure reveals nothing but the rejection.
        let views = match self.provider.views() {
            Ok(views) => views,
            Err(e) => {
                error!("failed to list views: {e}");
                return plain_error(buf, id, rd, Some(Opcode::Query), Rcode::ServFail, Some(&question));
            }
        };
        let key_name = tsig.key_name.to_lowercase();
        let algorithm = Algorithm::from_name(&tsig.algorithm);
        let view = views.iter().find(|view| {
            *view.key().name() == key_name && Some(view.key().algorithm()) == algorithm
        });
        let Some(view) = view else {
            warn!("query signed with unknown key {} ({})", tsig.key_name, tsig.algorithm);
            return unsigned_tsig_error(buf, id, rd, &question, &tsig, ExtendedRcode::BADKEY, now);
        };
        let key = view.key().clone();

        let request_mac = match tsig::verify_request(received, tsig_rr_start, &tsig, &key, now) {
            Ok(mac) => mac,
            Err(VerificationError::MacSize) => {
                debug!("TSIG MAC size out of bounds for key {}", key.name());
                return formerr(buf);
            }
            Err(VerificationError::BadSig) => {
                warn!("bad TSIG signature with key {}", key.name());
                return unsigned_tsig_error(buf, id, rd, &question, &tsig, ExtendedRcode::BADSIG, now);
            }
            Err(VerificationError::BadTime) => {
                warn!("TSIG time outside the allowed window for key {}", key.name());
                return badtime_error(buf, id, rd, &question, &key, &tsig, now);
            }
        };

        // The client is authenticated as `view` from here on.
        let signed_error = |buf: &mut [u8], rcode| {
            signed_error(buf, id, rd, &question, &key, &request_mac, rcode, now)
        };

        if question.qclass != Qclass::IN {
            return signed_error(buf, Rcode::Refused);
        }

        let zone = if question.qname == *view.catalog_apex() {
            match catalog::synthesize(&self.provider, &self.serials, view) {
                Ok(zone) => Some(zone),
                Err(e) => {
                    error!("catalog synthesis for view {} failed: {e}", view.name());
                    return signed_error(buf, Rcode::ServFail);
                }
            }
        } else {
            match self.provider.zone(view, &question.qname) {
                Ok(zone) => zone,
                Err(e) => {
                    error!("failed to load {} for view {}: {e}", question.qname, view.name());
                    return signed_error(buf, Rcode::ServFail);
                }
            }
        };
        let Some(zone) = zone else {
            // A key authorizes exactly its own view. Asking for
            // another view's catalog is an authorization failure, not
            // merely an unknown name.
            let foreign_catalog = views
                .iter()
                .any(|other| *other.catalog_apex() == question.qname);
            let rcode = if foreign_catalog {
                warn!(
                    "view {} requested a foreign catalog zone {}",
                    view.name(),
                    question.qname,
                );
                Rcode::NotAuth
            } else {
                Rcode::Refused
            };
            return signed_error(buf, rcode);
        };
        if zone.soa().is_none() {
            error!("zone {} of view {} has no leading SOA", zone.name, view.name());
            return signed_error(buf, Rcode::ServFail);
        }

        if question.qtype == Qtype::AXFR {
            Outcome::Transfer(Transfer::new(zone, question, key, id, request_mac))
        } else if question.qtype == Qtype::SOA {
            soa_response(buf, id, rd, &question, &zone, &key, &request_mac, now)
        } else {
            debug!("refusing query type {} from view {}", question.qtype, view.name());
            signed_error(buf, Rcode::Refused)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// RESPONSE CONSTRUCTION                                              //
////////////////////////////////////////////////////////////////////////

fn response_writer<'a>(
    buf: &'a mut [u8],
    id: u16,
    rd: bool,
    opcode: Option<Opcode>,
    rcode: Rcode,
) -> Writer<'a> {
    let mut writer = Writer::new(buf);
    writer.set_id(id);
    writer.set_qr(true);
    if let Some(opcode) = opcode {
        writer.set_opcode(opcode);
    }
    writer.set_rd(rd);
    writer.set_rcode(rcode);
    writer
}

fn serialization_failed(e: writer::Error) -> Outcome {
    error!("failed to serialize response: {e}");
    Outcome::Drop
}

/// Builds an error response without any TSIG RR (for messages that are
/// malformed or carry no TSIG at all).
fn plain_error(
    buf: &mut [u8],
    id: u16,
    rd: bool,
    opcode: Option<Opcode>,
    rcode: Rcode,
    question: Option<&Question>,
) -> Outcome {
    let mut writer = response_writer(buf, id, rd, opcode, rcode);
    if let Some(question) = question {
        if let Err(e) = writer.add_question(question) {
            return serialization_failed(e);
        }
    }
    Outcome::Single(writer.finish())
}

/// Builds a NOTAUTH response with an unsigned TSIG RR carrying BADKEY
/// or BADSIG ([RFC 8945 § 5.2.1] and § 5.2.2). The key name and
/// algorithm are echoed from the request, since the server may not
/// know them.
///
/// [RFC 8945 § 5.2.1]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.2.1
fn unsigned_tsig_error(
    buf: &mut [u8],
    id: u16,
    rd: bool,
    question: &Question,
    tsig: &ReadTsig,
    error: ExtendedRcode,
    now: u64,
) -> Outcome {
    let mut writer = response_writer(buf, id, rd, Some(Opcode::Query), Rcode::NotAuth);
    let prepared = PreparedTsig::for_error(id, error, tsig.time_signed, TSIG_FUDGE, now);
    let result = writer
        .add_question(question)
        .and_then(|_| writer.finish_with_unsigned_tsig(&tsig.key_name, &tsig.algorithm, &prepared));
    match result {
        Ok(len) => Outcome::Single(len),
        Err(e) => serialization_failed(e),
    }
}

/// Builds the signed NOTAUTH/BADTIME response of [RFC 8945 § 5.2.3]:
/// the request's time is echoed in the time-signed field and the
/// server's clock travels in "other data".
///
/// [RFC 8945 § 5.2.3]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.2.3
fn badtime_error(
    buf: &mut [u8],
    id: u16,
    rd: bool,
    question: &Question,
    key: &Key,
    tsig: &ReadTsig,
    now: u64,
) -> Outcome {
    let mut writer = response_writer(buf, id, rd, Some(Opcode::Query), Rcode::NotAuth);
    let prepared =
        PreparedTsig::for_error(id, ExtendedRcode::BADTIME, tsig.time_signed, TSIG_FUDGE, now);
    let result = writer.add_question(question).and_then(|_| {
        writer.finish_with_tsig(key, &prepared, Mode::Response { request_mac: &tsig.mac })
    });
    match result {
        Ok((len, _)) => Outcome::Single(len),
        Err(e) => serialization_failed(e),
    }
}

/// Builds a signed error response for an authenticated client.
#[allow(clippy::too_many_arguments)]
fn signed_error(
    buf: &mut [u8],
    id: u16,
    rd: bool,
    question: &Question,
    key: &Key,
    request_mac: &[u8],
    rcode: Rcode,
    now: u64,
) -> Outcome {
    let mut writer = response_writer(buf, id, rd, Some(Opcode::Query), rcode);
    let prepared = PreparedTsig::new(id, now, TSIG_FUDGE);
    let result = writer.add_question(question).and_then(|_| {
        writer.finish_with_tsig(key, &prepared, Mode::Response { request_mac })
    });
    match result {
        Ok((len, _)) => Outcome::Single(len),
        Err(e) => serialization_failed(e),
    }
}

/// Builds the signed response to a SOA query: the zone's SOA record as
/// the single answer.
#[allow(clippy::too_many_arguments)]
fn soa_response(
    buf: &mut [u8],
    id: u16,
    rd: bool,
    question: &Question,
    zone: &Zone,
    key: &Key,
    request_mac: &[u8],
    now: u64,
) -> Outcome {
    let mut writer = response_writer(buf, id, rd, Some(Opcode::Query), Rcode::NoError);
    writer.set_aa(true);
    let prepared = PreparedTsig::new(id, now, TSIG_FUDGE);
    let result = (|| {
        writer.add_question(question)?;
        writer.reserve_tsig(prepared.signed_rr_len(key.name(), key.algorithm()))?;
        // Checked by the caller.
        if let Some(soa) = zone.soa() {
            writer.add_answer(&soa.owner, soa.rr_type, soa.class, soa.ttl, &soa.rdata)?;
        }
        writer.finish_with_tsig(key, &prepared, Mode::Response { request_mac })
    })();
    match result {
        Ok((len, _)) => Outcome::Single(len),
        Err(e) => serialization_failed(e),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use super::*;
    use crate::class::Class;
    use crate::name::Name;
    use crate::provider::{InMemoryProvider, ProviderError, Record, View};
    use crate::rr::{Rdata, Ttl};

    const NOW: u64 = 1663798730;
    const SECRET: &[u8] = b"topsecret";

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(test: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "zonegate-server-{test}-{:08x}",
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

    fn key(name: &str) -> Key {
        Key::new(&name.parse().unwrap(), Algorithm::HmacSha256, SECRET)
    }

    fn soa_record(name: &Name, serial: u32) -> Record {
        Record {
            owner: name.clone(),
            rr_type: Type::SOA,
            class: Class::IN,
            ttl: Ttl::from(3600),
            rdata: Rdata::new_soa(&Name::root(), &Name::root(), serial, 60, 10, 1209600, 0),
        }
    }

    fn zone(name: &str, n_extra_records: usize) -> Zone {
        let name: Name = name.parse().unwrap();
        let mut records = vec![soa_record(&name, 7)];
        for i in 0..n_extra_records {
            records.push(Record {
                owner: name.prepend_label(format!("host-{i}").as_bytes()).unwrap(),
                rr_type: Type::A,
                class: Class::IN,
                ttl: Ttl::from(300),
                rdata: (i as u32).to_be_bytes().to_vec().try_into().unwrap(),
            });
        }
        Zone { name, records }
    }

    fn server(dir: &TempDir) -> Server<InMemoryProvider> {
        let views = vec![
            Arc::new(View::new(
                "main",
                key("main-key."),
                "main.catz.".parse().unwrap(),
            )),
            Arc::new(View::new(
                "other",
                key("other-key."),
                "other.catz.".parse().unwrap(),
            )),
        ];
        let zones = HashMap::from([
            ("main".to_owned(), vec![zone("example.com.", 3)]),
            ("other".to_owned(), vec![zone("example.net.", 1)]),
        ]);
        Server::new(
            InMemoryProvider::new(views, zones),
            SerialStore::new(&dir.0),
        )
    }

    // Builds a signed query, optionally corrupting it after signing.
    fn signed_query(key: &Key, qname: &str, qtype: Qtype, time_signed: u64) -> Vec<u8> {
        let id: u16 = 0x1234;
        let mut message = Vec::new();
        message.extend_from_slice(&id.to_be_bytes());
        message.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
        let qname: Name = qname.parse().unwrap();
        message.extend_from_slice(qname.wire());
        message.extend_from_slice(&u16::from(qtype).to_be_bytes());
        message.extend_from_slice(&u16::from(Qclass::IN).to_be_bytes());

        // The request digest: the message with ARCOUNT 0, then the
        // TSIG variables.
        let mut input = message.clone();
        input.extend_from_slice(key.name().wire());
        input.extend_from_slice(b"\x00\xff\x00\x00\x00\x00");
        input.extend_from_slice(key.algorithm().name().wire());
        input.extend_from_slice(&time_signed.to_be_bytes()[2..8]);
        input.extend_from_slice(&TSIG_FUDGE.to_be_bytes());
        input.extend_from_slice(&[0, 0, 0, 0]);
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET).unwrap();
        mac.update(&input);
        let mac = mac.finalize().into_bytes().to_vec();

        message[11] = 1; // ARCOUNT
        let prepared = PreparedTsig {
            time_signed,
            fudge: TSIG_FUDGE,
            original_id: id,
            error: ExtendedRcode::NOERROR,
            other_time: None,
        };
        let rr = tsig::build_rr(key.name(), key.algorithm().name(), &prepared, &mac);
        message.extend_from_slice(&rr);
        message
    }

    struct ParsedResponse {
        rcode: u8,
        n_answers: u16,
        tsig: Option<ReadTsig>,
    }

    fn parse_response(message: &[u8]) -> ParsedResponse {
        let mut reader = Reader::try_from(message).unwrap();
        assert!(reader.qr());
        assert_eq!(reader.id(), 0x1234);
        let rcode = message[3] & 0x0f;
        for _ in 0..reader.qdcount() {
            reader.read_question().unwrap();
        }
        let mut n_answers = 0;
        let mut tsig = None;
        for _ in 0..reader.ancount() {
            reader.read_rr().unwrap();
            n_answers += 1;
        }
        for _ in 0..reader.arcount() {
            let rr = reader.read_rr().unwrap();
            if rr.rr_type == Type::TSIG {
                tsig = Some(ReadTsig::from_rr(&rr).unwrap());
            }
        }
        ParsedResponse {
            rcode,
            n_answers,
            tsig,
        }
    }

    fn handle(server: &Server<InMemoryProvider>, query: &[u8]) -> Outcome {
        let mut buf = vec![0u8; Writer::MAX_MESSAGE_SIZE];
        match server.handle_query_at(query, &mut buf, NOW) {
            Outcome::Single(len) => {
                buf.truncate(len);
                Outcome::Single(len)
            }
            other => other,
        }
    }

    fn single_response(server: &Server<InMemoryProvider>, query: &[u8]) -> ParsedResponse {
        let mut buf = vec![0u8; Writer::MAX_MESSAGE_SIZE];
        match server.handle_query_at(query, &mut buf, NOW) {
            Outcome::Single(len) => parse_response(&buf[..len]),
            Outcome::Transfer(_) => panic!("expected a single response, got a transfer"),
            Outcome::Drop => panic!("expected a single response, got a drop"),
        }
    }

    #[test]
    fn axfr_of_an_ordinary_zone_succeeds() {
        let dir = TempDir::new("axfr");
        let server = server(&dir);
        let query = signed_query(&key("main-key."), "example.com.", Qtype::AXFR, NOW);
        let mut buf = vec![0u8; Writer::MAX_MESSAGE_SIZE];
        let Outcome::Transfer(mut transfer) = server.handle_query_at(&query, &mut buf, NOW) else {
            panic!("expected a transfer");
        };
        let len = transfer.next_message(&mut buf).unwrap().unwrap();
        let response = parse_response(&buf[..len]);
        assert_eq!(response.rcode, u8::from(Rcode::NoError));
        assert_eq!(response.n_answers, 5); // SOA + 3 + SOA
        assert!(!response.tsig.unwrap().mac.is_empty());
        assert!(transfer.next_message(&mut buf).unwrap().is_none());
    }

    #[test]
    fn axfr_of_the_catalog_zone_succeeds() {
        let dir = TempDir::new("catalog");
        let server = server(&dir);
        let query = signed_query(&key("main-key."), "main.catz.", Qtype::AXFR, NOW);
        let mut buf = vec![0u8; Writer::MAX_MESSAGE_SIZE];
        let Outcome::Transfer(mut transfer) = server.handle_query_at(&query, &mut buf, NOW) else {
            panic!("expected a transfer");
        };
        let len = transfer.next_message(&mut buf).unwrap().unwrap();
        let response = parse_response(&buf[..len]);
        // SOA + NS + TXT + one PTR + trailing SOA
        assert_eq!(response.n_answers, 5);
    }

    #[test]
    fn soa_query_returns_one_answer() {
        let dir = TempDir::new("soa");
        let server = server(&dir);
        let query = signed_query(&key("main-key."), "example.com.", Qtype::SOA, NOW);
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::NoError));
        assert_eq!(response.n_answers, 1);
        assert!(!response.tsig.unwrap().mac.is_empty());
    }

    #[test]
    fn other_query_types_are_refused() {
        let dir = TempDir::new("qtype");
        let server = server(&dir);
        let query = signed_query(&key("main-key."), "example.com.", Qtype::from(1), NOW);
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::Refused));
        assert_eq!(response.n_answers, 0);
    }

    #[test]
    fn unsigned_queries_are_refused_without_tsig() {
        let dir = TempDir::new("unsigned");
        let server = server(&dir);
        let mut query = signed_query(&key("main-key."), "example.com.", Qtype::AXFR, NOW);
        // Strip the TSIG RR.
        let tsig_rr_start = 12 + 17;
        query.truncate(tsig_rr_start);
        query[11] = 0;
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::Refused));
        assert!(response.tsig.is_none());
    }

    #[test]
    fn unknown_keys_get_badkey_before_any_zone_read() {
        struct Counting {
            inner: InMemoryProvider,
            zone_reads: AtomicUsize,
        }

        impl ZoneProvider for Counting {
            fn views(&self) -> Result<Vec<Arc<View>>, ProviderError> {
                self.inner.views()
            }

            fn zone_names(&self, view: &View) -> Result<Vec<Name>, ProviderError> {
                self.zone_reads.fetch_add(1, Ordering::Relaxed);
                self.inner.zone_names(view)
            }

            fn zone(&self, view: &View, name: &Name) -> Result<Option<Zone>, ProviderError> {
                self.zone_reads.fetch_add(1, Ordering::Relaxed);
                self.inner.zone(view, name)
            }
        }

        let dir = TempDir::new("badkey");
        let views = vec![Arc::new(View::new(
            "main",
            key("main-key."),
            "main.catz.".parse().unwrap(),
        ))];
        let zones = HashMap::from([("main".to_owned(), vec![zone("example.com.", 0)])]);
        let provider = Counting {
            inner: InMemoryProvider::new(views, zones),
            zone_reads: AtomicUsize::new(0),
        };
        let server = Server::new(provider, SerialStore::new(&dir.0));

        let query = signed_query(&key("rogue-key."), "example.com.", Qtype::AXFR, NOW);
        let mut buf = vec![0u8; Writer::MAX_MESSAGE_SIZE];
        let Outcome::Single(len) = server.handle_query_at(&query, &mut buf, NOW) else {
            panic!("expected a single response");
        };
        let response = parse_response(&buf[..len]);
        assert_eq!(response.rcode, u8::from(Rcode::NotAuth));
        assert_eq!(response.n_answers, 0);
        let tsig = response.tsig.unwrap();
        assert_eq!(tsig.error, ExtendedRcode::BADKEY);
        assert!(tsig.mac.is_empty());
        assert_eq!(server.provider().zone_reads.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn altered_messages_get_badsig() {
        let dir = TempDir::new("badsig");
        let server = server(&dir);
        let mut query = signed_query(&key("main-key."), "example.com.", Qtype::AXFR, NOW);
        query[13] ^= 0x20; // flip a qname case bit after signing
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::NotAuth));
        let tsig = response.tsig.unwrap();
        assert_eq!(tsig.error, ExtendedRcode::BADSIG);
        assert!(tsig.mac.is_empty());
    }

    #[test]
    fn stale_timestamps_get_a_signed_badtime() {
        let dir = TempDir::new("badtime");
        let server = server(&dir);
        let stale = NOW - TSIG_FUDGE as u64 - 100;
        let query = signed_query(&key("main-key."), "example.com.", Qtype::AXFR, stale);
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::NotAuth));
        let tsig = response.tsig.unwrap();
        assert_eq!(tsig.error, ExtendedRcode::BADTIME);
        assert!(!tsig.mac.is_empty());
        assert_eq!(tsig.time_signed, stale);
        // The server's clock travels in "other data".
        assert_eq!(tsig.other, NOW.to_be_bytes()[2..8].to_vec());
    }

    #[test]
    fn foreign_catalogs_are_not_authorized() {
        let dir = TempDir::new("foreign");
        let server = server(&dir);
        let query = signed_query(&key("main-key."), "other.catz.", Qtype::AXFR, NOW);
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::NotAuth));
        assert_eq!(response.n_answers, 0);
    }

    #[test]
    fn zones_of_other_views_are_refused() {
        let dir = TempDir::new("crossview");
        let server = server(&dir);
        let query = signed_query(&key("main-key."), "example.net.", Qtype::AXFR, NOW);
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::Refused));
        assert_eq!(response.n_answers, 0);
    }

    #[test]
    fn unknown_zones_are_refused() {
        let dir = TempDir::new("unknown");
        let server = server(&dir);
        let query = signed_query(&key("main-key."), "nonexistent.test.", Qtype::AXFR, NOW);
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::Refused));
    }

    #[test]
    fn responses_are_dropped() {
        let dir = TempDir::new("qr");
        let server = server(&dir);
        let mut query = signed_query(&key("main-key."), "example.com.", Qtype::AXFR, NOW);
        query[2] |= 0x80; // QR
        assert!(matches!(handle(&server, &query), Outcome::Drop));
    }

    #[test]
    fn non_query_opcodes_get_notimp() {
        let dir = TempDir::new("opcode");
        let server = server(&dir);
        let mut query = signed_query(&key("main-key."), "example.com.", Qtype::AXFR, NOW);
        query[2] |= 5 << 3; // opcode UPDATE
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::NotImp));
    }

    #[test]
    fn garbage_gets_formerr() {
        let dir = TempDir::new("garbage");
        let server = server(&dir);
        let mut query = vec![0u8; 12];
        query[0..2].copy_from_slice(&0x1234u16.to_be_bytes());
        query[5] = 1; // QDCOUNT 1, but no question follows
        let response = single_response(&server, &query);
        assert_eq!(response.rcode, u8::from(Rcode::FormErr));
    }
}
