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

//! Construction of AXFR response streams ([RFC 5936]).
//!
//! [RFC 5936]: https://datatracker.ietf.org/doc/html/rfc5936

use std::fmt;

use crate::message::tsig::{Key, Mode, PreparedTsig};
use crate::message::{writer, Opcode, Question, Writer};
use crate::provider::{Record, Zone};

use super::{unix_time, TSIG_FUDGE};

////////////////////////////////////////////////////////////////////////
// TRANSFERS                                                          //
////////////////////////////////////////////////////////////////////////

/// An in-progress outgoing zone transfer.
///
/// A `Transfer` owns the zone's record set (bracketed by the SOA at
/// both ends) and serializes it into a sequence of response messages
/// with [`Transfer::next_message`]. Every message is signed; the MACs
/// are chained, with the second and subsequent messages signed over
/// the abbreviated "timers only" TSIG variables ([RFC 8945 § 5.4.2]).
///
/// [RFC 8945 § 5.4.2]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.4.2
pub struct Transfer {
    records: Vec<Record>,
    next_record: usize,
    question: Question,
    key: Key,
    id: u16,
    prior_mac: Vec<u8>,
    first: bool,
}

impl Transfer {
    /// Starts a transfer of `zone`. The zone's leading SOA must already
    /// have been validated by the caller; it is repeated at the end of
    /// the stream.
    pub(super) fn new(
        mut zone: Zone,
        question: Question,
        key: Key,
        id: u16,
        request_mac: Vec<u8>,
    ) -> Self {
        if let Some(soa) = zone.records.first().cloned() {
            zone.records.push(soa);
        }
        Self {
            records: zone.records,
            next_record: 0,
            question,
            key,
            id,
            prior_mac: request_mac,
            first: true,
        }
    }

    /// Serializes the next message of the transfer into `buf`,
    /// returning its length, or `None` once the stream is complete.
    pub fn next_message(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        self.next_message_at(buf, unix_time())
    }

    fn next_message_at(&mut self, buf: &mut [u8], now: u64) -> Result<Option<usize>, Error> {
        if self.next_record == self.records.len() {
            return Ok(None);
        }

        let mut writer = Writer::new(buf);
        writer.set_id(self.id);
        writer.set_qr(true);
        writer.set_opcode(Opcode::Query);
        writer.set_aa(true);
        let prepared = PreparedTsig::new(self.id, now, TSIG_FUDGE);
        writer.reserve_tsig(prepared.signed_rr_len(self.key.name(), self.key.algorithm()))?;

        // The question appears in the first message only
        // (RFC 5936 § 2.2.1).
        if self.first {
            writer.add_question(&self.question)?;
        }

        let filled_from = self.next_record;
        for record in &self.records[self.next_record..] {
            match writer.add_answer(
                &record.owner,
                record.rr_type,
                record.class,
                record.ttl,
                &record.rdata,
            ) {
                Ok(()) => self.next_record += 1,
                Err(writer::Error::Truncation) if self.next_record > filled_from => break,
                Err(e) => return Err(Error::from(e)),
            }
        }

        let mode = if self.first {
            Mode::Response {
                request_mac: &self.prior_mac,
            }
        } else {
            Mode::Subsequent {
                prior_mac: &self.prior_mac,
            }
        };
        let (len, mac) = writer.finish_with_tsig(&self.key, &prepared, mode)?;
        self.prior_mac = mac;
        self.first = false;
        Ok(Some(len))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while serializing a transfer message. This
/// means a record cannot be represented at all (e.g. it does not fit
/// even in an otherwise empty message); the connection must be aborted
/// rather than sending a short stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Error(writer::Error);

impl From<writer::Error> for Error {
    fn from(error: writer::Error) -> Self {
        Self(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "failed to serialize transfer message: {}", self.0)
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;
    use crate::class::Class;
    use crate::message::tsig::{self, Algorithm, ReadTsig};
    use crate::message::{Qclass, Qtype, Reader};
    use crate::name::Name;
    use crate::rr::{Rdata, Ttl, Type};

    const NOW: u64 = 1663798730;

    lazy_static! {
        static ref KEY: Key = Key::new(
            &"transfer-key.".parse().unwrap(),
            Algorithm::HmacSha256,
            b"secret".as_slice(),
        );
    }

    fn zone(n_extra_records: usize) -> Zone {
        let name: Name = "example.com.".parse().unwrap();
        let mut records = vec![Record {
            owner: name.clone(),
            rr_type: Type::SOA,
            class: Class::IN,
            ttl: Ttl::from(3600),
            rdata: Rdata::new_soa(&Name::root(), &Name::root(), 7, 60, 10, 1209600, 0),
        }];
        for i in 0..n_extra_records {
            records.push(Record {
                owner: name
                    .prepend_label(format!("host-{i}").as_bytes())
                    .unwrap(),
                rr_type: Type::A,
                class: Class::IN,
                ttl: Ttl::from(300),
                rdata: (i as u32).to_be_bytes().to_vec().try_into().unwrap(),
            });
        }
        Zone { name, records }
    }

    fn question() -> Question {
        Question {
            qname: "example.com.".parse().unwrap(),
            qtype: Qtype::AXFR,
            qclass: Qclass::IN,
        }
    }

    fn transfer(n_extra_records: usize) -> Transfer {
        Transfer::new(
            zone(n_extra_records),
            question(),
            KEY.clone(),
            0x1234,
            b"pretend-request-mac".to_vec(),
        )
    }

    // Drives a transfer to completion, checking each message's
    // signature along the way and returning the answer RRs in order.
    fn collect_and_verify(mut transfer: Transfer) -> (usize, Vec<(Name, Type)>) {
        let mut buf = vec![0u8; Writer::MAX_MESSAGE_SIZE];
        let mut n_messages = 0;
        let mut answers = Vec::new();
        let mut prior_mac = b"pretend-request-mac".to_vec();
        while let Some(len) = transfer.next_message_at(&mut buf, NOW).unwrap() {
            let message = &buf[..len];
            let mut reader = Reader::try_from(message).unwrap();
            assert_eq!(reader.id(), 0x1234);
            assert!(reader.qr());
            assert_eq!(reader.qdcount(), u16::from(n_messages == 0));
            assert_eq!(reader.arcount(), 1);
            if n_messages == 0 {
                reader.read_question().unwrap();
            }

            for _ in 0..reader.ancount() {
                let rr = reader.read_rr().unwrap();
                assert_ne!(rr.rr_type, Type::TSIG);
                answers.push((rr.owner, rr.rr_type));
            }
            let tsig_rr_start = reader.cursor();
            let rr = reader.read_rr().unwrap();
            assert_eq!(rr.rr_type, Type::TSIG);
            let tsig = ReadTsig::from_rr(&rr).unwrap();
            assert!(reader.at_end());

            // Recompute the MAC over the message with the TSIG RR
            // stripped and the ARCOUNT zeroed, chained off the prior
            // MAC, and compare.
            let mut unsigned = message[..tsig_rr_start].to_vec();
            unsigned[10..12].copy_from_slice(&0u16.to_be_bytes());
            let prepared = PreparedTsig::new(0x1234, tsig.time_signed, tsig.fudge);
            let mode = if n_messages == 0 {
                Mode::Response {
                    request_mac: &prior_mac,
                }
            } else {
                Mode::Subsequent {
                    prior_mac: &prior_mac,
                }
            };
            let expected = tsig::compute_mac(&unsigned, &KEY, &prepared, mode);
            assert_eq!(tsig.mac, expected);
            prior_mac = tsig.mac;
            n_messages += 1;
        }
        (n_messages, answers)
    }

    #[test]
    fn small_zone_fits_in_one_message() {
        let (n_messages, answers) = collect_and_verify(transfer(2));
        assert_eq!(n_messages, 1);
        assert_eq!(answers.len(), 4);
        assert_eq!(answers[0].1, Type::SOA);
        assert_eq!(answers[3].1, Type::SOA);
    }

    #[test]
    fn large_zone_spans_messages_with_soa_at_both_ends() {
        // 50,000 address records do not fit in one 65,535-octet
        // message, so the stream must split, with the question in the
        // first message only and the SOA leading and trailing.
        let (n_messages, answers) = collect_and_verify(transfer(50_000));
        assert!(n_messages > 1);
        assert_eq!(answers.len(), 50_002);
        assert_eq!(answers[0].1, Type::SOA);
        assert_eq!(answers[50_001].1, Type::SOA);
        assert!(answers[1..50_001].iter().all(|(_, t)| *t == Type::A));
    }

    #[test]
    fn record_order_is_preserved() {
        let (_, answers) = collect_and_verify(transfer(3));
        let expected: Vec<Name> = [
            "example.com.",
            "host-0.example.com.",
            "host-1.example.com.",
            "host-2.example.com.",
            "example.com.",
        ]
        .iter()
        .map(|name| name.parse().unwrap())
        .collect();
        let owners: Vec<Name> = answers.into_iter().map(|(owner, _)| owner).collect();
        assert_eq!(owners, expected);
    }

    #[test]
    fn oversized_records_abort_the_transfer() {
        let mut zone = zone(0);
        zone.records.push(Record {
            owner: "big.example.com.".parse().unwrap(),
            rr_type: Type::TXT,
            class: Class::IN,
            ttl: Ttl::from(0),
            rdata: vec![0u8; 65_535].try_into().unwrap(),
        });
        let mut transfer = Transfer::new(
            zone,
            question(),
            KEY.clone(),
            0x1234,
            b"pretend-request-mac".to_vec(),
        );
        // The rdata alone approaches the message limit; together with
        // the owner, the fixed RR fields, and the TSIG reservation it
        // cannot be represented.
        let mut buf = vec![0u8; Writer::MAX_MESSAGE_SIZE];
        transfer.next_message_at(&mut buf, NOW).unwrap();
        assert!(transfer.next_message_at(&mut buf, NOW).is_err());
    }
}
