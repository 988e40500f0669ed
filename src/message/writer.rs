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

//! Writing of DNS messages.

use std::collections::HashMap;
use std::fmt;

use super::constants::*;
use super::tsig::{self, Key, Mode, PreparedTsig};
use super::{Opcode, Question, Rcode};
use crate::class::Class;
use crate::name::Name;
use crate::rr::{Rdata, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// WRITERS                                                            //
////////////////////////////////////////////////////////////////////////

/// A writer of DNS messages.
///
/// A `Writer` serializes a message into a caller-provided buffer,
/// capped at the 65,535-octet TCP message limit. The question must be
/// written before any answer records (attempting otherwise is an
/// [`Error::OutOfOrder`]). Owner names are compressed against names
/// already written, preserving their case as [RFC 5936 § 3.4]
/// recommends for zone transfers; RDATA is written verbatim.
///
/// When [`Error::Truncation`] is returned, the message is left exactly
/// as it was before the failed call, so the caller can finish this
/// message and carry the record over into the next one.
///
/// Space for a trailing TSIG RR is reserved with
/// [`Writer::reserve_tsig`] so that record filling stops early enough;
/// the RR itself is appended by [`Writer::finish_with_tsig`] or
/// [`Writer::finish_with_unsigned_tsig`].
///
/// [RFC 5936 § 3.4]: https://datatracker.ietf.org/doc/html/rfc5936#section-3.4
pub struct Writer<'a> {
    octets: &'a mut [u8],
    cursor: usize,
    limit: usize,
    reserved: usize,
    section: Section,
    qdcount: u16,
    ancount: u16,
    name_offsets: HashMap<Name, u16>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
enum Section {
    Question,
    Answer,
}

impl<'a> Writer<'a> {
    /// The hard upper bound on message size over TCP.
    pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

    /// Creates a new `Writer` with a zeroed header.
    ///
    /// # Panics
    ///
    /// Panics if `octets` cannot hold a message header.
    pub fn new(octets: &'a mut [u8]) -> Self {
        assert!(octets.len() >= HEADER_SIZE);
        let limit = octets.len().min(Self::MAX_MESSAGE_SIZE);
        octets[0..HEADER_SIZE].fill(0);
        Self {
            octets,
            cursor: HEADER_SIZE,
            limit,
            reserved: 0,
            section: Section::Question,
            qdcount: 0,
            ancount: 0,
            name_offsets: HashMap::new(),
        }
    }

    pub fn id(&self) -> u16 {
        u16::from_be_bytes(self.octets[ID_START..ID_END].try_into().unwrap())
    }

    pub fn set_id(&mut self, id: u16) {
        self.octets[ID_START..ID_END].copy_from_slice(&id.to_be_bytes());
    }

    pub fn set_qr(&mut self, qr: bool) {
        self.set_flag(QR_BYTE, QR_MASK, qr);
    }

    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.octets[OPCODE_BYTE] &= !OPCODE_MASK;
        self.octets[OPCODE_BYTE] |= u8::from(opcode) << OPCODE_SHIFT;
    }

    pub fn set_aa(&mut self, aa: bool) {
        self.set_flag(AA_BYTE, AA_MASK, aa);
    }

    pub fn set_rd(&mut self, rd: bool) {
        self.set_flag(RD_BYTE, RD_MASK, rd);
    }

    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.octets[RCODE_BYTE] &= !RCODE_MASK;
        self.octets[RCODE_BYTE] |= u8::from(rcode);
    }

    fn set_flag(&mut self, byte: usize, mask: u8, value: bool) {
        if value {
            self.octets[byte] |= mask;
        } else {
            self.octets[byte] &= !mask;
        }
    }

    /// Reserves `len` octets at the end of the message for a TSIG RR.
    pub fn reserve_tsig(&mut self, len: usize) -> Result<(), Error> {
        if self.cursor + self.reserved + len > self.limit {
            Err(Error::Truncation)
        } else {
            self.reserved += len;
            Ok(())
        }
    }

    /// Adds a question to the message.
    pub fn add_question(&mut self, question: &Question) -> Result<(), Error> {
        if self.section != Section::Question {
            return Err(Error::OutOfOrder);
        }
        let saved_cursor = self.cursor;
        let result = self.try_add_question(question);
        match result {
            Ok(pending) => {
                self.qdcount += 1;
                self.name_offsets.extend(pending);
                Ok(())
            }
            Err(e) => {
                self.cursor = saved_cursor;
                Err(e)
            }
        }
    }

    fn try_add_question(&mut self, question: &Question) -> Result<Vec<(Name, u16)>, Error> {
        let pending = self.write_name_compressed(&question.qname)?;
        self.write_octets(&u16::from(question.qtype).to_be_bytes())?;
        self.write_octets(&u16::from(question.qclass).to_be_bytes())?;
        Ok(pending)
    }

    /// Adds a record to the answer section. After the first call, no
    /// further questions may be added.
    pub fn add_answer(
        &mut self,
        owner: &Name,
        rr_type: Type,
        class: Class,
        ttl: Ttl,
        rdata: &Rdata,
    ) -> Result<(), Error> {
        self.section = Section::Answer;
        let saved_cursor = self.cursor;
        let result = self.try_add_answer(owner, rr_type, class, ttl, rdata);
        match result {
            Ok(pending) => {
                self.ancount = self.ancount.checked_add(1).ok_or(Error::CountOverflow)?;
                self.name_offsets.extend(pending);
                Ok(())
            }
            Err(e) => {
                self.cursor = saved_cursor;
                Err(e)
            }
        }
    }

    fn try_add_answer(
        &mut self,
        owner: &Name,
        rr_type: Type,
        class: Class,
        ttl: Ttl,
        rdata: &Rdata,
    ) -> Result<Vec<(Name, u16)>, Error> {
        let pending = self.write_name_compressed(owner)?;
        self.write_octets(&u16::from(rr_type).to_be_bytes())?;
        self.write_octets(&u16::from(class).to_be_bytes())?;
        self.write_octets(&u32::from(ttl).to_be_bytes())?;
        self.write_octets(&(rdata.len() as u16).to_be_bytes())?;
        self.write_octets(rdata.octets())?;
        Ok(pending)
    }

    /// Writes `name`, compressing against previously written owner
    /// names. Newly written suffixes are returned for registration on
    /// commit, so that a rolled-back record leaves no dangling
    /// compression targets.
    fn write_name_compressed(&mut self, name: &Name) -> Result<Vec<(Name, u16)>, Error> {
        let n_labels = name.n_labels();
        let mut target = None;
        for skip in 0..n_labels.saturating_sub(1) {
            if let Some(&pos) = self.name_offsets.get(&name.suffix(skip)) {
                target = Some((skip, pos));
                break;
            }
        }

        let mut pending = Vec::new();
        let n_explicit = target.map_or(n_labels - 1, |(skip, _)| skip);
        for index in 0..n_explicit {
            if self.cursor <= POINTER_MAX {
                pending.push((name.suffix(index), self.cursor as u16));
            }
            let label = name.label(index);
            self.write_octets(&[label.len() as u8])?;
            self.write_octets(label)?;
        }
        match target {
            Some((_, pos)) => self.write_octets(&(0xc000 | pos).to_be_bytes())?,
            None => self.write_octets(&[0])?,
        }
        Ok(pending)
    }

    fn write_octets(&mut self, data: &[u8]) -> Result<(), Error> {
        let end = self.cursor + data.len();
        if end > self.limit - self.reserved {
            return Err(Error::Truncation);
        }
        self.octets[self.cursor..end].copy_from_slice(data);
        self.cursor = end;
        Ok(())
    }

    fn write_counts(&mut self, arcount: u16) {
        self.octets[QDCOUNT_START..QDCOUNT_END].copy_from_slice(&self.qdcount.to_be_bytes());
        self.octets[ANCOUNT_START..ANCOUNT_END].copy_from_slice(&self.ancount.to_be_bytes());
        self.octets[NSCOUNT_START..NSCOUNT_END].copy_from_slice(&0u16.to_be_bytes());
        self.octets[ARCOUNT_START..ARCOUNT_END].copy_from_slice(&arcount.to_be_bytes());
    }

    /// Finishes the message without a TSIG RR, returning its length.
    pub fn finish(mut self) -> usize {
        self.write_counts(0);
        self.cursor
    }

    /// Finishes the message, signing it and appending the TSIG RR.
    /// Returns the message length and the MAC (for chaining into the
    /// next message of a transfer).
    pub fn finish_with_tsig(
        mut self,
        key: &Key,
        prepared: &PreparedTsig,
        mode: Mode,
    ) -> Result<(usize, Vec<u8>), Error> {
        self.write_counts(0);
        let mac = tsig::compute_mac(&self.octets[..self.cursor], key, prepared, mode);
        let rr = tsig::build_rr(key.name(), key.algorithm().name(), prepared, &mac);
        self.append_tsig_rr(&rr)?;
        Ok((self.cursor, mac))
    }

    /// Finishes the message with an unsigned TSIG RR carrying an error
    /// (BADKEY and BADSIG responses, [RFC 8945 § 5.2.1] and § 5.2.2).
    ///
    /// [RFC 8945 § 5.2.1]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.2.1
    pub fn finish_with_unsigned_tsig(
        mut self,
        key_name: &Name,
        algorithm: &Name,
        prepared: &PreparedTsig,
    ) -> Result<usize, Error> {
        self.write_counts(0);
        let rr = tsig::build_rr(key_name, algorithm, prepared, &[]);
        self.append_tsig_rr(&rr)?;
        Ok(self.cursor)
    }

    fn append_tsig_rr(&mut self, rr: &[u8]) -> Result<(), Error> {
        self.reserved = 0;
        self.write_octets(rr)?;
        self.octets[ARCOUNT_START..ARCOUNT_END].copy_from_slice(&1u16.to_be_bytes());
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while writing a DNS message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The message has run out of room.
    Truncation,
    /// Message sections must be written in order.
    OutOfOrder,
    /// A section count would overflow.
    CountOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Truncation => f.write_str("message is full"),
            Self::OutOfOrder => f.write_str("sections written out of order"),
            Self::CountOverflow => f.write_str("section count overflow"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
