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

//! Reading of DNS messages.

use std::borrow::Cow;
use std::fmt;

use super::constants::*;
use super::{Qclass, Qtype, Question};
use crate::class::Class;
use crate::name::{self, Name};
use crate::rr::{Rdata, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// READERS                                                            //
////////////////////////////////////////////////////////////////////////

/// A cursor-based reader of DNS messages.
///
/// Header fields are available through accessor methods at any time;
/// questions and resource records are consumed in order with
/// [`Reader::read_question`], [`Reader::read_rr`], and
/// [`Reader::skip_rr`]. Failed reads leave the cursor where it was, so
/// a malformed record does not poison the reader for error reporting
/// purposes.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    octets: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new `Reader` positioned after the message header.
    pub fn try_from(octets: &'a [u8]) -> Result<Self, Error> {
        if octets.len() < HEADER_SIZE {
            Err(Error::HeaderTooShort)
        } else {
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
            })
        }
    }

    /// Returns the underlying message octets.
    pub fn message(&self) -> &'a [u8] {
        self.octets
    }

    /// Returns the current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn id(&self) -> u16 {
        u16::from_be_bytes(self.octets[ID_START..ID_END].try_into().unwrap())
    }

    pub fn qr(&self) -> bool {
        self.octets[QR_BYTE] & QR_MASK != 0
    }

    /// Returns the raw (unvalidated) OPCODE field.
    pub fn opcode(&self) -> u8 {
        (self.octets[OPCODE_BYTE] & OPCODE_MASK) >> OPCODE_SHIFT
    }

    pub fn rd(&self) -> bool {
        self.octets[RD_BYTE] & RD_MASK != 0
    }

    pub fn qdcount(&self) -> u16 {
        u16::from_be_bytes(self.octets[QDCOUNT_START..QDCOUNT_END].try_into().unwrap())
    }

    pub fn ancount(&self) -> u16 {
        u16::from_be_bytes(self.octets[ANCOUNT_START..ANCOUNT_END].try_into().unwrap())
    }

    pub fn nscount(&self) -> u16 {
        u16::from_be_bytes(self.octets[NSCOUNT_START..NSCOUNT_END].try_into().unwrap())
    }

    pub fn arcount(&self) -> u16 {
        u16::from_be_bytes(self.octets[ARCOUNT_START..ARCOUNT_END].try_into().unwrap())
    }

    /// Reads a question from the current position.
    pub fn read_question(&mut self) -> Result<Question, Error> {
        let (qname, name_len) = name::wire::parse_compressed(self.octets, self.cursor)?;
        let fixed_start = self.cursor + name_len;
        let fixed = self
            .octets
            .get(fixed_start..fixed_start + 4)
            .ok_or(Error::UnexpectedEom)?;
        let question = Question {
            qname,
            qtype: Qtype::from(u16::from_be_bytes(fixed[0..2].try_into().unwrap())),
            qclass: Qclass::from(u16::from_be_bytes(fixed[2..4].try_into().unwrap())),
        };
        self.cursor = fixed_start + 4;
        Ok(question)
    }

    /// Reads a resource record from the current position.
    pub fn read_rr(&mut self) -> Result<ReadRr<'a>, Error> {
        let (owner, name_len) = name::wire::parse_compressed(self.octets, self.cursor)?;
        let fixed_start = self.cursor + name_len;
        let fixed = self
            .octets
            .get(fixed_start..fixed_start + 10)
            .ok_or(Error::UnexpectedEom)?;
        let rdlength = u16::from_be_bytes(fixed[8..10].try_into().unwrap()) as usize;
        let rdata_start = fixed_start + 10;
        let rdata_octets = self
            .octets
            .get(rdata_start..rdata_start + rdlength)
            .ok_or(Error::UnexpectedEom)?;
        let rr = ReadRr {
            owner,
            rr_type: Type::from(u16::from_be_bytes(fixed[0..2].try_into().unwrap())),
            class: Class::from(u16::from_be_bytes(fixed[2..4].try_into().unwrap())),
            ttl: Ttl::from(u32::from_be_bytes(fixed[4..8].try_into().unwrap())),
            rdata: Cow::Borrowed(rdata_octets.try_into().unwrap()),
        };
        self.cursor = rdata_start + rdlength;
        Ok(rr)
    }

    /// Advances past a resource record without constructing its owner
    /// or RDATA.
    pub fn skip_rr(&mut self) -> Result<(), Error> {
        let name_len = name::wire::skip_name(self.octets, self.cursor)?;
        let fixed_start = self.cursor + name_len;
        let fixed = self
            .octets
            .get(fixed_start..fixed_start + 10)
            .ok_or(Error::UnexpectedEom)?;
        let rdlength = u16::from_be_bytes(fixed[8..10].try_into().unwrap()) as usize;
        let end = fixed_start + 10 + rdlength;
        if end > self.octets.len() {
            return Err(Error::UnexpectedEom);
        }
        self.cursor = end;
        Ok(())
    }

    /// Returns whether the cursor has reached the end of the message.
    pub fn at_end(&self) -> bool {
        self.cursor >= self.octets.len()
    }
}

////////////////////////////////////////////////////////////////////////
// READ RESOURCE RECORDS                                              //
////////////////////////////////////////////////////////////////////////

/// A resource record as returned by [`Reader::read_rr`].
///
/// The RDATA is borrowed from the underlying message and is *not*
/// decompressed; record types whose RDATA may contain compressed names
/// must not be consumed from this structure without further processing.
/// (TSIG RDATA, the only RDATA this server reads, never contains
/// compressed names per [RFC 8945 § 4.2].)
///
/// [RFC 8945 § 4.2]: https://datatracker.ietf.org/doc/html/rfc8945#section-4.2
#[derive(Clone, Debug)]
pub struct ReadRr<'a> {
    pub owner: Name,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: Cow<'a, Rdata>,
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while reading a DNS message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    HeaderTooShort,
    UnexpectedEom,
    InvalidName(name::Error),
}

impl From<name::Error> for Error {
    fn from(error: name::Error) -> Self {
        Self::InvalidName(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HeaderTooShort => f.write_str("message does not contain a full header"),
            Self::UnexpectedEom => f.write_str("message ends mid-field"),
            Self::InvalidName(e) => write!(f, "invalid name: {e}"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    // An AXFR query for example.com. with no additional records,
    // serialized by hand.
    const AXFR_QUERY: &[u8] = b"\x13\x37\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\
                                \x07example\x03com\x00\x00\xfc\x00\x01";

    #[test]
    fn reads_header_fields() {
        let reader = Reader::try_from(AXFR_QUERY).unwrap();
        assert_eq!(reader.id(), 0x1337);
        assert!(!reader.qr());
        assert_eq!(reader.opcode(), 0);
        assert_eq!(reader.qdcount(), 1);
        assert_eq!(reader.arcount(), 0);
    }

    #[test]
    fn reads_the_question() {
        let mut reader = Reader::try_from(AXFR_QUERY).unwrap();
        let question = reader.read_question().unwrap();
        assert_eq!(question.qname, "example.com.".parse().unwrap());
        assert_eq!(question.qtype, Qtype::AXFR);
        assert_eq!(question.qclass, Qclass::IN);
        assert!(reader.at_end());
    }

    #[test]
    fn rejects_short_headers() {
        assert_eq!(
            Reader::try_from(&AXFR_QUERY[..11]).unwrap_err(),
            Error::HeaderTooShort,
        );
    }

    #[test]
    fn truncated_question_leaves_cursor_unmoved() {
        let mut reader = Reader::try_from(&AXFR_QUERY[..AXFR_QUERY.len() - 2]).unwrap();
        let cursor = reader.cursor();
        assert!(reader.read_question().is_err());
        assert_eq!(reader.cursor(), cursor);
    }

    #[test]
    fn reads_and_skips_rrs() {
        // A response-like message with one answer RR: example.com. 300
        // IN A 192.0.2.1, with the owner compressed against the
        // question.
        let message = b"\x00\x01\x80\x00\x00\x01\x00\x01\x00\x00\x00\x00\
                        \x07example\x03com\x00\x00\x01\x00\x01\
                        \xc0\x0c\x00\x01\x00\x01\x00\x00\x01\x2c\x00\x04\xc0\x00\x02\x01";
        let mut reader = Reader::try_from(message).unwrap();
        reader.read_question().unwrap();

        let mut skipping = reader.clone();
        skipping.skip_rr().unwrap();
        assert!(skipping.at_end());

        let rr = reader.read_rr().unwrap();
        assert_eq!(rr.owner, "example.com.".parse().unwrap());
        assert_eq!(rr.rr_type, Type::A);
        assert_eq!(rr.class, Class::IN);
        assert_eq!(u32::from(rr.ttl), 300);
        assert_eq!(rr.rdata.octets(), b"\xc0\x00\x02\x01");
        assert!(reader.at_end());
    }
}
