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

//! The [`Rdata`] type for DNS resource record data.

use std::borrow::Borrow;
use std::fmt;

use crate::name::Name;

////////////////////////////////////////////////////////////////////////
// RDATA                                                              //
////////////////////////////////////////////////////////////////////////

/// The data of a DNS resource record.
///
/// This is an unsized wrapper over `[u8]` whose invariant is that the
/// underlying data is short enough to fit into the 16-bit RDLENGTH
/// field. The content is otherwise opaque to this crate: records
/// obtained from the data provider are served verbatim, and the few
/// record types the catalog synthesizer emits are produced by the
/// constructors below.
#[derive(Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Rdata {
    octets: [u8],
}

impl Rdata {
    /// The maximum length of RDATA, limited by the 16-bit RDLENGTH
    /// field.
    pub const MAX_LEN: usize = u16::MAX as usize;

    fn from_unchecked(octets: &[u8]) -> &Self {
        // SAFETY: Rdata is a transparent wrapper over [u8].
        unsafe { &*(octets as *const [u8] as *const Self) }
    }

    fn from_boxed_unchecked(octets: Box<[u8]>) -> Box<Self> {
        // SAFETY: Rdata is a transparent wrapper over [u8].
        unsafe { Box::from_raw(Box::into_raw(octets) as *mut Self) }
    }

    /// Returns the underlying octets.
    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    /// Returns the length of the RDATA.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns whether the RDATA is empty.
    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }
}

impl<'a> TryFrom<&'a [u8]> for &'a Rdata {
    type Error = RdataTooLongError;

    fn try_from(octets: &'a [u8]) -> Result<Self, Self::Error> {
        if octets.len() > Rdata::MAX_LEN {
            Err(RdataTooLongError)
        } else {
            Ok(Rdata::from_unchecked(octets))
        }
    }
}

impl TryFrom<Vec<u8>> for Box<Rdata> {
    type Error = RdataTooLongError;

    fn try_from(octets: Vec<u8>) -> Result<Self, Self::Error> {
        if octets.len() > Rdata::MAX_LEN {
            Err(RdataTooLongError)
        } else {
            Ok(Rdata::from_boxed_unchecked(octets.into_boxed_slice()))
        }
    }
}

impl ToOwned for Rdata {
    type Owned = Box<Rdata>;

    fn to_owned(&self) -> Self::Owned {
        Rdata::from_boxed_unchecked(self.octets.to_vec().into_boxed_slice())
    }
}

impl Clone for Box<Rdata> {
    fn clone(&self) -> Self {
        let rdata: &Rdata = self.borrow();
        rdata.to_owned()
    }
}

impl fmt::Debug for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Rdata({} octets)", self.octets.len())
    }
}

////////////////////////////////////////////////////////////////////////
// CONSTRUCTORS FOR SYNTHESIZED RECORDS                               //
////////////////////////////////////////////////////////////////////////

impl Rdata {
    /// Serializes SOA RDATA ([RFC 1035 § 3.3.13]). Embedded names are
    /// written uncompressed.
    ///
    /// [RFC 1035 § 3.3.13]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3.13
    #[allow(clippy::too_many_arguments)]
    pub fn new_soa(
        mname: &Name,
        rname: &Name,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    ) -> Box<Rdata> {
        let mut octets = Vec::with_capacity(mname.wire_len() + rname.wire_len() + 20);
        octets.extend_from_slice(mname.wire());
        octets.extend_from_slice(rname.wire());
        for field in [serial, refresh, retry, expire, minimum] {
            octets.extend_from_slice(&field.to_be_bytes());
        }
        Self::from_boxed_unchecked(octets.into_boxed_slice())
    }

    /// Serializes NS RDATA: a single uncompressed name.
    pub fn new_ns(nsdname: &Name) -> Box<Rdata> {
        Self::from_boxed_unchecked(nsdname.wire().to_vec().into_boxed_slice())
    }

    /// Serializes PTR RDATA: a single uncompressed name.
    pub fn new_ptr(ptrdname: &Name) -> Box<Rdata> {
        Self::from_boxed_unchecked(ptrdname.wire().to_vec().into_boxed_slice())
    }

    /// Serializes TXT RDATA from the provided character-strings. Each
    /// string must be at most 255 octets and at least one must be
    /// given.
    pub fn new_txt(strings: &[&[u8]]) -> Result<Box<Rdata>, InvalidTxtError> {
        if strings.is_empty() {
            return Err(InvalidTxtError);
        }
        let mut octets = Vec::new();
        for string in strings {
            if string.len() > 255 {
                return Err(InvalidTxtError);
            }
            octets.push(string.len() as u8);
            octets.extend_from_slice(string);
        }
        octets.try_into().or(Err(InvalidTxtError))
    }

    /// Reads the serial field out of SOA RDATA.
    pub fn soa_serial(&self) -> Option<u32> {
        // The serial follows the MNAME and RNAME fields.
        let (_, mname_len) = Name::try_from_uncompressed(&self.octets).ok()?;
        let (_, rname_len) = Name::try_from_uncompressed(&self.octets[mname_len..]).ok()?;
        let serial = self.octets.get(mname_len + rname_len..mname_len + rname_len + 4)?;
        Some(u32::from_be_bytes(serial.try_into().unwrap()))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that RDATA exceeds the 16-bit RDLENGTH limit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RdataTooLongError;

impl fmt::Display for RdataTooLongError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("RDATA exceeds 65,535 octets")
    }
}

impl std::error::Error for RdataTooLongError {}

/// An error signaling invalid TXT RDATA construction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvalidTxtError;

impl fmt::Display for InvalidTxtError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid TXT character-strings")
    }
}

impl std::error::Error for InvalidTxtError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soa_rdata_round_trips_the_serial() {
        let invalid: Name = "invalid.".parse().unwrap();
        let rdata = Rdata::new_soa(&invalid, &invalid, 42, 60, 10, 1209600, 0);
        assert_eq!(rdata.soa_serial(), Some(42));
        assert_eq!(rdata.len(), invalid.wire_len() * 2 + 20);
    }

    #[test]
    fn txt_rdata_is_length_prefixed() {
        let rdata = Rdata::new_txt(&[b"2"]).unwrap();
        assert_eq!(rdata.octets(), b"\x012");
        assert!(Rdata::new_txt(&[]).is_err());
        assert!(Rdata::new_txt(&[&[0; 256]]).is_err());
    }

    #[test]
    fn overlong_rdata_is_rejected() {
        let octets = vec![0; Rdata::MAX_LEN + 1];
        assert!(<&Rdata>::try_from(octets.as_slice()).is_err());
        assert!(Box::<Rdata>::try_from(octets).is_err());
    }
}
