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

//! Data structures and routines for working with domain names.
//!
//! The [`Name`] structure stores a fully qualified domain name in
//! uncompressed wire form, together with a table of label offsets so
//! that labels and suffixes can be accessed without re-scanning.
//! Equality and hashing are ASCII-case-insensitive, as required by
//! [RFC 1035 § 2.3.3] and [RFC 4343].
//!
//! [RFC 1035 § 2.3.3]: https://datatracker.ietf.org/doc/html/rfc1035#section-2.3.3
//! [RFC 4343]: https://datatracker.ietf.org/doc/html/rfc4343

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use arrayvec::ArrayVec;

pub(crate) mod wire;

////////////////////////////////////////////////////////////////////////
// NAMES                                                              //
////////////////////////////////////////////////////////////////////////

/// A fully qualified domain name.
///
/// A `Name` always ends with the root label, and its underlying buffer
/// is always valid uncompressed wire data within the limits of
/// [RFC 1035 § 3.1]: at most [`Name::MAX_WIRE_LEN`] octets overall and
/// [`Name::MAX_LABEL_LEN`] octets per label.
///
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
#[derive(Clone)]
pub struct Name {
    octets: Box<[u8]>,
    label_offsets: Box<[u8]>,
}

impl Name {
    /// The maximum length of a domain name on the wire.
    pub const MAX_WIRE_LEN: usize = 255;

    /// The maximum length of a label.
    pub const MAX_LABEL_LEN: usize = 63;

    /// The maximum number of labels in a domain name, including the
    /// null (root) label. A name of 127 one-octet labels plus the root
    /// label reaches [`Name::MAX_WIRE_LEN`] exactly.
    pub const MAX_N_LABELS: usize = 128;

    /// Returns the root name.
    pub fn root() -> Self {
        Self {
            octets: Box::new([0]),
            label_offsets: Box::new([0]),
        }
    }

    /// Constructs a `Name` from wire data already known to be a valid
    /// uncompressed name within the RFC 1035 limits.
    fn from_validated_wire(octets: Vec<u8>) -> Self {
        let mut label_offsets = Vec::with_capacity(4);
        let mut offset = 0;
        loop {
            label_offsets.push(offset as u8);
            let len = octets[offset] as usize;
            if len == 0 {
                break;
            }
            offset += len + 1;
        }
        Self {
            octets: octets.into_boxed_slice(),
            label_offsets: label_offsets.into_boxed_slice(),
        }
    }

    /// Returns the uncompressed wire form of the name.
    pub fn wire(&self) -> &[u8] {
        &self.octets
    }

    /// Returns the length of the name on the wire.
    pub fn wire_len(&self) -> usize {
        self.octets.len()
    }

    /// Returns the number of labels in the name, including the null
    /// (root) label.
    pub fn n_labels(&self) -> usize {
        self.label_offsets.len()
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.octets.len() == 1
    }

    /// Returns the content of label `index` (not including the length
    /// octet). Label 0 is the leftmost label; the last label is always
    /// the empty root label.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn label(&self, index: usize) -> &[u8] {
        let offset = self.label_offsets[index] as usize;
        let len = self.octets[offset] as usize;
        &self.octets[offset + 1..offset + 1 + len]
    }

    /// Returns an iterator over the labels of the name, starting with
    /// the leftmost and ending with the empty root label.
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.n_labels()).map(|index| self.label(index))
    }

    /// Returns the name produced by removing the first `skip` labels.
    ///
    /// # Panics
    ///
    /// Panics if `skip >= self.n_labels()`.
    pub fn suffix(&self, skip: usize) -> Name {
        let offset = self.label_offsets[skip] as usize;
        let octets = self.octets[offset..].to_vec();
        let label_offsets = self.label_offsets[skip..]
            .iter()
            .map(|label_offset| label_offset - offset as u8)
            .collect();
        Self {
            octets: octets.into_boxed_slice(),
            label_offsets,
        }
    }

    /// Returns the parent of this name, or `None` for the root.
    pub fn parent(&self) -> Option<Name> {
        if self.is_root() {
            None
        } else {
            Some(self.suffix(1))
        }
    }

    /// Produces a new name by prepending `label` to this name.
    pub fn prepend_label(&self, label: &[u8]) -> Result<Name, Error> {
        if label.is_empty() || label.len() > Self::MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        }
        if self.wire_len() + label.len() + 1 > Self::MAX_WIRE_LEN {
            return Err(Error::TooLong);
        }
        if self.n_labels() + 1 > Self::MAX_N_LABELS {
            return Err(Error::TooManyLabels);
        }
        let mut octets = Vec::with_capacity(self.wire_len() + label.len() + 1);
        octets.push(label.len() as u8);
        octets.extend_from_slice(label);
        octets.extend_from_slice(&self.octets);
        Ok(Self::from_validated_wire(octets))
    }

    /// Returns the canonical all-lowercase form of this name, as used
    /// in TSIG digest computation ([RFC 8945 § 4.3.3]).
    ///
    /// [RFC 8945 § 4.3.3]: https://datatracker.ietf.org/doc/html/rfc8945#section-4.3.3
    pub fn to_lowercase(&self) -> Name {
        let octets = self.octets.iter().map(u8::to_ascii_lowercase).collect();
        Self {
            octets,
            label_offsets: self.label_offsets.clone(),
        }
    }
}

// Label length octets are all less than 64, so a bytewise
// ASCII-case-insensitive comparison of the wire form compares names
// without any risk of confusing length octets with label content.
impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for octet in self.octets.iter() {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TEXTUAL CONVERSION                                                 //
////////////////////////////////////////////////////////////////////////

impl FromStr for Name {
    type Err = Error;

    /// Parses a domain name from its textual form. Only absolute names
    /// (ending with an unescaped dot) are accepted. The RFC 4343
    /// `\X` and `\DDD` escape sequences are understood.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text == "." {
            return Ok(Self::root());
        }

        let mut octets = Vec::with_capacity(text.len() + 1);
        let mut n_labels = 0;
        let mut label_start = 0; // position of the current length octet
        octets.push(0);

        let mut bytes = text.bytes();
        let mut terminated = false;
        while let Some(b) = bytes.next() {
            let content = match b {
                b'.' => {
                    let len = octets.len() - label_start - 1;
                    if len == 0 {
                        return Err(Error::EmptyLabel);
                    } else if len > Self::MAX_LABEL_LEN {
                        return Err(Error::LabelTooLong);
                    }
                    octets[label_start] = len as u8;
                    n_labels += 1;
                    if bytes.len() == 0 {
                        terminated = true;
                        break;
                    }
                    label_start = octets.len();
                    octets.push(0);
                    continue;
                }
                b'\\' => match bytes.next() {
                    Some(d @ b'0'..=b'9') => {
                        let (d2, d3) = match (bytes.next(), bytes.next()) {
                            (Some(d2 @ b'0'..=b'9'), Some(d3 @ b'0'..=b'9')) => (d2, d3),
                            _ => return Err(Error::BadEscape),
                        };
                        let value = (d - b'0') as u32 * 100
                            + (d2 - b'0') as u32 * 10
                            + (d3 - b'0') as u32;
                        u8::try_from(value).or(Err(Error::BadEscape))?
                    }
                    Some(c) => c,
                    None => return Err(Error::BadEscape),
                },
                _ => b,
            };
            octets.push(content);
            if octets.len() > Self::MAX_WIRE_LEN {
                return Err(Error::TooLong);
            }
        }

        if !terminated {
            return Err(Error::NotAbsolute);
        }
        octets.push(0);
        n_labels += 1;
        if octets.len() > Self::MAX_WIRE_LEN {
            Err(Error::TooLong)
        } else if n_labels > Self::MAX_N_LABELS {
            Err(Error::TooManyLabels)
        } else {
            Ok(Self::from_validated_wire(octets))
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            for &octet in label {
                match octet {
                    b'.' | b'\\' => write!(f, "\\{}", octet as char)?,
                    0x21..=0x7e => write!(f, "{}", octet as char)?,
                    _ => write!(f, "\\{:03}", octet)?,
                }
            }
            if !label.is_empty() {
                f.write_str(".")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

////////////////////////////////////////////////////////////////////////
// WIRE CONVERSION                                                    //
////////////////////////////////////////////////////////////////////////

impl Name {
    /// Parses a `Name` from the uncompressed wire data at the start of
    /// `octets`, returning the name and the number of octets it
    /// occupies. Trailing data after the name is ignored.
    pub fn try_from_uncompressed(octets: &[u8]) -> Result<(Self, usize), Error> {
        let mut label_offsets = ArrayVec::<u8, { Self::MAX_N_LABELS }>::new();
        let mut offset = 0;
        loop {
            if offset >= octets.len() || offset >= Self::MAX_WIRE_LEN {
                return Err(Error::Truncated);
            }
            label_offsets
                .try_push(offset as u8)
                .or(Err(Error::TooManyLabels))?;
            let len = octets[offset] as usize;
            if len == 0 {
                break;
            } else if len > Self::MAX_LABEL_LEN {
                return Err(Error::BadLabelType);
            }
            offset += len + 1;
        }
        let wire_len = offset + 1;
        if wire_len > Self::MAX_WIRE_LEN {
            return Err(Error::TooLong);
        }
        let name = Self {
            octets: octets[..wire_len].to_vec().into_boxed_slice(),
            label_offsets: label_offsets.as_slice().to_vec().into_boxed_slice(),
        };
        Ok((name, wire_len))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while parsing or constructing a [`Name`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    TooLong,
    LabelTooLong,
    TooManyLabels,
    EmptyLabel,
    BadEscape,
    NotAbsolute,
    BadLabelType,
    BadPointer,
    Truncated,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TooLong => f.write_str("name exceeds 255 octets"),
            Self::LabelTooLong => f.write_str("label exceeds 63 octets"),
            Self::TooManyLabels => f.write_str("too many labels"),
            Self::EmptyLabel => f.write_str("empty label"),
            Self::BadEscape => f.write_str("invalid escape sequence"),
            Self::NotAbsolute => f.write_str("name is not absolute"),
            Self::BadLabelType => f.write_str("unsupported label type"),
            Self::BadPointer => f.write_str("invalid compression pointer"),
            Self::Truncated => f.write_str("data ends mid-name"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
