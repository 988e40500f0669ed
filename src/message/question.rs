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

//! Implementation of the [`Question`] type and the QTYPE/QCLASS
//! wrappers.

use std::fmt;

use crate::class::Class;
use crate::name::Name;
use crate::rr::Type;

////////////////////////////////////////////////////////////////////////
// QUESTIONS                                                          //
////////////////////////////////////////////////////////////////////////

/// A question from the question section of a DNS message.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Question {
    pub qname: Name,
    pub qtype: Qtype,
    pub qclass: Qclass,
}

////////////////////////////////////////////////////////////////////////
// QTYPES                                                             //
////////////////////////////////////////////////////////////////////////

/// The QTYPE of a [`Question`].
///
/// QTYPEs are a superset of RR types ([RFC 1035 § 3.2.3]); the ones
/// that are not plain RR types are given constants here.
///
/// [RFC 1035 § 3.2.3]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.3
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Qtype(u16);

impl Qtype {
    pub const SOA: Self = Self(6);
    pub const IXFR: Self = Self(251);
    pub const AXFR: Self = Self(252);
    pub const ANY: Self = Self(255);
}

impl From<u16> for Qtype {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Qtype> for u16 {
    fn from(qtype: Qtype) -> Self {
        qtype.0
    }
}

impl From<Type> for Qtype {
    fn from(rr_type: Type) -> Self {
        Self(rr_type.into())
    }
}

impl fmt::Debug for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::IXFR => f.write_str("IXFR"),
            Self::AXFR => f.write_str("AXFR"),
            Self::ANY => f.write_str("ANY"),
            Self(value) => Type::from(value).fmt(f),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// QCLASSES                                                           //
////////////////////////////////////////////////////////////////////////

/// The QCLASS of a [`Question`].
///
/// QCLASSes are a superset of classes ([RFC 1035 § 3.2.5]).
///
/// [RFC 1035 § 3.2.5]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.5
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Qclass(u16);

impl Qclass {
    pub const IN: Self = Self(1);
    pub const NONE: Self = Self(254);
    pub const ANY: Self = Self(255);
}

impl From<u16> for Qclass {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Qclass> for u16 {
    fn from(qclass: Qclass) -> Self {
        qclass.0
    }
}

impl From<Class> for Qclass {
    fn from(class: Class) -> Self {
        Self(class.into())
    }
}

impl fmt::Debug for Qclass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Qclass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("NONE"),
            Self::ANY => f.write_str("ANY"),
            Self(value) => Class::from(value).fmt(f),
        }
    }
}
