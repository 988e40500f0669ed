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

//! TSIG message authentication ([RFC 8945]).
//!
//! This module implements the server side of TSIG: verification of
//! signed requests, signing of responses, and signing of the second
//! and subsequent messages of a multi-message zone transfer with the
//! abbreviated "timers only" variables of [RFC 8945 § 5.4.2].
//!
//! The digest over a message is not computed over the raw octets as
//! received. For a request, the message ID is replaced with the
//! original ID from the TSIG RR, the ARCOUNT is decremented to exclude
//! the TSIG RR, and the message is truncated immediately before the
//! TSIG RR; the TSIG *variables* (key name, class, TTL, algorithm,
//! timers, error, and other data, with names in canonical lowercase
//! form) are then appended. For a response, the message is digested as
//! it will be sent, before the TSIG RR is appended and counted.
//!
//! [RFC 8945]: https://datatracker.ietf.org/doc/html/rfc8945

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use super::constants::*;
use super::reader::ReadRr;
use super::{ExtendedRcode, Qclass};
use crate::class::Class;
use crate::name::Name;
use crate::util::Caseless;

////////////////////////////////////////////////////////////////////////
// ALGORITHMS                                                         //
////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref HMAC_SHA1_NAME: Name = "hmac-sha1.".parse().unwrap();
    static ref HMAC_SHA256_NAME: Name = "hmac-sha256.".parse().unwrap();
    static ref HMAC_SHA512_NAME: Name = "hmac-sha512.".parse().unwrap();
}

/// A TSIG algorithm supported by this server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    HmacSha1,
    HmacSha256,
    HmacSha512,
}

impl Algorithm {
    /// Returns the algorithm's name, e.g. `hmac-sha256.`, in canonical
    /// lowercase form.
    pub fn name(&self) -> &'static Name {
        match self {
            Self::HmacSha1 => &HMAC_SHA1_NAME,
            Self::HmacSha256 => &HMAC_SHA256_NAME,
            Self::HmacSha512 => &HMAC_SHA512_NAME,
        }
    }

    /// Returns the HMAC output size in octets.
    pub fn output_size(&self) -> usize {
        match self {
            Self::HmacSha1 => 20,
            Self::HmacSha256 => 32,
            Self::HmacSha512 => 64,
        }
    }

    /// Looks up an algorithm by its DNS name (case-insensitively).
    pub fn from_name(name: &Name) -> Option<Self> {
        if name == &*HMAC_SHA1_NAME {
            Some(Self::HmacSha1)
        } else if name == &*HMAC_SHA256_NAME {
            Some(Self::HmacSha256)
        } else if name == &*HMAC_SHA512_NAME {
            Some(Self::HmacSha512)
        } else {
            None
        }
    }

    fn authenticator(&self, key: &[u8]) -> Box<dyn Authenticator> {
        // Hmac::new_from_slice accepts keys of any length.
        match self {
            Self::HmacSha1 => Box::new(Hmac::<Sha1>::new_from_slice(key).unwrap()),
            Self::HmacSha256 => Box::new(Hmac::<Sha256>::new_from_slice(key).unwrap()),
            Self::HmacSha512 => Box::new(Hmac::<Sha512>::new_from_slice(key).unwrap()),
        }
    }
}

impl FromStr for Algorithm {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match Caseless(text) {
            Caseless("hmac-sha1") => Ok(Self::HmacSha1),
            Caseless("hmac-sha256") => Ok(Self::HmacSha256),
            Caseless("hmac-sha512") => Ok(Self::HmacSha512),
            _ => Err("unknown TSIG algorithm"),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HmacSha1 => f.write_str("hmac-sha1"),
            Self::HmacSha256 => f.write_str("hmac-sha256"),
            Self::HmacSha512 => f.write_str("hmac-sha512"),
        }
    }
}

/// An object-safe facade over the [`Mac`] implementations in use.
trait Authenticator {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
    fn verify_truncated_left(self: Box<Self>, tag: &[u8]) -> bool;
}

impl<M: Mac> Authenticator for M {
    fn update(&mut self, data: &[u8]) {
        Mac::update(self, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Mac::finalize(*self).into_bytes().to_vec()
    }

    fn verify_truncated_left(self: Box<Self>, tag: &[u8]) -> bool {
        Mac::verify_truncated_left(*self, tag).is_ok()
    }
}

////////////////////////////////////////////////////////////////////////
// KEYS                                                               //
////////////////////////////////////////////////////////////////////////

/// A TSIG key: a name, an algorithm, and a shared secret.
#[derive(Clone)]
pub struct Key {
    name: Name,
    algorithm: Algorithm,
    secret: Box<[u8]>,
}

impl Key {
    /// Creates a new `Key`. The name is stored in canonical lowercase
    /// form.
    pub fn new(name: &Name, algorithm: Algorithm, secret: impl Into<Box<[u8]>>) -> Self {
        Self {
            name: name.to_lowercase(),
            algorithm,
            secret: secret.into(),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // The secret stays out of the log.
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////
// RECEIVED TSIG RRS                                                  //
////////////////////////////////////////////////////////////////////////

/// The parsed content of a received TSIG RR.
#[derive(Clone, Debug)]
pub struct ReadTsig {
    pub key_name: Name,
    pub algorithm: Name,
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: ExtendedRcode,
    pub other: Vec<u8>,
}

impl ReadTsig {
    /// Parses a TSIG RR read from a message. Per [RFC 8945 § 4.2], the
    /// class must be ANY and the TTL must be zero, and names within
    /// the RDATA are never compressed.
    ///
    /// [RFC 8945 § 4.2]: https://datatracker.ietf.org/doc/html/rfc8945#section-4.2
    pub fn from_rr(rr: &ReadRr) -> Result<Self, ParseError> {
        if rr.class != Class::from(u16::from(Qclass::ANY)) || u32::from(rr.ttl) != 0 {
            return Err(ParseError);
        }
        let octets = rr.rdata.octets();
        let (algorithm, algorithm_len) =
            Name::try_from_uncompressed(octets).or(Err(ParseError))?;
        let rest = &octets[algorithm_len..];
        let fixed = rest.get(..10).ok_or(ParseError)?;
        let time_signed = u64::from_be_bytes([0, 0, fixed[0], fixed[1], fixed[2], fixed[3], fixed[4], fixed[5]]);
        let fudge = u16::from_be_bytes([fixed[6], fixed[7]]);
        let mac_size = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
        let mac = rest.get(10..10 + mac_size).ok_or(ParseError)?.to_vec();
        let tail = &rest[10 + mac_size..];
        let fixed = tail.get(..6).ok_or(ParseError)?;
        let original_id = u16::from_be_bytes([fixed[0], fixed[1]]);
        let error = ExtendedRcode::from(u16::from_be_bytes([fixed[2], fixed[3]]));
        let other_len = u16::from_be_bytes([fixed[4], fixed[5]]) as usize;
        let other = tail.get(6..6 + other_len).ok_or(ParseError)?;
        if tail.len() != 6 + other_len {
            return Err(ParseError);
        }
        Ok(Self {
            key_name: rr.owner.clone(),
            algorithm,
            time_signed,
            fudge,
            mac,
            original_id,
            error,
            other: other.to_vec(),
        })
    }
}

////////////////////////////////////////////////////////////////////////
// VERIFICATION                                                       //
////////////////////////////////////////////////////////////////////////

/// Verifies a signed request.
///
/// `message` is the raw request as received, and `tsig_rr_start` is the
/// offset of the TSIG RR within it. On success, the request MAC is
/// returned for inclusion in the response digest.
pub fn verify_request(
    message: &[u8],
    tsig_rr_start: usize,
    tsig: &ReadTsig,
    key: &Key,
    now: u64,
) -> Result<Vec<u8>, VerificationError> {
    check_mac_size(key.algorithm, tsig.mac.len())?;

    let mut authenticator = key.algorithm.authenticator(&key.secret);
    add_modified_request(authenticator.as_mut(), message, tsig_rr_start, tsig.original_id);
    add_tsig_variables(
        authenticator.as_mut(),
        &tsig.key_name.to_lowercase(),
        &tsig.algorithm.to_lowercase(),
        tsig.time_signed,
        tsig.fudge,
        tsig.error,
        &tsig.other,
    );
    if !authenticator.verify_truncated_left(&tsig.mac) {
        return Err(VerificationError::BadSig);
    }

    // The time check comes after the MAC check, so that an attacker
    // cannot probe the clock window with unsigned garbage
    // (RFC 8945 § 5.2.3).
    let window = tsig.fudge as u64;
    if now < tsig.time_signed.saturating_sub(window) || now > tsig.time_signed + window {
        return Err(VerificationError::BadTime);
    }

    Ok(tsig.mac.clone())
}

/// Enforces the MAC truncation bounds of [RFC 8945 § 5.2]: at least
/// ten octets and half the algorithm output, at most the full output.
///
/// [RFC 8945 § 5.2]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.2
fn check_mac_size(algorithm: Algorithm, mac_size: usize) -> Result<(), VerificationError> {
    let output_size = algorithm.output_size();
    if mac_size < 10.max(output_size / 2) || mac_size > output_size {
        Err(VerificationError::MacSize)
    } else {
        Ok(())
    }
}

/// Digests a request as modified for MAC computation: the original ID
/// in place of the message ID, the ARCOUNT decremented to exclude the
/// TSIG RR, and the TSIG RR itself omitted.
fn add_modified_request(
    authenticator: &mut dyn Authenticator,
    message: &[u8],
    tsig_rr_start: usize,
    original_id: u16,
) {
    let arcount = u16::from_be_bytes(message[ARCOUNT_START..ARCOUNT_END].try_into().unwrap());
    authenticator.update(&original_id.to_be_bytes());
    authenticator.update(&message[ID_END..ARCOUNT_START]);
    authenticator.update(&(arcount - 1).to_be_bytes());
    authenticator.update(&message[ARCOUNT_END..tsig_rr_start]);
}

/// Digests a response as it will be sent (before the TSIG RR is
/// appended and counted), with the original ID in place of the message
/// ID.
fn add_modified_response(authenticator: &mut dyn Authenticator, message: &[u8], original_id: u16) {
    authenticator.update(&original_id.to_be_bytes());
    authenticator.update(&message[ID_END..]);
}

/// Digests the TSIG variables ([RFC 8945 § 4.3.3]).
///
/// [RFC 8945 § 4.3.3]: https://datatracker.ietf.org/doc/html/rfc8945#section-4.3.3
fn add_tsig_variables(
    authenticator: &mut dyn Authenticator,
    key_name: &Name,
    algorithm: &Name,
    time_signed: u64,
    fudge: u16,
    error: ExtendedRcode,
    other: &[u8],
) {
    authenticator.update(key_name.wire());
    authenticator.update(b"\x00\xff\x00\x00\x00\x00"); // class ANY, TTL 0
    authenticator.update(algorithm.wire());
    add_timers(authenticator, time_signed, fudge);
    authenticator.update(&u16::from(error).to_be_bytes());
    authenticator.update(&(other.len() as u16).to_be_bytes());
    authenticator.update(other);
}

/// Digests the abbreviated "timers only" variables used for the second
/// and subsequent messages of a transfer ([RFC 8945 § 5.4.2]).
fn add_timers(authenticator: &mut dyn Authenticator, time_signed: u64, fudge: u16) {
    authenticator.update(&time_signed.to_be_bytes()[2..8]);
    authenticator.update(&fudge.to_be_bytes());
}

////////////////////////////////////////////////////////////////////////
// SIGNING                                                            //
////////////////////////////////////////////////////////////////////////

/// The fields of a TSIG RR prepared for an outgoing message.
#[derive(Clone, Debug)]
pub struct PreparedTsig {
    pub time_signed: u64,
    pub fudge: u16,
    pub original_id: u16,
    pub error: ExtendedRcode,
    /// For BADTIME responses, the server's clock, carried in the
    /// "other data" field ([RFC 8945 § 5.2.3]).
    pub other_time: Option<u64>,
}

impl PreparedTsig {
    /// Prepares a TSIG RR for a successful response.
    pub fn new(original_id: u16, now: u64, fudge: u16) -> Self {
        Self {
            time_signed: now,
            fudge,
            original_id,
            error: ExtendedRcode::NOERROR,
            other_time: None,
        }
    }

    /// Prepares a TSIG RR for an error response. For BADTIME, the
    /// request's time goes into the time-signed field and the server's
    /// clock into "other data".
    pub fn for_error(
        original_id: u16,
        error: ExtendedRcode,
        request_time: u64,
        fudge: u16,
        now: u64,
    ) -> Self {
        if error == ExtendedRcode::BADTIME {
            Self {
                time_signed: request_time,
                fudge,
                original_id,
                error,
                other_time: Some(now),
            }
        } else {
            Self {
                time_signed: now,
                fudge,
                original_id,
                error,
                other_time: None,
            }
        }
    }

    fn other_octets(&self) -> Vec<u8> {
        match self.other_time {
            Some(time) => time.to_be_bytes()[2..8].to_vec(),
            None => Vec::new(),
        }
    }

    /// The wire length of the TSIG RR when it carries no MAC.
    pub fn unsigned_rr_len(&self, key_name: &Name, algorithm: &Name) -> usize {
        let other_len = if self.other_time.is_some() { 6 } else { 0 };
        key_name.wire_len() + algorithm.wire_len() + 26 + other_len
    }

    /// The wire length of the TSIG RR when it carries a full-size MAC.
    pub fn signed_rr_len(&self, key_name: &Name, algorithm: Algorithm) -> usize {
        self.unsigned_rr_len(key_name, algorithm.name()) + algorithm.output_size()
    }
}

/// How the MAC of an outgoing message is computed.
#[derive(Clone, Copy, Debug)]
pub enum Mode<'a> {
    /// The first (or only) response to a signed request: the digest
    /// covers the length-prefixed request MAC, the message, and the
    /// full TSIG variables.
    Response { request_mac: &'a [u8] },
    /// The second and subsequent messages of a transfer: the digest
    /// covers the length-prefixed MAC of the prior message, the
    /// message, and the timers only.
    Subsequent { prior_mac: &'a [u8] },
}

/// Computes the MAC for an outgoing message. `message` must be the
/// complete message as it will be sent, *without* the TSIG RR and with
/// the TSIG RR excluded from the ARCOUNT.
pub fn compute_mac(message: &[u8], key: &Key, prepared: &PreparedTsig, mode: Mode) -> Vec<u8> {
    let mut authenticator = key.algorithm.authenticator(&key.secret);
    match mode {
        Mode::Response { request_mac } => {
            authenticator.update(&(request_mac.len() as u16).to_be_bytes());
            authenticator.update(request_mac);
            add_modified_response(authenticator.as_mut(), message, prepared.original_id);
            add_tsig_variables(
                authenticator.as_mut(),
                &key.name,
                key.algorithm.name(),
                prepared.time_signed,
                prepared.fudge,
                prepared.error,
                &prepared.other_octets(),
            );
        }
        Mode::Subsequent { prior_mac } => {
            authenticator.update(&(prior_mac.len() as u16).to_be_bytes());
            authenticator.update(prior_mac);
            add_modified_response(authenticator.as_mut(), message, prepared.original_id);
            add_timers(authenticator.as_mut(), prepared.time_signed, prepared.fudge);
        }
    }
    authenticator.finalize()
}

/// Serializes a complete TSIG RR (owner through RDATA) for appending
/// to a message. `mac` may be empty for unsigned error responses.
pub(crate) fn build_rr(
    key_name: &Name,
    algorithm: &Name,
    prepared: &PreparedTsig,
    mac: &[u8],
) -> Vec<u8> {
    let other = prepared.other_octets();
    let rdlength = algorithm.wire_len() + 16 + mac.len() + other.len();
    let mut rr = Vec::with_capacity(key_name.wire_len() + 10 + rdlength);
    rr.extend_from_slice(key_name.wire());
    rr.extend_from_slice(&u16::from(crate::rr::Type::TSIG).to_be_bytes());
    rr.extend_from_slice(&u16::from(Qclass::ANY).to_be_bytes());
    rr.extend_from_slice(&[0, 0, 0, 0]); // TTL
    rr.extend_from_slice(&(rdlength as u16).to_be_bytes());
    rr.extend_from_slice(algorithm.wire());
    rr.extend_from_slice(&prepared.time_signed.to_be_bytes()[2..8]);
    rr.extend_from_slice(&prepared.fudge.to_be_bytes());
    rr.extend_from_slice(&(mac.len() as u16).to_be_bytes());
    rr.extend_from_slice(mac);
    rr.extend_from_slice(&prepared.original_id.to_be_bytes());
    rr.extend_from_slice(&u16::from(prepared.error).to_be_bytes());
    rr.extend_from_slice(&(other.len() as u16).to_be_bytes());
    rr.extend_from_slice(&other);
    rr
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a TSIG RR is not well-formed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseError;

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("malformed TSIG RR")
    }
}

impl std::error::Error for ParseError {}

/// An error encountered while verifying a signed request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerificationError {
    /// The presented MAC violates the RFC 8945 § 5.2 size bounds. This
    /// is a FORMERR-level problem, not an authentication failure.
    MacSize,
    BadSig,
    BadTime,
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MacSize => f.write_str("MAC size out of bounds"),
            Self::BadSig => f.write_str("MAC verification failed"),
            Self::BadTime => f.write_str("signature time outside the allowed window"),
        }
    }
}

impl std::error::Error for VerificationError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use hmac::{Hmac, Mac};
    use lazy_static::lazy_static;
    use sha2::Sha256;

    use super::*;

    const SECRET: &[u8] = b"topsecret";
    const NOW: u64 = 1663798730;
    const FUDGE: u16 = 300;

    lazy_static! {
        static ref KEY_NAME: Name = "a.tsig.Key.".parse().unwrap();
        static ref KEY: Key = Key::new(&KEY_NAME, Algorithm::HmacSha256, SECRET);
    }

    // A minimal AXFR query (header + question), without a TSIG RR.
    fn unsigned_query(arcount: u16) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(b"\xa2\xe0\x00\x00\x00\x01\x00\x00\x00\x00");
        message.extend_from_slice(&arcount.to_be_bytes());
        message.extend_from_slice(b"\x07example\x03com\x00\x00\xfc\x00\x01");
        message
    }

    // Computes a request MAC the long way, assembling the digest input
    // explicitly per RFC 8945 § 4.3, as an independent check on the
    // incremental implementation.
    fn request_mac_by_hand(time_signed: u64) -> Vec<u8> {
        let mut input = unsigned_query(0);
        input.extend_from_slice(b"\x01a\x04tsig\x03key\x00"); // key name, lowercase
        input.extend_from_slice(b"\x00\xff\x00\x00\x00\x00"); // ANY, TTL 0
        input.extend_from_slice(b"\x0bhmac-sha256\x00");
        input.extend_from_slice(&time_signed.to_be_bytes()[2..8]);
        input.extend_from_slice(&FUDGE.to_be_bytes());
        input.extend_from_slice(&[0, 0, 0, 0]); // error, other length
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET).unwrap();
        Mac::update(&mut mac, &input);
        mac.finalize().into_bytes().to_vec()
    }

    // Builds a fully signed query: the unsigned query plus a TSIG RR.
    fn signed_query(time_signed: u64) -> (Vec<u8>, usize) {
        let mac = request_mac_by_hand(time_signed);
        let mut message = unsigned_query(1);
        let tsig_rr_start = message.len();
        let prepared = PreparedTsig {
            time_signed,
            fudge: FUDGE,
            original_id: 0xa2e0,
            error: ExtendedRcode::NOERROR,
            other_time: None,
        };
        let rr = build_rr(KEY.name(), Algorithm::HmacSha256.name(), &prepared, &mac);
        message.extend_from_slice(&rr);
        (message, tsig_rr_start)
    }

    fn read_tsig(message: &[u8], tsig_rr_start: usize) -> ReadTsig {
        let mut reader = super::super::Reader::try_from(message).unwrap();
        reader.read_question().unwrap();
        assert_eq!(reader.cursor(), tsig_rr_start);
        let rr = reader.read_rr().unwrap();
        ReadTsig::from_rr(&rr).unwrap()
    }

    #[test]
    fn verifies_a_correctly_signed_request() {
        let (message, tsig_rr_start) = signed_query(NOW);
        let tsig = read_tsig(&message, tsig_rr_start);
        assert_eq!(tsig.key_name, *KEY_NAME);
        let mac = verify_request(&message, tsig_rr_start, &tsig, &KEY, NOW).unwrap();
        assert_eq!(mac, tsig.mac);
    }

    #[test]
    fn rejects_altered_message_bytes() {
        let (mut message, tsig_rr_start) = signed_query(NOW);
        message[13] ^= 0x20; // flip the case bit of a qname octet
        let tsig = read_tsig(&message, tsig_rr_start);
        assert_eq!(
            verify_request(&message, tsig_rr_start, &tsig, &KEY, NOW),
            Err(VerificationError::BadSig),
        );
    }

    #[test]
    fn rejects_times_outside_the_fudge_window() {
        let (message, tsig_rr_start) = signed_query(NOW);
        let tsig = read_tsig(&message, tsig_rr_start);
        let skewed = NOW + FUDGE as u64 + 1;
        assert_eq!(
            verify_request(&message, tsig_rr_start, &tsig, &KEY, skewed),
            Err(VerificationError::BadTime),
        );
        // Within the window, either side of the timestamp, is fine.
        assert!(verify_request(&message, tsig_rr_start, &tsig, &KEY, NOW + 299).is_ok());
        assert!(verify_request(&message, tsig_rr_start, &tsig, &KEY, NOW - 299).is_ok());
    }

    #[test]
    fn rejects_out_of_bounds_mac_sizes() {
        let (message, tsig_rr_start) = signed_query(NOW);
        let mut tsig = read_tsig(&message, tsig_rr_start);
        tsig.mac.truncate(15); // below half of SHA-256 output
        assert_eq!(
            verify_request(&message, tsig_rr_start, &tsig, &KEY, NOW),
            Err(VerificationError::MacSize),
        );
    }

    #[test]
    fn truncated_macs_within_bounds_verify() {
        let (message, tsig_rr_start) = signed_query(NOW);
        let mut tsig = read_tsig(&message, tsig_rr_start);
        tsig.mac.truncate(16); // exactly half of SHA-256 output
        assert!(verify_request(&message, tsig_rr_start, &tsig, &KEY, NOW).is_ok());
    }

    #[test]
    fn response_mac_matches_by_hand_computation() {
        let request_mac = request_mac_by_hand(NOW);
        // A pretend response: header with QR set, one question.
        let mut response = Vec::new();
        response.extend_from_slice(b"\xa2\xe0\x80\x00\x00\x01\x00\x00\x00\x00\x00\x00");
        response.extend_from_slice(b"\x07example\x03com\x00\x00\xfc\x00\x01");

        let prepared = PreparedTsig::new(0xa2e0, NOW, FUDGE);
        let mac = compute_mac(
            &response,
            &KEY,
            &prepared,
            Mode::Response {
                request_mac: &request_mac,
            },
        );

        let mut input = Vec::new();
        input.extend_from_slice(&(request_mac.len() as u16).to_be_bytes());
        input.extend_from_slice(&request_mac);
        input.extend_from_slice(&response);
        input.extend_from_slice(b"\x01a\x04tsig\x03key\x00");
        input.extend_from_slice(b"\x00\xff\x00\x00\x00\x00");
        input.extend_from_slice(b"\x0bhmac-sha256\x00");
        input.extend_from_slice(&NOW.to_be_bytes()[2..8]);
        input.extend_from_slice(&FUDGE.to_be_bytes());
        input.extend_from_slice(&[0, 0, 0, 0]);
        let mut expected = Hmac::<Sha256>::new_from_slice(SECRET).unwrap();
        Mac::update(&mut expected, &input);
        assert_eq!(mac, expected.finalize().into_bytes().to_vec());
    }

    #[test]
    fn subsequent_mac_uses_timers_only() {
        let prior_mac = request_mac_by_hand(NOW);
        let mut continuation = Vec::new();
        continuation.extend_from_slice(b"\xa2\xe0\x80\x00\x00\x00\x00\x01\x00\x00\x00\x00");
        continuation.extend_from_slice(b"\x07example\x03com\x00\x00\x06\x00\x01");
        continuation.extend_from_slice(b"\x00\x00\x00\x00\x00\x00"); // a stand-in record tail

        let prepared = PreparedTsig::new(0xa2e0, NOW + 1, FUDGE);
        let mac = compute_mac(
            &continuation,
            &KEY,
            &prepared,
            Mode::Subsequent {
                prior_mac: &prior_mac,
            },
        );

        let mut input = Vec::new();
        input.extend_from_slice(&(prior_mac.len() as u16).to_be_bytes());
        input.extend_from_slice(&prior_mac);
        input.extend_from_slice(&continuation);
        input.extend_from_slice(&(NOW + 1).to_be_bytes()[2..8]);
        input.extend_from_slice(&FUDGE.to_be_bytes());
        let mut expected = Hmac::<Sha256>::new_from_slice(SECRET).unwrap();
        Mac::update(&mut expected, &input);
        assert_eq!(mac, expected.finalize().into_bytes().to_vec());
    }

    #[test]
    fn badtime_preparation_swaps_times() {
        let prepared = PreparedTsig::for_error(1, ExtendedRcode::BADTIME, NOW - 9999, FUDGE, NOW);
        assert_eq!(prepared.time_signed, NOW - 9999);
        assert_eq!(prepared.other_time, Some(NOW));
        assert_eq!(prepared.other_octets(), NOW.to_be_bytes()[2..8].to_vec());
    }

    #[test]
    fn rr_lengths_match_serialization() {
        let prepared = PreparedTsig::new(0xa2e0, NOW, FUDGE);
        let mac = vec![0xab; Algorithm::HmacSha256.output_size()];
        let rr = build_rr(KEY.name(), Algorithm::HmacSha256.name(), &prepared, &mac);
        assert_eq!(
            rr.len(),
            prepared.signed_rr_len(KEY.name(), Algorithm::HmacSha256),
        );
        let unsigned = build_rr(KEY.name(), Algorithm::HmacSha256.name(), &prepared, &[]);
        assert_eq!(
            unsigned.len(),
            prepared.unsigned_rr_len(KEY.name(), Algorithm::HmacSha256.name()),
        );
    }
}
