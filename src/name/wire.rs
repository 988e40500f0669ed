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

//! Parsing of (possibly compressed) domain names embedded in DNS
//! messages.
//!
//! Compression pointers are accepted only when they point strictly
//! backward, which is what [RFC 1035 § 4.1.4] describes ("a *prior*
//! occurance of the same name") and which guarantees termination.
//!
//! [RFC 1035 § 4.1.4]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.4

use super::{Error, Name};

/// Parses a possibly compressed name starting at `message[start]`.
///
/// On success, this returns the parsed name and the number of octets it
/// occupies at `start` (through the terminating root label or the first
/// compression pointer, whichever comes first).
pub(crate) fn parse_compressed(message: &[u8], start: usize) -> Result<(Name, usize), Error> {
    let mut octets = Vec::new();
    let mut n_labels = 0;
    let mut cursor = start;
    let mut consumed = None;
    loop {
        let len_octet = *message.get(cursor).ok_or(Error::Truncated)?;
        match len_octet {
            0 => {
                octets.push(0);
                let consumed = consumed.unwrap_or_else(|| cursor + 1 - start);
                return Ok((Name::from_validated_wire(octets), consumed));
            }
            1..=63 => {
                let len = len_octet as usize;
                let label = message
                    .get(cursor + 1..cursor + 1 + len)
                    .ok_or(Error::Truncated)?;
                if octets.len() + len + 2 > Name::MAX_WIRE_LEN {
                    return Err(Error::TooLong);
                }
                n_labels += 1;
                if n_labels + 1 > Name::MAX_N_LABELS {
                    return Err(Error::TooManyLabels);
                }
                octets.push(len_octet);
                octets.extend_from_slice(label);
                cursor += len + 1;
            }
            0xc0..=0xff => {
                let second = *message.get(cursor + 1).ok_or(Error::Truncated)?;
                let target = ((len_octet as usize & 0x3f) << 8) | second as usize;
                if target >= cursor {
                    return Err(Error::BadPointer);
                }
                if consumed.is_none() {
                    consumed = Some(cursor + 2 - start);
                }
                cursor = target;
            }
            _ => return Err(Error::BadLabelType),
        }
    }
}

/// Advances past a possibly compressed name starting at
/// `message[start]` without constructing it, returning the number of
/// octets it occupies.
pub(crate) fn skip_name(message: &[u8], start: usize) -> Result<usize, Error> {
    let mut cursor = start;
    loop {
        let len_octet = *message.get(cursor).ok_or(Error::Truncated)?;
        match len_octet {
            0 => return Ok(cursor + 1 - start),
            1..=63 => {
                let len = len_octet as usize;
                if cursor + 1 + len > message.len() {
                    return Err(Error::Truncated);
                }
                cursor += len + 1;
                if cursor - start > Name::MAX_WIRE_LEN {
                    return Err(Error::TooLong);
                }
            }
            0xc0..=0xff => {
                if cursor + 2 > message.len() {
                    return Err(Error::Truncated);
                }
                return Ok(cursor + 2 - start);
            }
            _ => return Err(Error::BadLabelType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A made-up message fragment: the name "example.com." at offset 2,
    // then "www" with a pointer back to it.
    const MESSAGE: &[u8] = b"\xaa\xbb\x07example\x03com\x00\x03www\xc0\x02";

    #[test]
    fn parses_uncompressed_names_in_messages() {
        let (name, consumed) = parse_compressed(MESSAGE, 2).unwrap();
        assert_eq!(name, "example.com.".parse().unwrap());
        assert_eq!(consumed, 13);
    }

    #[test]
    fn follows_backward_pointers() {
        let (name, consumed) = parse_compressed(MESSAGE, 15).unwrap();
        assert_eq!(name, "www.example.com.".parse().unwrap());
        assert_eq!(consumed, 6);
    }

    #[test]
    fn rejects_forward_and_self_pointers() {
        // A pointer to itself must not loop.
        let message = b"\xc0\x00";
        assert_eq!(parse_compressed(message, 0).unwrap_err(), Error::BadPointer);
        let message = b"\xc0\x02\x00";
        assert_eq!(parse_compressed(message, 0).unwrap_err(), Error::BadPointer);
    }

    #[test]
    fn rejects_unsupported_label_types() {
        let message = b"\x40abc";
        assert_eq!(
            parse_compressed(message, 0).unwrap_err(),
            Error::BadLabelType,
        );
    }

    #[test]
    fn skip_name_handles_both_forms() {
        assert_eq!(skip_name(MESSAGE, 2).unwrap(), 13);
        assert_eq!(skip_name(MESSAGE, 15).unwrap(), 6);
        assert!(skip_name(b"\x05ab", 0).is_err());
    }
}
