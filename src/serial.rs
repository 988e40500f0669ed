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

//! Durable storage of catalog zone serials.
//!
//! Each view's catalog serial is kept in its own file together with the
//! fingerprint of the zone set it was issued for. The serial must never
//! move backwards, so updates are written to a temporary file which is
//! synced and then renamed over the old one; a crash at any point
//! leaves either the old state or the new state on disk, never a
//! partial file.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

////////////////////////////////////////////////////////////////////////
// SERIAL STORES                                                      //
////////////////////////////////////////////////////////////////////////

/// The on-disk store of per-view catalog serials.
///
/// [`SerialStore::resolve`] is the sole entry point for obtaining a
/// serial. It serializes concurrent callers per view, so two transfers
/// of the same view's catalog can never race a read-modify-write of
/// its state file.
pub struct SerialStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SerialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the serial for `view`'s catalog whose zone set has the
    /// given fingerprint.
    ///
    /// If the stored fingerprint matches, the stored serial is returned
    /// and the state file is left untouched. Otherwise a new serial is
    /// issued (one greater than the stored serial, wrapping past
    /// `u32::MAX` to 1 and never taking the value 0) and persisted
    /// together with the new fingerprint before it is returned.
    pub fn resolve(&self, view: &str, fingerprint: &str) -> Result<u32, Error> {
        let lock = self.view_lock(view)?;
        let _guard = lock.lock().unwrap();

        let path = self.state_path(view);
        match load(&path)? {
            Some((serial, stored_fingerprint)) if stored_fingerprint == fingerprint => Ok(serial),
            Some((serial, _)) => {
                let next = next_serial(serial);
                self.save(view, next, fingerprint)?;
                Ok(next)
            }
            None => {
                self.save(view, 1, fingerprint)?;
                Ok(1)
            }
        }
    }

    fn save(&self, view: &str, serial: u32, fingerprint: &str) -> Result<(), Error> {
        let tmp_path = self
            .dir
            .join(format!("{view}.serial.tmp.{:08x}", rand::random::<u32>()));
        let result = (|| {
            let mut file = File::create(&tmp_path)?;
            writeln!(file, "{serial} {fingerprint}")?;
            file.sync_all()?;
            fs::rename(&tmp_path, self.state_path(view))
        })();
        if result.is_err() {
            // The rename did not happen; don't leave the temporary
            // file behind.
            let _ = fs::remove_file(&tmp_path);
        }
        result.map_err(Error::Io)
    }

    fn state_path(&self, view: &str) -> PathBuf {
        self.dir.join(format!("{view}.serial"))
    }

    fn view_lock(&self, view: &str) -> Result<Arc<Mutex<()>>, Error> {
        if view.is_empty()
            || !view
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(Error::InvalidViewName(view.to_owned()));
        }
        let mut locks = self.locks.lock().unwrap();
        Ok(locks.entry(view.to_owned()).or_default().clone())
    }
}

fn load(path: &Path) -> Result<Option<(u32, String)>, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    let corrupt = || Error::Corrupt(path.to_owned());
    let mut fields = contents.split_ascii_whitespace();
    let serial = fields
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(corrupt)?;
    let fingerprint = fields.next().ok_or_else(corrupt)?.to_owned();
    if serial == 0 || fields.next().is_some() {
        Err(corrupt())
    } else {
        Ok(Some((serial, fingerprint)))
    }
}

fn next_serial(serial: u32) -> u32 {
    match serial.checked_add(1) {
        Some(next) => next,
        None => 1,
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while reading or writing serial state.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Corrupt(PathBuf),
    InvalidViewName(String),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Corrupt(path) => write!(f, "serial state file {} is corrupt", path.display()),
            Self::InvalidViewName(view) => {
                write!(f, "view name {view:?} is not usable as a file name")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
