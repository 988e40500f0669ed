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

//! Implements the server configuration file.

use std::collections::HashMap;
use std::fmt::{self, Write};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use zonegate::message::tsig::Algorithm;
use zonegate::name::Name;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
///
/// The `reloading` parameter controls how the configuration is
/// summarized in the log: if reloading, only the view and zone
/// configuration (the only thing that changes across reloads) is
/// summarized. This parameter does *not* otherwise affect processing.
pub fn load_from_path(path: impl AsRef<Path>, reloading: bool) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;

    // When loading the configuration from a path, all paths within it
    // are interpreted relative to the configuration file's directory.
    for zone_config in &mut config.zones {
        if zone_config.path.is_relative() {
            zone_config.path = dir.join(&zone_config.path);
        }
    }
    if config.serial_dir.is_relative() {
        config.serial_dir = dir.join(&config.serial_dir);
    }

    validate(&config)?;

    if reloading {
        log_view_and_zone_summary(&config);
    } else {
        log_config_summary(&config);
    }
    Ok(config)
}

/// Cross-checks the configuration: every zone must belong to a
/// configured view, and no two views may share a key name or a catalog
/// apex.
fn validate(config: &Config) -> Result<()> {
    for zone_config in &config.zones {
        if !config.views.contains_key(&zone_config.view) {
            return Err(anyhow!(
                "zone {} references undefined view {:?}",
                zone_config.name.0,
                zone_config.view,
            ));
        }
    }

    let mut key_names: HashMap<Name, &str> = HashMap::new();
    let mut apexes: HashMap<Name, &str> = HashMap::new();
    for (view_name, view_config) in &config.views {
        if let Some(other) = key_names.insert(view_config.key_name.0.clone(), view_name) {
            return Err(anyhow!(
                "views {other:?} and {view_name:?} share the key name {}",
                view_config.key_name.0,
            ));
        }
        let apex = view_config.catalog_apex(view_name)?;
        if let Some(other) = apexes.insert(apex.clone(), view_name) {
            return Err(anyhow!(
                "views {other:?} and {view_name:?} share the catalog apex {apex}",
            ));
        }
    }
    Ok(())
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Bind address:     {}\n\
         Serial directory: {}\n\
         Views:            ",
        config.bind,
        config.serial_dir.display(),
    );
    summarize_views_and_zones(config, &mut message);
    debug!("{}", message);
}

/// Summarizes only the views and zones in the log, if the debug log
/// level is enabled. Used when reloading.
fn log_view_and_zone_summary(config: &Config) {
    if log_enabled!(Debug) {
        let mut message = String::from("Configuration reloaded:\nViews: ");
        summarize_views_and_zones(config, &mut message);
        debug!("{}", message);
    }
}

/// Produces the view/zone summary for [`log_config_summary`] and
/// [`log_view_and_zone_summary`].
fn summarize_views_and_zones(config: &Config, message: &mut String) {
    if config.views.is_empty() {
        message.push_str("none configured");
        return;
    }
    write!(message, "{} configured", config.views.len()).unwrap();
    for (view_name, view_config) in &config.views {
        let n_zones = config
            .zones
            .iter()
            .filter(|z| &z.view == view_name)
            .count();
        write!(
            message,
            "\n  {} (key {}, {} zones)",
            view_name, view_config.key_name.0, n_zones,
        )
        .unwrap();
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_serial_dir")]
    pub serial_dir: PathBuf,
    pub views: HashMap<String, ViewConfig>,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_BIND_PORT: u16 = 5354;

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}

fn default_serial_dir() -> PathBuf {
    PathBuf::from("serials")
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: VIEWS                                       //
////////////////////////////////////////////////////////////////////////

/// The configuration of a single view.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    pub key_name: ConfigName,
    pub algorithm: ConfigAlgorithm,
    /// The TSIG shared secret, base64-encoded.
    pub secret: String,
    /// The apex of the view's catalog zone. Defaults to
    /// `<view>.catz.`.
    pub catalog_apex: Option<ConfigName>,
}

impl ViewConfig {
    /// Returns the view's catalog apex, deriving the default from the
    /// view's name if none is configured.
    pub fn catalog_apex(&self, view_name: &str) -> Result<Name> {
        match &self.catalog_apex {
            Some(apex) => Ok(apex.0.clone()),
            None => format!("{view_name}.catz.").parse().map_err(|e| {
                anyhow!("cannot derive a catalog apex from view name {view_name:?}: {e}")
            }),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: ZONES                                       //
////////////////////////////////////////////////////////////////////////

/// The configuration of a single zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    pub view: String,
    pub name: ConfigName,
    pub path: PathBuf,
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER ZONEGATE TYPES FOR SERDE                             //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`zonegate`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over a
        /// [`zonegate`] type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");
make_serde_wrapper!(ConfigAlgorithm, Algorithm, "TSIG algorithm");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        bind = "127.0.0.1:5354"
        serial_dir = "state"

        [views.main]
        key_name = "main-key."
        algorithm = "hmac-sha256"
        secret = "dG9wc2VjcmV0"

        [views.other]
        key_name = "other-key."
        algorithm = "hmac-sha512"
        secret = "dG9wc2VjcmV0"
        catalog_apex = "catalog.other.example."

        [[zones]]
        view = "main"
        name = "example.com."
        path = "zones/example.com.zone"
    "#;

    #[test]
    fn parses_the_example_configuration() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.bind, "127.0.0.1:5354".parse().unwrap());
        assert_eq!(config.views.len(), 2);
        let main = &config.views["main"];
        assert_eq!(main.algorithm.0, Algorithm::HmacSha256);
        assert_eq!(
            main.catalog_apex("main").unwrap(),
            "main.catz.".parse().unwrap(),
        );
        let other = &config.views["other"];
        assert_eq!(
            other.catalog_apex("other").unwrap(),
            "catalog.other.example.".parse().unwrap(),
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn defaults_apply_when_fields_are_omitted() {
        let config: Config = toml::from_str("[views]").unwrap();
        assert_eq!(config.bind, "0.0.0.0:5354".parse().unwrap());
        assert_eq!(config.serial_dir, PathBuf::from("serials"));
        assert!(config.zones.is_empty());
    }

    #[test]
    fn zones_must_reference_defined_views() {
        let mut config: Config = toml::from_str(EXAMPLE).unwrap();
        config.zones[0].view = "missing".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn views_may_not_share_key_names() {
        let mut config: Config = toml::from_str(EXAMPLE).unwrap();
        let main_key = config.views["main"].key_name.clone();
        config.views.get_mut("other").unwrap().key_name = main_key;
        assert!(validate(&config).is_err());
    }
}
