use crate::context::{ScalarMap, ScalarValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A leased build machine.
///
/// Only a [`Builder`](crate::Builder) creates or destroys a `BuildHost`: it is
/// returned from `Builder::get` and handed back to the same builder's
/// `release`. Credentials are either a password or a key; both may be absent
/// when the transport authenticates some other way (agent keys, local exec).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildHost {
    /// Address the transport connects to.
    pub host: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub key: Option<String>,

    /// Provider-assigned identifiers the builder needs to release the lease.
    #[serde(default)]
    pub identifiers: HashMap<String, String>,

    /// Distribution name, used to pick a provisioner.
    #[serde(default)]
    pub distro: String,

    #[serde(default)]
    pub release: String,

    /// Supported transport kinds, most preferred first.
    #[serde(default)]
    pub transports: Vec<String>,

    /// Extra provider facts merged into the job context.
    #[serde(default)]
    pub facts: ScalarMap,
}

impl BuildHost {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: None,
            password: None,
            key: None,
            identifiers: HashMap::new(),
            distro: String::new(),
            release: String::new(),
            transports: Vec::new(),
            facts: ScalarMap::new(),
        }
    }

    /// Transport kinds in preference order.
    pub fn transports(&self) -> &[String] {
        &self.transports
    }

    pub fn connect_info(&self) -> ConnectInfo {
        ConnectInfo {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            key: self.key.clone(),
        }
    }

    /// Facts about this host to merge into the job context.
    ///
    /// Provider facts come first; the `build_host*` keys always reflect the
    /// lease itself.
    pub fn context_info(&self) -> ScalarMap {
        let mut info = self.facts.clone();
        info.insert("build_host".to_string(), ScalarValue::from(self.host.as_str()));
        info.insert(
            "build_host_distro".to_string(),
            ScalarValue::from(self.distro.as_str()),
        );
        info.insert(
            "build_host_release".to_string(),
            ScalarValue::from(self.release.as_str()),
        );
        if let Some(ref user) = self.username {
            info.insert("build_host_user".to_string(), ScalarValue::from(user.as_str()));
        }
        info
    }
}

impl fmt::Debug for BuildHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildHost")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key", &self.key.as_ref().map(|_| "***"))
            .field("identifiers", &self.identifiers)
            .field("distro", &self.distro)
            .field("release", &self.release)
            .field("transports", &self.transports)
            .finish()
    }
}

/// Connection parameters a transport is constructed with.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
}

impl fmt::Debug for ConnectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectInfo")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key", &self.key.as_ref().map(|_| "***"))
            .finish()
    }
}
