//! Domain types for delta requests.
//!
//! A [`Delta`] names one target commit and the source commits a device might
//! be running. Every endpoint optionally carries a prepackaged archive URL;
//! that URL decides how the commit gets materialized (see [`Route`]).

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A content-addressed commit identifier in the replication store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// How an endpoint's commit reaches the local repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    /// Download and extract a prepackaged archive.
    Download(&'a str),
    /// Pull the commit over the replication protocol.
    Pull(&'a CommitId),
}

/// One side of a delta: a commit plus an optional archive that contains it.
///
/// Encoded on the wire as a `[commit, url]` array; an empty or absent url
/// means the commit has no archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "(String, String)")]
pub struct Endpoint {
    pub commit: CommitId,
    pub archive_url: Option<String>,
}

impl Endpoint {
    /// An endpoint that must be pulled.
    pub fn pull(commit: impl Into<CommitId>) -> Self {
        Self {
            commit: commit.into(),
            archive_url: None,
        }
    }

    /// An endpoint backed by an archive.
    pub fn archive(commit: impl Into<CommitId>, url: impl Into<String>) -> Self {
        Self::new(commit, url)
    }

    /// Build from the raw pair; an empty url is treated as absent.
    pub fn new(commit: impl Into<CommitId>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            commit: commit.into(),
            archive_url: (!url.trim().is_empty()).then_some(url),
        }
    }

    /// Archives win whenever one is available.
    pub fn route(&self) -> Route<'_> {
        match self.archive_url.as_deref() {
            Some(url) => Route::Download(url),
            None => Route::Pull(&self.commit),
        }
    }
}

impl TryFrom<Vec<String>> for Endpoint {
    type Error = String;

    fn try_from(parts: Vec<String>) -> Result<Self, Self::Error> {
        let mut parts = parts.into_iter();
        let commit = parts
            .next()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| "endpoint is missing a commit id".to_string())?;
        let url = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(format!(
                "endpoint for {commit} has more than two elements; expected [commit, url]"
            ));
        }
        Ok(Self::new(commit, url))
    }
}

impl From<Endpoint> for (String, String) {
    fn from(e: Endpoint) -> Self {
        (e.commit.0, e.archive_url.unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// A requested incremental update: `froms` may each be turned into `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub to: Endpoint,
    #[serde(rename = "from", alias = "froms", default)]
    pub froms: Vec<Endpoint>,
}

impl Delta {
    pub fn new(to: Endpoint, froms: Vec<Endpoint>) -> Self {
        Self { to, froms }
    }

    /// `to` first, then every `from` in declaration order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        std::iter::once(&self.to).chain(self.froms.iter())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
