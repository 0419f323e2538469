//! Content-addressed blob storage.
//!
//! Uploaded documents are stored under the SHA-256 digest of their bytes, so
//! the identifier returned by [`ObjectStore::store`] is enough to fetch and
//! verify them later.


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::{RagError, Result};

const CID_LEN: usize = 64;

/// Content identifier: lowercase hex SHA-256 of the stored bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    #[inline]
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Cid {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        let valid = s.len() == CID_LEN
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(RagError::Store(format!("Malformed content id: {:?}", s)))
        }
    }
}

impl TryFrom<String> for Cid {
    type Error = RagError;

    #[inline]
    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Cid> for String {
    #[inline]
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl fmt::Display for Cid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist `bytes` and return their content id
    async fn store(&self, bytes: Vec<u8>) -> Result<Cid>;

    /// Bytes previously stored under `cid`
    async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>>;
}

/// Object store on the local filesystem, sharded by the first two hex digits
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, cid: &Cid) -> PathBuf {
        let (shard, _) = cid.as_str().split_at(2);
        self.root.join(shard).join(cid.as_str())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn store(&self, bytes: Vec<u8>) -> Result<Cid> {
        let cid = Cid::for_bytes(&bytes);
        let path = self.object_path(&cid);

        if tokio::fs::try_exists(&path).await? {
            debug!("Object {} already stored", cid);
            return Ok(cid);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RagError::Store(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        info!("Stored object {} ({} bytes)", cid, bytes.len());
        Ok(cid)
    }

    async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>> {
        let path = self.object_path(cid);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::Store(format!("Object {} not found", cid)));
            }
            Err(e) => return Err(e.into()),
        };

        if Cid::for_bytes(&bytes) != *cid {
            warn!("Object {} failed integrity check", cid);
            return Err(RagError::Store(format!(
                "Object {} does not match its content id",
                cid
            )));
        }

        debug!("Fetched object {} ({} bytes)", cid, bytes.len());
        Ok(bytes)
    }
}
