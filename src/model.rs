use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage providers a chunk can be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "gdrive")]
    GoogleDrive,
    #[serde(rename = "dropbox")]
    Dropbox,
    #[serde(rename = "onedrive")]
    OneDrive,
    #[serde(rename = "mega")]
    Mega,
    #[serde(rename = "ipfs")]
    Ipfs,
    /// Directory-backed store (mounted share, removable disk, ...)
    #[serde(rename = "folder")]
    Folder,
    /// In-process store
    #[serde(rename = "memory")]
    Memory,
    /// Sentinel: the chunk stays in the local chunk directory only.
    #[serde(rename = "local")]
    Local,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GoogleDrive => "gdrive",
            Provider::Dropbox => "dropbox",
            Provider::OneDrive => "onedrive",
            Provider::Mega => "mega",
            Provider::Ipfs => "ipfs",
            Provider::Folder => "folder",
            Provider::Memory => "memory",
            Provider::Local => "local",
        }
    }

    /// Remote location a chunk with `chunk_id` is written to on this provider.
    pub fn remote_path(&self, chunk_id: &str) -> String {
        match self {
            Provider::GoogleDrive => format!("distributed-chunks/{}.chunk", chunk_id),
            Provider::Dropbox => format!("/Apps/DistributedChunks/{}.chunk", chunk_id),
            Provider::OneDrive => format!("DistributedChunks/{}.chunk", chunk_id),
            Provider::Mega => format!("chunks/{}.chunk", chunk_id),
            // content addressed
            Provider::Ipfs => chunk_id.to_string(),
            Provider::Folder | Provider::Memory | Provider::Local => {
                format!("chunks/{}.chunk", chunk_id)
            }
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gdrive" | "googledrive" | "google-drive" => Ok(Provider::GoogleDrive),
            "dropbox" => Ok(Provider::Dropbox),
            "onedrive" | "one-drive" => Ok(Provider::OneDrive),
            "mega" | "megacloud" => Ok(Provider::Mega),
            "ipfs" => Ok(Provider::Ipfs),
            "folder" | "dir" | "directory" => Ok(Provider::Folder),
            "memory" | "mem" => Ok(Provider::Memory),
            "local" => Ok(Provider::Local),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Account name used by the local-only sentinel destination.
pub const LOCAL_ACCOUNT: &str = "local";

/// A (provider, account) pair able to store and return chunk bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub provider: Provider,
    pub account: String,
}

impl Destination {
    pub fn new(provider: Provider, account: impl Into<String>) -> Self {
        Self {
            provider,
            account: account.into(),
        }
    }

    /// Placement used when no remote destination is configured.
    pub fn local_only() -> Self {
        Self::new(Provider::Local, LOCAL_ACCOUNT)
    }

    pub fn is_local_only(&self) -> bool {
        self.provider == Provider::Local
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.account)
    }
}
