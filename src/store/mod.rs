//! JSON persistence of scraped listings, one entry per category

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::models::Listing;

/// Listings of every scraped category, keyed by category key
pub type StoredListings = BTreeMap<String, Vec<Listing>>;

/// JSON file holding the last scrape of each category.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct ListingStore {
    path: PathBuf,
}

impl ListingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load_all(&self) -> Result<StoredListings> {
        match self.read_contents().await? {
            Some(contents) => self.parse(&contents),
            None => Ok(StoredListings::new()),
        }
    }

    pub async fn load_category(&self, key: &str) -> Result<Option<Vec<Listing>>> {
        let mut all = self.load_all().await?;
        Ok(all.remove(key))
    }

    /// Replace one category's listings, keeping every other category.
    ///
    /// A store file that no longer parses is moved to `<path>.corrupt` and
    /// the save starts from an empty map.
    pub async fn save_category(&self, key: &str, listings: &[Listing]) -> Result<()> {
        let mut all = match self.read_contents().await? {
            Some(contents) => match self.parse(&contents) {
                Ok(all) => all,
                Err(e) => {
                    let aside = self.sibling(".corrupt");
                    warn!("{:#}; moving it to {}", e, aside.display());
                    tokio::fs::rename(&self.path, &aside)
                        .await
                        .with_context(|| format!("Failed to move {} aside", self.path.display()))?;
                    StoredListings::new()
                }
            },
            None => StoredListings::new(),
        };
        all.insert(key.to_string(), listings.to_vec());

        let json = serde_json::to_string_pretty(&all).context("Failed to serialize listings")?;
        self.write_atomic(json.as_bytes()).await?;

        info!(
            "Saved {} {} listing(s) to {}",
            listings.len(),
            key,
            self.path.display()
        );
        Ok(())
    }

    /// File contents, or `None` when there is nothing stored yet
    async fn read_contents(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(None),
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No listing store at {}", self.path.display());
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    fn parse(&self, contents: &str) -> Result<StoredListings> {
        serde_json::from_str(contents)
            .with_context(|| format!("Failed to parse listing store {}", self.path.display()))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    async fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.sibling(".tmp");

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
