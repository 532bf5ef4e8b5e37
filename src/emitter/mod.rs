//! Persistence of classified buckets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::fs;

use crate::{classifier::Bucket, decoder::encode_base64};

/// Receives the grouped raw links at the end of a run.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persists every bucket. Returns the number of files (or entries) written.
    async fn emit(&self, buckets: &HashMap<Bucket, Vec<String>>) -> anyhow::Result<usize>;
}

/// Writes one text file per bucket under a root directory.
///
/// Layout: `by_protocol/<protocol>.txt`, `by_country/<CC>.txt` and `all.txt`,
/// one link per line. Existing files are overwritten.
pub struct DirectorySink {
    root: PathBuf,
    base64_copies: bool,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base64_copies: false,
        }
    }

    /// Also write `<name>_base64.txt` next to each file, holding the whole
    /// list encoded as a subscription body.
    pub fn with_base64_copies(mut self, enabled: bool) -> Self {
        self.base64_copies = enabled;
        self
    }

    /// Path of the file a bucket is written to.
    pub fn path_for(&self, bucket: &Bucket) -> PathBuf {
        match bucket {
            Bucket::Protocol(protocol) => self
                .root
                .join("by_protocol")
                .join(format!("{}.txt", protocol)),
            Bucket::Country(code) => self.root.join("by_country").join(format!("{}.txt", code)),
            Bucket::All => self.root.join("all.txt"),
        }
    }

    async fn write(path: &Path, contents: &str) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, contents).await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for DirectorySink {
    async fn emit(&self, buckets: &HashMap<Bucket, Vec<String>>) -> anyhow::Result<usize> {
        let mut written = 0;
        for (bucket, raws) in buckets {
            let path = self.path_for(bucket);
            let mut contents = raws.join("\n");
            contents.push('\n');
            Self::write(&path, &contents).await?;
            written += 1;

            if self.base64_copies {
                let stem = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let copy = path.with_file_name(format!("{}_base64.txt", stem));
                Self::write(&copy, &encode_base64(&contents)).await?;
                written += 1;
            }

            #[cfg(feature = "log")]
            log::trace!("{}: {} links written to {}", bucket, raws.len(), path.display());
        }

        #[cfg(feature = "log")]
        log::info!("Wrote {} files under {}", written, self.root.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decoder::decode_base64, proxy::models::Protocol};

    fn buckets() -> HashMap<Bucket, Vec<String>> {
        let mut buckets = HashMap::new();
        buckets.insert(
            Bucket::Protocol(Protocol::Trojan),
            vec!["trojan://a@b.example:443".to_string(), "trojan://c@d.example:443".to_string()],
        );
        buckets.insert(Bucket::Country("DE".into()), vec!["trojan://a@b.example:443".to_string()]);
        buckets.insert(Bucket::All, vec!["trojan://a@b.example:443".to_string()]);
        buckets
    }

    #[tokio::test]
    async fn writes_one_file_per_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        assert_eq!(sink.emit(&buckets()).await.unwrap(), 3);

        let trojan = std::fs::read_to_string(dir.path().join("by_protocol/trojan.txt")).unwrap();
        assert_eq!(trojan.lines().count(), 2);
        assert!(dir.path().join("by_country/DE.txt").is_file());
        assert!(dir.path().join("all.txt").is_file());
    }

    #[tokio::test]
    async fn last_write_wins_and_base64_copies() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path()).with_base64_copies(true);
        sink.emit(&buckets()).await.unwrap();

        let mut second = HashMap::new();
        second.insert(Bucket::All, vec!["vless://x@y.example:8443".to_string()]);
        assert_eq!(sink.emit(&second).await.unwrap(), 2);

        let all = std::fs::read_to_string(dir.path().join("all.txt")).unwrap();
        assert_eq!(all, "vless://x@y.example:8443\n");
        let encoded = std::fs::read_to_string(dir.path().join("all_base64.txt")).unwrap();
        assert_eq!(decode_base64(&encoded).unwrap(), all);
    }
}
