use std::{
    env::current_dir,
    fs::{self, remove_file, OpenOptions},
    io::Write,
    net::IpAddr,
    path::{Path, PathBuf},
};
#[cfg(feature = "progress_bar")]
use std::{
    fmt::{Display, Formatter},
    sync::atomic::{AtomicUsize, Ordering},
};

#[cfg(feature = "progress_bar")]
use colored::Colorize;
use fake::{faker::internet::en::UserAgent, Fake};
use http_body_util::{BodyExt, Empty};
use hyper::{body::Bytes, Request};
use hyper_tls::HttpsConnector;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use maxminddb::{geoip2::City, Reader};
#[cfg(feature = "progress_bar")]
use status_line::StatusLine;
#[cfg(feature = "progress_bar")]
use tokio::time;

const GEOLITE_ENDPOINT_URL: &str =
    "https://raw.githubusercontent.com/P3TERX/GeoLite.mmdb/download/GeoLite2-City.mmdb";
const GEOLITE_FILE_NAME: &str = "geolite2-city.mmdb";

#[cfg(feature = "progress_bar")]
/// Download progress for the GeoLite2 database.
struct Progress {
    progress: AtomicUsize,
    max: f64,
    timer: time::Instant,
}

#[cfg(feature = "progress_bar")]
impl Display for Progress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let percent = if self.max > 0.0 {
            (self.progress.load(Ordering::Relaxed) as f64 / self.max) * 100.0
        } else {
            0.0
        };
        write!(
            f,
            "{} {} Downloading GeoLite2-City.mmdb: {:.2}%",
            format!("{}:", module_path!()).bright_blue(),
            "INFO".bright_blue(),
            percent
        )
    }
}

#[cfg(all(feature = "progress_bar", feature = "log"))]
impl Drop for Progress {
    fn drop(&mut self) {
        log::debug!(
            "Finished downloading GeoLite2-City.mmdb in {:?}",
            self.timer.elapsed()
        );
    }
}

/// Retrieves the data directory path for the application.
///
/// # Returns
///
/// A `PathBuf` representing the path to the data directory.
fn data_dir() -> anyhow::Result<PathBuf> {
    if let Some(base_dirs) = directories::BaseDirs::new() {
        let mut dir = base_dirs.data_dir().to_path_buf();
        dir.push(env!("CARGO_PKG_NAME"));

        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    } else {
        #[cfg(feature = "log")]
        log::warn!("Failed to get local data directory, using current directory instead");
        Ok(current_dir().unwrap_or_default())
    }
}

/// Downloads the GeoLite2 database to `mmdb_path`, replacing any existing file.
///
/// # Arguments
///
/// * `mmdb_path`: The path where the database file will be saved.
pub async fn download_database(mmdb_path: &Path) -> anyhow::Result<()> {
    let https_connector = HttpsConnector::new();
    let client = Client::builder(TokioExecutor::new()).build(https_connector);

    let req = Request::builder()
        .uri(GEOLITE_ENDPOINT_URL)
        .header(hyper::header::USER_AGENT, UserAgent().fake::<&str>())
        .body(Empty::<Bytes>::new())?;

    let mut response = client.request(req).await?;
    if !response.status().is_success() {
        anyhow::bail!("GeoLite2 download failed with status {}", response.status());
    }

    #[cfg(feature = "progress_bar")]
    let max_size = if let Some(length) = response.headers().get(hyper::header::CONTENT_LENGTH) {
        length.to_str().map(|v| v.parse::<f64>().unwrap_or(0.0))?
    } else {
        0.0
    };

    #[cfg(feature = "progress_bar")]
    let status = StatusLine::new(Progress {
        progress: AtomicUsize::new(0),
        timer: time::Instant::now(),
        max: max_size,
    });

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(mmdb_path)?;

    while let Some(next) = response.frame().await {
        let frame = next?;
        if let Some(chunk) = frame.data_ref() {
            #[cfg(feature = "progress_bar")]
            status.progress.fetch_add(chunk.len(), Ordering::Relaxed);
            file.write_all(chunk)?;
        }
    }
    Ok(())
}

/// IP to country lookups backed by a GeoLite2 database.
pub struct GeoLookup {
    reader: Reader<Vec<u8>>,
}

impl GeoLookup {
    /// Opens the database in the application data directory, downloading it
    /// first if it is missing.
    pub async fn new() -> anyhow::Result<Self> {
        let mut mmdb_path = data_dir()?;
        mmdb_path.push(GEOLITE_FILE_NAME);

        if !mmdb_path.exists() {
            #[cfg(feature = "log")]
            log::debug!("{} does not exist, downloading", mmdb_path.display());
            download_database(&mmdb_path).await?;
        }

        match Self::open(&mmdb_path) {
            Ok(lookup) => Ok(lookup),
            Err(e) => {
                // a truncated download would otherwise fail on every run
                remove_file(&mmdb_path)?;
                Err(e)
            }
        }
    }

    /// Opens an existing database file.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self { reader })
    }

    /// Looks up the ISO country code for `ip`.
    ///
    /// # Returns
    ///
    /// The alpha-2 code, or `None` if the address is not in the database.
    pub fn lookup(&self, ip: IpAddr) -> Option<String> {
        let city = self.reader.lookup::<City>(ip).ok()?;
        city.country?.iso_code.map(ToString::to_string)
    }
}
