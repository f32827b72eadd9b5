//! Talking to the remote archive.
//!
//! The archive is a plain directory tree served over HTTP, `YYYY/MM/DD/` holding every file
//! uploaded by every station that day.

use crate::{config::ArchiveConfig, error::FetchError};
use chrono::NaiveDate;
use log::debug;
use std::{fs::File, io::BufWriter, path::Path, time::Duration};

/// What a day listing request returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayListing {
    /// The file names linked from the day's index page.
    Entries(Vec<String>),
    /// The archive has nothing for that day.
    NoData,
}

/// Source of day listings and file downloads.
pub trait ArchiveClient {
    /// List everything in the archive for one calendar day.
    fn list_day(&self, date: NaiveDate) -> Result<DayListing, FetchError>;

    /// Download one file from a day directory into `dest`.
    fn download(&self, date: NaiveDate, fname: &str, dest: &Path) -> Result<(), FetchError>;
}

/// The real archive, over blocking HTTP.
pub struct HttpArchive {
    config: ArchiveConfig,
    client: reqwest::blocking::Client,
}

impl HttpArchive {
    pub fn new(config: ArchiveConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(HttpArchive { config, client })
    }
}

impl ArchiveClient for HttpArchive {
    fn list_day(&self, date: NaiveDate) -> Result<DayListing, FetchError> {
        let url = self.config.day_url(date);
        debug!(target: "archive", "listing {}", url);

        let response = self.client.get(&url).send()?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(DayListing::NoData);
        }

        let body = response.text()?;

        // The archive does not always set the status, so look at the body too.
        if body.contains(self.config.no_data_marker) {
            return Ok(DayListing::NoData);
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        Ok(DayListing::Entries(extract_hrefs(&body)))
    }

    fn download(&self, date: NaiveDate, fname: &str, dest: &Path) -> Result<(), FetchError> {
        let url = format!("{}{}", self.config.day_url(date), fname);
        debug!(target: "archive", "downloading {}", url);

        let mut response = self.client.get(&url).send()?.error_for_status()?;

        let mut out = BufWriter::new(File::create(dest)?);
        response.copy_to(&mut out)?;

        Ok(())
    }
}

/// Pull the `href` values out of the anchors of an index page.
pub fn extract_hrefs(html: &str) -> Vec<String> {
    let mut hrefs = vec![];
    let lower = html.to_ascii_lowercase();

    let mut pos = 0;
    while let Some(found) = lower[pos..].find("<a") {
        let tag_start = pos + found;
        let tag_end = match lower[tag_start..].find('>') {
            Some(e) => tag_start + e,
            None => break,
        };
        pos = tag_end;

        // Make sure this is an anchor and not something like <abbr>.
        let after = lower.as_bytes().get(tag_start + 2).copied().unwrap_or(b'>');
        if !(after.is_ascii_whitespace() || after == b'>') {
            continue;
        }

        let tag_lower = &lower[tag_start..tag_end];
        let tag = &html[tag_start..tag_end];

        if let Some(h) = tag_lower.find("href") {
            let rest = tag[h + 4..].trim_start();
            let rest = match rest.strip_prefix('=') {
                Some(r) => r.trim_start(),
                None => continue,
            };

            let value = match rest.chars().next() {
                Some(q @ '"') | Some(q @ '\'') => rest[1..].split(q).next().unwrap_or(""),
                Some(_) => rest
                    .split(|c: char| c.is_ascii_whitespace())
                    .next()
                    .unwrap_or(""),
                None => "",
            };

            if !value.is_empty() {
                hrefs.push(value.to_owned());
            }
        }
    }

    hrefs
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_extract_hrefs() {
        let html = r#"<html><body><h1>Index of /2021/03/01</h1>
<table>
<tr><td><a href="?C=N;O=D">Name</a></td></tr>
<tr><td><a href="/solarradio/data/2021/03/">Parent Directory</a></td></tr>
<tr><td><A HREF="ALASKA-HAARP_20210301_010000_01.fit.gz">ALASKA-HAARP_20210301_010000_01.fit.gz</A></td></tr>
<tr><td><a class="x" href='KRIM_20210301_010000_01.fit.gz'>KRIM</a></td></tr>
<tr><td><a href=GLASGOW_20210301_010000_01.fit.gz>GLASGOW</a></td></tr>
<tr><td><abbr title="x">not a link</abbr><a name="anchor">no href</a></td></tr>
</table></body></html>"#;

        assert_eq!(
            extract_hrefs(html),
            vec![
                "?C=N;O=D",
                "/solarradio/data/2021/03/",
                "ALASKA-HAARP_20210301_010000_01.fit.gz",
                "KRIM_20210301_010000_01.fit.gz",
                "GLASGOW_20210301_010000_01.fit.gz",
            ]
        );
    }

    #[test]
    fn test_extract_hrefs_empty() {
        assert!(extract_hrefs("").is_empty());
        assert!(extract_hrefs("<a href=").is_empty());
        assert!(extract_hrefs("<p>404 Not Found</p>").is_empty());
    }
}
