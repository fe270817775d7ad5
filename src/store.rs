//! Writes finished records to a local CSV file or uploads them to an object
//! store, depending on `Settings::aws_env`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::PersistenceError;
use crate::record::{ProductRecord, CSV_COLUMNS};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Csv(PathBuf),
    ObjectStore { endpoint: String, bucket: String, key: String },
}

impl StoreTarget {
    pub fn from_settings(settings: &Settings, now: DateTime<Local>) -> Result<Self, PersistenceError> {
        if !settings.aws_env {
            let path = settings.output_dir.join(format!("{}.csv", settings.client));
            return Ok(Self::Csv(path));
        }

        let endpoint = settings
            .object_store_endpoint
            .clone()
            .ok_or(PersistenceError::MissingSetting("object_store_endpoint"))?;
        let bucket = settings
            .s3_bucket
            .clone()
            .ok_or(PersistenceError::MissingSetting("s3_bucket"))?;
        Ok(Self::ObjectStore {
            endpoint,
            bucket,
            key: object_key(&settings.client, now),
        })
    }
}

/// `ScraperData/<year>/<month>/<day>/<hour>/<minute>/<client>_lambda.csv`
pub fn object_key(client: &str, now: DateTime<Local>) -> String {
    format!(
        "ScraperData/{}/{}/{}/{}/{}/{}_lambda.csv",
        now.format("%Y"),
        now.format("%-m"),
        now.format("%-d"),
        now.format("%-H"),
        now.format("%-M"),
        client
    )
}

pub async fn store_records(records: &[ProductRecord], settings: &Settings) -> Result<(), PersistenceError> {
    match StoreTarget::from_settings(settings, Local::now())? {
        StoreTarget::Csv(path) => append_csv(records, &path),
        StoreTarget::ObjectStore { endpoint, bucket, key } => {
            upload(records, &endpoint, &bucket, &key).await
        }
    }
}

/// Appends rows to `path`, writing the header only when the file is new.
pub fn append_csv(records: &[ProductRecord], path: &Path) -> Result<(), PersistenceError> {
    let io_err = |source: std::io::Error| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file_exists = path.exists();
    tracing::debug!(path = %path.display(), file_exists, "appending records");

    let mut body = String::new();
    if !file_exists {
        body.push_str(&header_row());
    }
    for record in records {
        body.push_str(&row(record));
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(body.as_bytes()).map_err(io_err)?;

    tracing::info!(path = %path.display(), records = records.len(), "records written");
    Ok(())
}

async fn upload(
    records: &[ProductRecord],
    endpoint: &str,
    bucket: &str,
    key: &str,
) -> Result<(), PersistenceError> {
    let mut body = header_row();
    for record in records {
        body.push_str(&row(record));
    }

    let url = format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key);
    tracing::debug!(bucket, key, "uploading records");

    let client = wreq::Client::builder()
        .build()
        .map_err(|e| PersistenceError::Upload(e.to_string()))?;
    let resp = client
        .put(&url)
        .header("Content-Type", "text/csv")
        .body(body)
        .send()
        .await
        .map_err(|e| PersistenceError::Upload(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(PersistenceError::Upload(format!("HTTP {status} for {url}")));
    }
    tracing::info!(bucket, key, records = records.len(), "records uploaded");
    Ok(())
}

fn header_row() -> String {
    let mut line = CSV_COLUMNS.join(",");
    line.push('\n');
    line
}

fn row(record: &ProductRecord) -> String {
    let mut line = record
        .csv_values()
        .iter()
        .map(|v| sanitize(v))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Cells carry no separators or quotes.
fn sanitize(value: &str) -> String {
    value.replace([',', '"', '\''], "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn object_key_uses_unpadded_time_parts() {
        let now = Local.with_ymd_and_hms(2022, 6, 3, 9, 5, 0).unwrap();
        assert_eq!(object_key("bambi", now), "ScraperData/2022/6/3/9/5/bambi_lambda.csv");
    }

    #[test]
    fn sanitize_strips_separators_and_quotes() {
        assert_eq!(sanitize(" 1.152 Stück, \"Made in Germany\" "), "1.152 Stück Made in Germany");
        assert_eq!(sanitize("Bob's"), "Bobs");
    }
}
