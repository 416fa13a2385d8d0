use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

pub mod cpe_match;
pub mod extract;

pub const SOURCE_NAME: &str = "NVD";

const API_BASE: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// The advisory list lives under `vulnerabilities` in the 2.0 API shape and
/// under `CVE_Items` in the historical feeds.
const BATCH_KEYS: [&str; 2] = ["vulnerabilities", "CVE_Items"];

const RESULTS_PER_PAGE: usize = 200;
const PAGE_PAUSE: Duration = Duration::from_secs(6);

/// The API rejects lastModified windows above this.
const MAX_WINDOW_DAYS: i64 = 120;

/// Raw batch files waiting to be normalized, oldest page first.
pub fn pending_batches(data_path: &Path) -> Result<Vec<PathBuf>> {
    if !data_path.exists() {
        return Ok(vec![]);
    }

    let entries = fs::read_dir(data_path)
        .with_context(|| format!("could not read {}", data_path.display()))?;

    let mut batches = vec![];
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            batches.push(path);
        }
    }
    batches.sort();

    Ok(batches)
}

pub fn read_batch(path: &Path) -> Result<Vec<Value>> {
    let file =
        File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let reader = BufReader::new(file);

    let document: Value = serde_json::from_reader(reader)
        .with_context(|| format!("could not parse {}", path.display()))?;

    Ok(batch_items(&document))
}

/// The record list of one raw batch document. A missing or ill-typed list
/// reads as an empty batch rather than an error.
pub fn batch_items(document: &Value) -> Vec<Value> {
    for key in BATCH_KEYS {
        if let Some(items) = document.get(key).and_then(Value::as_array) {
            return items.clone();
        }
    }
    vec![]
}

/// Page through every advisory modified inside `[start, end]` and persist
/// each response page unmodified under `data_path`, one file per page, for
/// the ingestion driver to pick up later.
pub fn fetch_window(
    data_path: &Path,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    api_key: Option<&str>,
) -> Result<Vec<PathBuf>> {
    if end - start > chrono::Duration::days(MAX_WINDOW_DAYS) {
        bail!(
            "date range larger than {} days, use a smaller window",
            MAX_WINDOW_DAYS
        );
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(Some(Duration::from_secs(30)))
        .user_agent(concat!("halley/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("could not create http client")?;

    let mut saved = vec![];
    let mut start_index = 0usize;
    let mut total_results: Option<usize> = None;

    loop {
        log::info!("requesting chunk at index {} ...", start_index);

        let mut request = client
            .get(API_BASE)
            .query(&[
                (
                    "lastModStartDate",
                    start.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (
                    "lastModEndDate",
                    end.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                ("resultsPerPage", RESULTS_PER_PAGE.to_string()),
                ("startIndex", start_index.to_string()),
            ])
            .header("Accept", "application/json");
        if let Some(key) = api_key {
            request = request.header("apiKey", key);
        }

        let response = request
            .send()
            .context("error requesting page")?
            .error_for_status()
            .context("api request rejected")?;
        let body = response.text().context("error reading page body")?;

        let document: Value =
            serde_json::from_str(&body).context("could not parse api response")?;
        let page_len = batch_items(&document).len();

        let total = *total_results.get_or_insert_with(|| {
            document
                .get("totalResults")
                .and_then(Value::as_u64)
                .map_or(page_len, |n| n as usize)
        });

        let mut file_name = data_path.to_path_buf();
        file_name.push(format!("cves_{}_{}.json", start_index, page_len));
        fs::write(&file_name, &body)
            .with_context(|| format!("could not write {}", file_name.display()))?;
        log::info!("saved {}", file_name.display());
        saved.push(file_name);

        start_index += page_len;
        if page_len == 0 || start_index >= total {
            break;
        }

        log::info!(
            "sleeping {}s to respect rate limits ...",
            PAGE_PAUSE.as_secs()
        );
        thread::sleep(PAGE_PAUSE);
    }

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::batch_items;

    #[test]
    fn finds_the_list_under_either_top_level_key() {
        let current = json!({"vulnerabilities": [{"cve": {"id": "CVE-2024-0001"}}]});
        assert_eq!(1, batch_items(&current).len());

        let legacy = json!({"CVE_Items": [{}, {}]});
        assert_eq!(2, batch_items(&legacy).len());
    }

    #[test]
    fn anything_else_reads_as_an_empty_batch() {
        assert!(batch_items(&json!({})).is_empty());
        assert!(batch_items(&json!({"vulnerabilities": "scalar"})).is_empty());
        assert!(batch_items(&json!([1, 2, 3])).is_empty());
    }
}
