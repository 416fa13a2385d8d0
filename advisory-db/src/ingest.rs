use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::cve_sources::nvd;
use crate::db::{models::Advisory, SqliteRepository, StoreError};

/// What one ingestion run did. `written` counts advisories committed;
/// `skipped` records with no resolvable id; `failed_records` per-record
/// failures that rolled back; `failed_batches` raw files that could not be
/// read at all.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub written: u32,
    pub skipped: u32,
    pub failed_records: u32,
    pub failed_batches: u32,
}

impl IngestReport {
    fn absorb(&mut self, other: IngestReport) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failed_records += other.failed_records;
        self.failed_batches += other.failed_batches;
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} advisories written, {} skipped, {} failed, {} unreadable batches",
            self.written, self.skipped, self.failed_records, self.failed_batches
        )
    }
}

/// Normalize every pending raw batch under `data_path` into the store. An
/// unreadable batch is counted and the run moves on; only storage
/// unavailability aborts.
pub fn ingest_dir(repository: &SqliteRepository, data_path: &Path) -> Result<IngestReport> {
    let batches = nvd::pending_batches(data_path)?;
    if batches.is_empty() {
        log::info!("no raw batches found in {}", data_path.display());
        return Ok(IngestReport::default());
    }

    log::info!(
        "importing {} {} batches from {} ...",
        batches.len(),
        nvd::SOURCE_NAME,
        data_path.display()
    );

    let mut report = IngestReport::default();
    for path in batches {
        log::info!("processing {} ...", path.display());
        match nvd::read_batch(&path) {
            Ok(items) => {
                let batch_report = ingest_batch(repository, &items)
                    .with_context(|| format!("storage failure in {}", path.display()))?;
                report.absorb(batch_report);
            }
            Err(e) => {
                log::warn!("abandoning batch {}: {:#}", path.display(), e);
                report.failed_batches += 1;
            }
        }
    }

    Ok(report)
}

/// Ingest one raw batch, record by record. A record that cannot be
/// extracted or committed never aborts the rest of the batch; the only
/// error surfaced to the caller is the storage becoming unavailable.
pub fn ingest_batch(
    repository: &SqliteRepository,
    items: &[Value],
) -> Result<IngestReport, StoreError> {
    let mut report = IngestReport::default();

    for item in items {
        let Some(record) = nvd::extract::extract(item) else {
            report.skipped += 1;
            continue;
        };

        let raw_payload = match serde_json::to_string(&record.raw) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("could not serialize payload for {}: {}", record.id, e);
                report.failed_records += 1;
                continue;
            }
        };

        let uris = nvd::cpe_match::collect_cpe_uris(item);
        let advisory = Advisory::with(
            record.id,
            record.summary,
            record.published,
            record.last_modified,
            record.score,
            record.vector,
            raw_payload,
        );

        match repository.upsert_advisory(&advisory, &uris) {
            Ok(()) => {
                report.written += 1;
                if report.written % 100 == 0 {
                    log::info!("written {} advisories ...", report.written);
                }
            }
            Err(StoreError::Unavailable(e)) => return Err(StoreError::Unavailable(e)),
            Err(StoreError::Query(e)) => {
                log::warn!("rolled back {}: {}", advisory.id, e);
                report.failed_records += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::{json, Value};

    use super::{ingest_batch, ingest_dir, IngestReport};
    use crate::db::SqliteRepository;

    fn sample_item() -> Value {
        json!({
            "cve": {
                "id": "CVE-2099-0001",
                "descriptions": [{"lang": "en", "value": "Test issue"}]
            },
            "configurations": [
                {"nodes": [
                    {"cpeMatch": [
                        {"criteria": "cpe:2.3:a:Example_Corp:Widget:1.2:*:*:*:*:*:*:*"}
                    ]}
                ]}
            ]
        })
    }

    #[test]
    fn a_batch_is_normalized_into_the_store() {
        let repository = SqliteRepository::in_memory();

        let report = ingest_batch(&repository, &[sample_item()]).unwrap();
        assert_eq!(1, report.written);

        let advisory = repository.get_advisory("CVE-2099-0001").unwrap().unwrap();
        assert_eq!("Test issue", advisory.summary);
        assert!(!advisory.raw_payload.is_empty());

        let matches = repository.get_matches("CVE-2099-0001").unwrap();
        assert_eq!(1, matches.len());
        assert_eq!(Some("example_corp".to_owned()), matches[0].vendor);
        assert_eq!(Some("widget".to_owned()), matches[0].product);
        assert_eq!(Some("1.2".to_owned()), matches[0].version);
    }

    #[test]
    fn ingestion_is_idempotent() {
        let repository = SqliteRepository::in_memory();
        let batch = [sample_item()];

        ingest_batch(&repository, &batch).unwrap();
        let first_matches = repository.get_matches("CVE-2099-0001").unwrap();

        ingest_batch(&repository, &batch).unwrap();
        let second = repository.get_advisory("CVE-2099-0001").unwrap().unwrap();
        let second_matches = repository.get_matches("CVE-2099-0001").unwrap();

        assert_eq!("Test issue", second.summary);
        assert_eq!(first_matches.len(), second_matches.len());
        assert_eq!(
            first_matches[0].uri, second_matches[0].uri,
            "re-ingestion must not grow the association set"
        );
    }

    #[test]
    fn re_ingestion_replaces_the_association_set() {
        let repository = SqliteRepository::in_memory();

        ingest_batch(&repository, &[sample_item()]).unwrap();

        let mut reduced = sample_item();
        reduced["configurations"] = json!([
            {"nodes": [
                {"cpeMatch": [
                    {"criteria": "cpe:2.3:a:Example_Corp:Gadget:2.0:*:*:*:*:*:*:*"}
                ]}
            ]}
        ]);
        ingest_batch(&repository, &[reduced]).unwrap();

        let matches = repository.get_matches("CVE-2099-0001").unwrap();
        assert_eq!(1, matches.len());
        assert_eq!(Some("gadget".to_owned()), matches[0].product);
    }

    #[test]
    fn a_record_without_an_id_is_skipped_not_fatal() {
        let repository = SqliteRepository::in_memory();

        let batch = [
            json!({"cve": {"descriptions": "scalar instead of a list"}}),
            sample_item(),
        ];
        let report = ingest_batch(&repository, &batch).unwrap();

        assert_eq!(1, report.written);
        assert_eq!(1, report.skipped);
        assert!(repository.get_advisory("CVE-2099-0001").unwrap().is_some());
    }

    #[test]
    fn an_unreadable_batch_file_does_not_abort_the_run() {
        let repository = SqliteRepository::in_memory();
        let dir = tempfile::tempdir().unwrap();

        let good = json!({"vulnerabilities": [sample_item()]});
        fs::write(
            dir.path().join("cves_0_1.json"),
            serde_json::to_string(&good).unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join("cves_200_0.json"), "{ not json").unwrap();

        let report = ingest_dir(&repository, dir.path()).unwrap();

        assert_eq!(1, report.written);
        assert_eq!(1, report.failed_batches);
        assert!(repository.get_advisory("CVE-2099-0001").unwrap().is_some());
    }

    #[test]
    fn an_empty_input_directory_reports_zero() {
        let repository = SqliteRepository::in_memory();
        let dir = tempfile::tempdir().unwrap();

        let report = ingest_dir(&repository, dir.path()).unwrap();
        assert_eq!(IngestReport::default(), report);

        let missing = dir.path().join("nothing_here");
        let report = ingest_dir(&repository, &missing).unwrap();
        assert_eq!(IngestReport::default(), report);
    }
}
