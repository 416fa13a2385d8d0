use serde_json::Value;

/// The canonical shape of one advisory, independent of which source schema
/// variant produced it. `raw` keeps the input unchanged for audit/replay.
#[derive(Debug, Clone)]
pub struct AdvisoryRecord {
    pub id: String,
    pub summary: String,
    pub published: Option<String>,
    pub last_modified: Option<String>,
    pub score: Option<f64>,
    pub vector: Option<String>,
    pub raw: Value,
}

const CANONICAL_LANG: &str = "en";

/// Versioned metric containers, newest scoring scheme first.
const METRIC_KEYS: [&str; 4] = ["cvssMetricV31", "cvssMetricV30", "cvssV3", "cvssV3Metrics"];

const ID_PATHS: [&[&str]; 3] = [&["cve", "id"], &["cve", "CVE_data_meta", "ID"], &["id"]];

const DESCRIPTION_PATHS: [&[&str]; 3] = [
    &["cve", "descriptions"],
    &["descriptions"],
    &["cve", "description", "description_data"],
];

const PUBLISHED_PATHS: [&[&str]; 3] = [&["published"], &["cve", "published"], &["publishedDate"]];

const LAST_MODIFIED_PATHS: [&[&str]; 3] = [
    &["lastModified"],
    &["cve", "lastModified"],
    &["lastModifiedDate"],
];

const METRICS_PATHS: [&[&str]; 2] = [&["metrics"], &["cve", "metrics"]];

/// Map one raw advisory object to its canonical record. `None` only when no
/// advisory id is resolvable; every other lookup degrades to an absent
/// field instead of failing.
pub fn extract(item: &Value) -> Option<AdvisoryRecord> {
    let id = lookup(item, &ID_PATHS).and_then(Value::as_str)?.to_owned();

    let (score, vector) = severity_of(item);

    Some(AdvisoryRecord {
        id,
        summary: summary_of(item),
        published: lookup_str(item, &PUBLISHED_PATHS),
        last_modified: lookup_str(item, &LAST_MODIFIED_PATHS),
        score,
        vector,
        raw: item.clone(),
    })
}

/// Follow one candidate path into the document.
fn walk<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Try the candidate locations of a logical field in priority order; the
/// first present, non-null value wins.
fn lookup<'a>(value: &'a Value, candidates: &[&[&str]]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|path| walk(value, path))
        .find(|found| !found.is_null())
}

fn lookup_str(value: &Value, candidates: &[&[&str]]) -> Option<String> {
    lookup(value, candidates)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// First canonical-language entry of whichever language-tagged description
/// list is present. Absent list or no matching tag reads as empty.
fn summary_of(item: &Value) -> String {
    for path in DESCRIPTION_PATHS {
        let Some(entries) = walk(item, path).and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            if entry.get("lang").and_then(Value::as_str) == Some(CANONICAL_LANG) {
                return entry
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
            }
        }
    }
    String::new()
}

/// CVSS v3 score and vector. The versioned list-shaped keys are tried
/// newest-first and the first candidate with a non-null score wins; the
/// legacy singular `baseMetricV3` form is a last resort.
fn severity_of(item: &Value) -> (Option<f64>, Option<String>) {
    let Some(metrics) = lookup(item, &METRICS_PATHS).filter(|m| m.is_object()) else {
        return (None, None);
    };

    let mut score = None;
    let mut vector = None;

    for key in METRIC_KEYS {
        let Some(entry) = metrics
            .get(key)
            .and_then(Value::as_array)
            .and_then(|list| list.first())
        else {
            continue;
        };

        // the score/vector live either directly on the entry or one level
        // down under cvssData
        let data = entry.get("cvssData").unwrap_or(entry);

        if let Some(found) = data.get("baseScore").and_then(Value::as_f64) {
            score = Some(found);
        }
        if let Some(found) = data.get("vectorString").and_then(Value::as_str) {
            vector = Some(found.to_owned());
        }

        if score.is_some() {
            break;
        }
    }

    if score.is_none() {
        if let Some(data) = metrics.get("baseMetricV3").and_then(|m| m.get("cvssData")) {
            score = data.get("baseScore").and_then(Value::as_f64);
            vector = data
                .get("vectorString")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or(vector);
        }
    }

    (score, vector)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::extract;

    #[test]
    fn extracts_a_v2_api_record() {
        let item = json!({
            "cve": {
                "id": "CVE-2099-0001",
                "descriptions": [
                    {"lang": "fr", "value": "Problème de test"},
                    {"lang": "en", "value": "Test issue"}
                ],
                "published": "2099-01-02T00:00:00.000",
                "metrics": {
                    "cvssMetricV31": [
                        {"cvssData": {"baseScore": 7.5, "vectorString": "CVSS:3.1/AV:N"}}
                    ]
                }
            }
        });

        let record = extract(&item).unwrap();
        assert_eq!("CVE-2099-0001", record.id);
        assert_eq!("Test issue", record.summary);
        assert_eq!(Some("2099-01-02T00:00:00.000".to_owned()), record.published);
        assert_eq!(Some(7.5), record.score);
        assert_eq!(Some("CVSS:3.1/AV:N".to_owned()), record.vector);
        assert_eq!(item, record.raw);
    }

    #[test]
    fn finds_the_legacy_id_location() {
        let item = json!({"cve": {"CVE_data_meta": {"ID": "CVE-2014-9999"}}});
        assert_eq!("CVE-2014-9999", extract(&item).unwrap().id);
    }

    #[test]
    fn a_record_without_an_id_is_rejected() {
        assert!(extract(&json!({"cve": {"descriptions": []}})).is_none());
        assert!(extract(&json!("not an object")).is_none());
        assert!(extract(&json!(null)).is_none());
    }

    #[test_case("published" ; "current spelling")]
    #[test_case("publishedDate" ; "legacy spelling")]
    fn published_date_is_found_under_either_spelling(key: &str) {
        let mut item = json!({"cve": {"id": "CVE-2020-1234"}});
        item[key] = json!("2020-06-01T12:00:00.000");

        let record = extract(&item).unwrap();
        assert_eq!(Some("2020-06-01T12:00:00.000".to_owned()), record.published);
    }

    #[test]
    fn dates_nested_in_the_cve_object_are_found() {
        let item = json!({
            "cve": {
                "id": "CVE-2020-1234",
                "published": "2020-06-01T12:00:00.000",
                "lastModified": "2020-07-01T12:00:00.000"
            }
        });

        let record = extract(&item).unwrap();
        assert_eq!(Some("2020-06-01T12:00:00.000".to_owned()), record.published);
        assert_eq!(
            Some("2020-07-01T12:00:00.000".to_owned()),
            record.last_modified
        );
    }

    #[test]
    fn missing_dates_are_tolerated() {
        let record = extract(&json!({"cve": {"id": "CVE-2020-1234"}})).unwrap();
        assert_eq!(None, record.published);
        assert_eq!(None, record.last_modified);
        assert_eq!("", record.summary);
    }

    #[test]
    fn the_versioned_metric_keys_beat_the_legacy_form() {
        let item = json!({
            "cve": {"id": "CVE-2021-0001"},
            "metrics": {
                "baseMetricV3": {"cvssData": {"baseScore": 4.0, "vectorString": "legacy"}},
                "cvssMetricV31": [
                    {"cvssData": {"baseScore": 9.1, "vectorString": "CVSS:3.1/AV:N"}}
                ]
            }
        });

        let record = extract(&item).unwrap();
        assert_eq!(Some(9.1), record.score);
        assert_eq!(Some("CVSS:3.1/AV:N".to_owned()), record.vector);
    }

    #[test]
    fn the_legacy_form_is_a_last_resort() {
        let item = json!({
            "cve": {"id": "CVE-2021-0002"},
            "metrics": {
                "baseMetricV3": {"cvssData": {"baseScore": 4.0, "vectorString": "legacy"}}
            }
        });

        let record = extract(&item).unwrap();
        assert_eq!(Some(4.0), record.score);
        assert_eq!(Some("legacy".to_owned()), record.vector);
    }

    #[test]
    fn a_metric_entry_may_carry_the_score_directly() {
        let item = json!({
            "cve": {"id": "CVE-2021-0003"},
            "metrics": {
                "cvssV3": [{"baseScore": 6.5, "vectorString": "CVSS:3.0/AV:L"}]
            }
        });

        let record = extract(&item).unwrap();
        assert_eq!(Some(6.5), record.score);
    }

    #[test]
    fn an_empty_metric_list_falls_through_to_the_next_key() {
        let item = json!({
            "cve": {"id": "CVE-2021-0004"},
            "metrics": {
                "cvssMetricV31": [],
                "cvssMetricV30": [{"cvssData": {"baseScore": 5.0}}]
            }
        });

        assert_eq!(Some(5.0), extract(&item).unwrap().score);
    }

    #[test]
    fn an_ill_typed_metrics_container_reads_as_no_score() {
        let item = json!({
            "cve": {"id": "CVE-2021-0005"},
            "metrics": "not an object"
        });

        let record = extract(&item).unwrap();
        assert_eq!(None, record.score);
        assert_eq!(None, record.vector);
    }
}
