use serde_json::Value;

/// The key conventionally naming a candidate-match list, wherever it
/// appears in the document.
const MATCH_LIST_KEY: &str = "cpeMatch";

/// Identifier-bearing fields of one match entry, in priority order.
const URI_KEYS: [&str; 3] = ["criteria", "cpe23Uri", "cpe22Uri"];

/// Collect every CPE URI reachable from `value`, wherever a `cpeMatch` list
/// appears. The `configurations` layout has changed shape more than once
/// across API versions, so no structure is assumed: the whole tree is
/// walked, depth first, a node's own matches before its children's.
/// Duplicates are kept; the store collapses them on insert.
pub fn collect_cpe_uris(value: &Value) -> Vec<String> {
    let mut uris = vec![];
    visit(value, &mut uris);
    uris
}

fn visit(value: &Value, uris: &mut Vec<String>) {
    match value {
        Value::Object(fields) => {
            if let Some(Value::Array(entries)) = fields.get(MATCH_LIST_KEY) {
                for entry in entries {
                    collect_entry(entry, uris);
                }
            }
            for child in fields.values() {
                visit(child, uris);
            }
        }
        Value::Array(items) => {
            for item in items {
                visit(item, uris);
            }
        }
        _ => {}
    }
}

fn collect_entry(entry: &Value, uris: &mut Vec<String>) {
    for key in URI_KEYS {
        if let Some(uri) = entry.get(key).and_then(Value::as_str) {
            if !uri.is_empty() {
                uris.push(uri.to_owned());
                return;
            }
        }
    }
}
