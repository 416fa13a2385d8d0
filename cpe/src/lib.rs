use serde::Serialize;

pub mod component;
pub mod types;

use component::Component;
use types::CpeType;

pub const CPE23_PREFIX: &str = "cpe:2.3:";
pub const CPE22_PREFIX: &str = "cpe:/";

/// The structured attributes of one CPE URI.
///
/// Decomposition is lenient on purpose: advisory feeds carry URIs in the 2.3
/// formatted-string binding, the 2.2 URI binding and, occasionally, with no
/// binding prefix at all. A string that cannot be split as expected keeps its
/// `raw` form and decomposes to all-`None` fields instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpeParts {
    pub raw: String,
    pub part: Option<CpeType>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

impl From<&str> for CpeParts {
    fn from(uri: &str) -> Self {
        let mut parts = Self {
            raw: uri.to_owned(),
            part: None,
            vendor: None,
            product: None,
            version: None,
        };

        if let Some(rest) = uri.strip_prefix(CPE23_PREFIX) {
            parts.fill_formatted(rest);
        } else if let Some(rest) = uri.strip_prefix(CPE22_PREFIX) {
            parts.fill_uri_binding(rest);
        } else {
            parts.fill_formatted(uri);
        }

        parts
    }
}

impl CpeParts {
    /// 2.3 formatted-string layout (also used for unprefixed input):
    /// `part:vendor:product:version:...`, trailing fields ignored.
    fn fill_formatted(&mut self, rest: &str) {
        let fields: Vec<&str> = rest.split(':').collect();
        if fields.len() < 4 {
            return;
        }

        self.part = fields[0].parse::<CpeType>().ok();
        self.vendor = Component::from(fields[1]).into_name();
        self.product = Component::from(fields[2]).into_name();
        self.version = Component::from(fields[3]).into_value();
    }

    /// 2.2 URI layout: `part:vendor:product` with an optional fourth
    /// version field.
    fn fill_uri_binding(&mut self, rest: &str) {
        let fields: Vec<&str> = rest.split(':').collect();
        if fields.len() < 3 {
            return;
        }

        self.part = fields[0].parse::<CpeType>().ok();
        self.vendor = Component::from(fields[1]).into_name();
        self.product = Component::from(fields[2]).into_name();
        self.version = fields
            .get(3)
            .and_then(|field| Component::from(*field).into_value());
    }

    pub fn is_unknown(&self) -> bool {
        self.part.is_none()
            && self.vendor.is_none()
            && self.product.is_none()
            && self.version.is_none()
    }
}
