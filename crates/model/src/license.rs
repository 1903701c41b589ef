//! License content

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A parsed license
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Capability name to limit; a limit of 0 means the capability is absent
    pub capabilities: BTreeMap<String, u64>,
    /// Last day the license is valid
    pub expiry_date: NaiveDate,
}

impl License {
    /// Parse license content, as stored on a node
    pub fn parse(content: &str) -> ModelResult<Self> {
        serde_json::from_str(content).map_err(|e| ModelError::InvalidLicense(e.to_string()))
    }

    /// Serialize back to license content
    pub fn to_content(&self) -> ModelResult<String> {
        serde_json::to_string(self).map_err(|e| ModelError::InvalidLicense(e.to_string()))
    }

    /// Whether the capability is granted
    pub fn has_capability(&self, capability: &str) -> bool {
        self.limit(capability) != 0
    }

    /// The limit of a capability, 0 when absent
    pub fn limit(&self, capability: &str) -> u64 {
        self.capabilities.get(capability).copied().unwrap_or(0)
    }

    /// Whether the license is no longer valid on `date`
    pub fn is_expired_on(&self, date: NaiveDate) -> bool {
        date > self.expiry_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str =
        r#"{"capabilities":{"OffHeap":1024,"MultiStripe":1,"Backup":0},"expiryDate":"2030-06-30"}"#;

    #[test]
    fn test_parse_license() {
        let license = License::parse(CONTENT).unwrap();

        assert_eq!(license.limit("OffHeap"), 1024);
        assert!(license.has_capability("MultiStripe"));
        assert!(!license.has_capability("Backup"));
        assert!(!license.has_capability("Search"));
        assert_eq!(
            license.expiry_date,
            NaiveDate::from_ymd_opt(2030, 6, 30).unwrap()
        );
    }

    #[test]
    fn test_expiry() {
        let license = License::parse(CONTENT).unwrap();
        assert!(!license.is_expired_on(NaiveDate::from_ymd_opt(2030, 6, 30).unwrap()));
        assert!(license.is_expired_on(NaiveDate::from_ymd_opt(2030, 7, 1).unwrap()));
    }

    #[test]
    fn test_invalid_content() {
        assert!(matches!(
            License::parse("not json"),
            Err(ModelError::InvalidLicense(_))
        ));
    }
}
