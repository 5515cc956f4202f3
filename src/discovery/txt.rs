//! DNS-SD TXT records used by NMOS adverts
//!
//! - `pri`: registry priority, lower wins
//! - `api_ver`: comma-separated API versions
//! - `api_proto`: `http` or `https`
//! - `api_auth`: whether the API requires authorization

use std::collections::HashMap;

use crate::resource::Protocol;

/// Decoded NMOS TXT records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxtRecords {
    pub priority: Option<u32>,
    pub api_versions: Vec<String>,
    pub api_proto: Protocol,
    pub api_auth: bool,
}

impl TxtRecords {
    /// Records a node advertises for its own API
    #[must_use]
    pub fn for_node(api_versions: &[String], api_proto: Protocol) -> Self {
        Self {
            priority: None,
            api_versions: api_versions.to_vec(),
            api_proto,
            api_auth: false,
        }
    }

    /// Decode from key/value pairs; unknown keys are ignored and malformed
    /// values fall back to defaults
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut records = Self::default();
        for (key, value) in pairs {
            match key {
                "pri" => records.priority = value.trim().parse().ok(),
                "api_ver" => {
                    records.api_versions = value
                        .split(',')
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(String::from)
                        .collect();
                }
                "api_proto" => records.api_proto = value.parse().unwrap_or_default(),
                "api_auth" => records.api_auth = value.trim().eq_ignore_ascii_case("true"),
                _ => {}
            }
        }
        records
    }

    /// Encode into the property map handed to the mDNS responder
    #[must_use]
    pub fn to_properties(&self) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        if let Some(pri) = self.priority {
            properties.insert("pri".to_string(), pri.to_string());
        }
        properties.insert("api_ver".to_string(), self.api_versions.join(","));
        properties.insert("api_proto".to_string(), self.api_proto.to_string());
        properties.insert("api_auth".to_string(), self.api_auth.to_string());
        properties
    }

    /// Whether the advertised API supports `version`
    ///
    /// Adverts that omit `api_ver` are assumed to support anything.
    #[must_use]
    pub fn supports(&self, version: &str) -> bool {
        self.api_versions.is_empty() || self.api_versions.iter().any(|v| v == version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_registry_records() {
        let txt = TxtRecords::from_pairs([
            ("pri", "10"),
            ("api_ver", "v1.2,v1.3"),
            ("api_proto", "https"),
            ("api_auth", "false"),
            ("unrelated", "x"),
        ]);

        assert_eq!(txt.priority, Some(10));
        assert_eq!(txt.api_versions, vec!["v1.2", "v1.3"]);
        assert_eq!(txt.api_proto, Protocol::Https);
        assert!(!txt.api_auth);
        assert!(txt.supports("v1.3"));
        assert!(!txt.supports("v1.0"));
    }

    #[test]
    fn malformed_values_fall_back() {
        let txt = TxtRecords::from_pairs([("pri", "high"), ("api_proto", "gopher")]);

        assert_eq!(txt.priority, None);
        assert_eq!(txt.api_proto, Protocol::Http);
        assert!(txt.supports("v1.3"));
    }

    #[test]
    fn encodes_properties() {
        let txt = TxtRecords {
            priority: Some(99),
            api_versions: vec!["v1.0".to_string(), "v1.3".to_string()],
            api_proto: Protocol::Http,
            api_auth: false,
        };
        let props = txt.to_properties();

        assert_eq!(props["pri"], "99");
        assert_eq!(props["api_ver"], "v1.0,v1.3");
        assert_eq!(props["api_proto"], "http");
        assert_eq!(props["api_auth"], "false");
    }

    #[test]
    fn node_records_have_no_priority() {
        let txt = TxtRecords::for_node(&["v1.3".to_string()], Protocol::Http);
        assert!(!txt.to_properties().contains_key("pri"));
    }
}
