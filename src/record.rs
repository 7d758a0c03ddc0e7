//! Uniform view of resource records returned to API clients.

use crate::dns::common::name_from_labels;
use crate::dns::enums::DNSResourceType;
use crate::dns::resource::{DNSResource, RData};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The record kinds the API accepts and reports
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    NS,
    PTR,
    SOA,
    TXT,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid lookup-type - use A|AAAA|CNAME|MX|NS|PTR|SOA|TXT")]
pub struct UnsupportedRecordType(pub String);

impl RecordType {
    pub const ALL: [RecordType; 8] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::CNAME,
        RecordType::MX,
        RecordType::NS,
        RecordType::PTR,
        RecordType::SOA,
        RecordType::TXT,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::SOA => "SOA",
            RecordType::TXT => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = UnsupportedRecordType;

    /// Case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| UnsupportedRecordType(s.to_string()))
    }
}

impl From<RecordType> for DNSResourceType {
    fn from(rtype: RecordType) -> Self {
        match rtype {
            RecordType::A => DNSResourceType::A,
            RecordType::AAAA => DNSResourceType::AAAA,
            RecordType::CNAME => DNSResourceType::CNAME,
            RecordType::MX => DNSResourceType::MX,
            RecordType::NS => DNSResourceType::NS,
            RecordType::PTR => DNSResourceType::PTR,
            RecordType::SOA => DNSResourceType::SOA,
            RecordType::TXT => DNSResourceType::TXT,
        }
    }
}

/// One answer record flattened to four strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    pub name: String,
    pub ttl: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
}

/// Map a decoded record to its API shape.
///
/// Records of kinds outside [`RecordType::ALL`] yield `None` and are dropped
/// from the answer list.
pub fn normalize(resource: &DNSResource) -> Option<NormalizedRecord> {
    let (record_type, value) = match &resource.rdata {
        RData::A(addr) => (RecordType::A, addr.to_string()),
        RData::AAAA(addr) => (RecordType::AAAA, addr.to_string()),
        RData::CNAME(target) => (RecordType::CNAME, name_from_labels(target)),
        RData::MX {
            preference,
            exchange,
        } => (
            RecordType::MX,
            format!("{}\t{}", preference, name_from_labels(exchange)),
        ),
        RData::NS(host) => (RecordType::NS, name_from_labels(host)),
        RData::PTR(target) => (RecordType::PTR, name_from_labels(target)),
        RData::SOA(soa) => (RecordType::SOA, soa.serial.to_string()),
        // Additional chunks are not reported
        RData::TXT(chunks) => (
            RecordType::TXT,
            chunks.first().cloned().unwrap_or_default(),
        ),
        RData::Unknown(_) => return None,
    };

    Some(NormalizedRecord {
        name: resource.name(),
        ttl: resource.ttl.to_string(),
        record_type: record_type.to_string(),
        value,
    })
}

/// Normalize an answer section, skipping unsupported kinds
pub fn normalize_all(answers: &[DNSResource]) -> Vec<NormalizedRecord> {
    answers.iter().filter_map(normalize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::common::labels_from_name;
    use crate::dns::enums::DNSResourceClass;
    use crate::dns::resource::Soa;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn record(rtype: DNSResourceType, rdata: RData) -> DNSResource {
        DNSResource {
            labels: labels_from_name("steve.fi").unwrap(),
            rtype,
            rclass: DNSResourceClass::IN,
            ttl: 300,
            rdata,
        }
    }

    fn labels(name: &str) -> Vec<String> {
        labels_from_name(name).unwrap()
    }

    #[test]
    fn test_parse_record_type_case_insensitive() {
        assert_eq!("txt".parse::<RecordType>(), Ok(RecordType::TXT));
        assert_eq!("AaAa".parse::<RecordType>(), Ok(RecordType::AAAA));
        assert!("bogus".parse::<RecordType>().is_err());
        assert!("SRV".parse::<RecordType>().is_err());
        assert!("".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_value_encodings() {
        let cases = vec![
            (
                record(DNSResourceType::A, RData::A(Ipv4Addr::new(176, 9, 183, 100))),
                "A",
                "176.9.183.100",
            ),
            (
                record(
                    DNSResourceType::AAAA,
                    RData::AAAA("2a01:4f8:151:6083::100".parse::<Ipv6Addr>().unwrap()),
                ),
                "AAAA",
                "2a01:4f8:151:6083::100",
            ),
            (
                record(DNSResourceType::CNAME, RData::CNAME(labels("www.steve.fi"))),
                "CNAME",
                "www.steve.fi.",
            ),
            (
                record(
                    DNSResourceType::MX,
                    RData::MX {
                        preference: 15,
                        exchange: labels("mx.steve.fi"),
                    },
                ),
                "MX",
                "15\tmx.steve.fi.",
            ),
            (
                record(DNSResourceType::NS, RData::NS(labels("ns1.steve.fi"))),
                "NS",
                "ns1.steve.fi.",
            ),
            (
                record(DNSResourceType::PTR, RData::PTR(labels("host.steve.fi"))),
                "PTR",
                "host.steve.fi.",
            ),
            (
                record(
                    DNSResourceType::SOA,
                    RData::SOA(Soa {
                        mname: labels("ns1.steve.fi"),
                        rname: labels("hostmaster.steve.fi"),
                        serial: 2018041501,
                        ..Default::default()
                    }),
                ),
                "SOA",
                "2018041501",
            ),
            (
                record(
                    DNSResourceType::TXT,
                    RData::TXT(vec!["v=spf1 mx -all".into(), "ignored".into()]),
                ),
                "TXT",
                "v=spf1 mx -all",
            ),
        ];

        for (resource, expected_type, expected_value) in cases {
            let normalized = normalize(&resource).unwrap();
            assert_eq!(normalized.name, "steve.fi.");
            assert_eq!(normalized.ttl, "300");
            assert_eq!(normalized.record_type, expected_type);
            assert_eq!(normalized.value, expected_value);
        }
    }

    #[test]
    fn test_unsupported_records_are_skipped() {
        let answers = vec![
            record(DNSResourceType::Unknown(33), RData::Unknown(vec![0, 1])),
            record(DNSResourceType::A, RData::A(Ipv4Addr::LOCALHOST)),
        ];
        let normalized = normalize_all(&answers);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].value, "127.0.0.1");
    }

    #[test]
    fn test_empty_txt_has_empty_value() {
        let normalized = normalize(&record(DNSResourceType::TXT, RData::TXT(vec![]))).unwrap();
        assert_eq!(normalized.value, "");
    }

    #[test]
    fn test_serialized_field_names() {
        let normalized = normalize(&record(DNSResourceType::A, RData::A(Ipv4Addr::LOCALHOST)))
            .unwrap();
        let json = serde_json::to_value(&normalized).unwrap();
        assert_eq!(json["type"], "A");
        assert_eq!(json["ttl"], "300");
        assert_eq!(json["name"], "steve.fi.");
        assert_eq!(json["value"], "127.0.0.1");
    }
}
