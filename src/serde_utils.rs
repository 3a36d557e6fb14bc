use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Strips whitespace and any surrounding double quotes from an ETag header value.
pub fn unquote_etag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

/// Serializes an unquoted ETag with exactly one layer of double quotes.
pub fn serialize_quoted<S>(etag: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("\"{}\"", etag.trim_matches('"')))
}

pub fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|value| humantime::parse_duration(&value).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize)]
    struct TestStruct {
        #[serde(default, deserialize_with = "deserialize_opt_duration")]
        timeout: Option<Duration>,
    }

    #[derive(Serialize)]
    struct QuotedPart<'a> {
        #[serde(rename = "ETag", serialize_with = "serialize_quoted")]
        etag: &'a str,
    }

    #[test]
    fn test_deserialize_opt_duration() {
        let result: TestStruct = serde_json::from_str(r#"{"timeout": "1m 30s"}"#).unwrap();
        assert_eq!(result.timeout, Some(Duration::from_secs(90)));

        let result: TestStruct = serde_json::from_str("{}").unwrap();
        assert_eq!(result.timeout, None);

        assert!(serde_json::from_str::<TestStruct>(r#"{"timeout": "soon"}"#).is_err());
    }

    #[test]
    fn test_unquote_etag() {
        assert_eq!(unquote_etag("\"9b2cf535f27731c974343645a3985328\""), "9b2cf535f27731c974343645a3985328");
        assert_eq!(unquote_etag(" abc "), "abc");
        assert_eq!(unquote_etag("\"\"abc\"\""), "abc");
    }

    #[test]
    fn test_serialize_quoted_adds_single_layer() {
        let json = serde_json::to_string(&QuotedPart { etag: "abc" }).unwrap();
        assert_eq!(json, r#"{"ETag":"\"abc\""}"#);

        let json = serde_json::to_string(&QuotedPart { etag: "\"abc\"" }).unwrap();
        assert_eq!(json, r#"{"ETag":"\"abc\""}"#);
    }
}
