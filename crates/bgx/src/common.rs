// ai
//! 📦 Common data structures — the envelopes that fly between the client and the workers.
//!
//! 🎬 COLD OPEN — EXT. A VERY LARGE BUCKET — NIGHT
//!
//! Somewhere in us-east-1 a million log objects sit in the dark, each one
//! convinced it is the important one. The client lists them. It bundles them
//! into a [`Batch`]. It throws the batch over the wall to a remote worker.
//! A [`ScanResult`] comes back, carrying the matches, the errors, and (sometimes)
//! a shamefaced note about the keys it never got to.
//!
//! Both types cross a process boundary as JSON, so every field here is part of the
//! wire contract. Rename one and a deployed worker stops understanding you. 🦆

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 🗜️ How a worker ships its matches back.
///
/// `Plain` collects every match as a compact JSON string. `Gzip` pushes them through
/// a gzip encoder so more matches fit under the response ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchEncoding {
    #[default]
    Plain,
    Gzip,
}

/// 📦 One unit of dispatched work: where to look, which keys, and what to look for.
///
/// Immutable once the batcher hands it off. Consumed exactly once, by exactly one
/// invocation. The `index` is the batch's birth order, starting at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub bucket: String,
    pub region: String,
    pub keys: Vec<String>,
    pub expr: String,
    #[serde(default)]
    pub encoding: MatchEncoding,
}

/// 📬 What came back from scanning one [`Batch`].
///
/// `truncated` is not an error. It is the worker admitting it ran out of response
/// budget and listing, politely, the keys it skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScanResult {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<String>,
    #[serde(default)]
    pub matches: Vec<String>,
    /// 🗜️ Gzip-compressed NDJSON matches. Base64 on the wire.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "serde_base64")]
    pub gzip_matches: Vec<u8>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub records_scanned: usize,
    /// ⏱️ Round-trip time of the invocation, stamped by the client, never by the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub took: Option<Duration>,
}

impl ScanResult {
    /// 🏗️ An empty result tagged with its batch's index. The worker fills in the rest.
    pub fn for_batch(batch: &Batch) -> Self {
        Self {
            index: batch.index,
            ..Self::default()
        }
    }
}

/// 🔤 `Vec<u8>` as a base64 string. serde's default for bytes is an array of numbers,
/// which costs up to four characters per byte.
mod serde_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a_batch_with_baggage() -> Batch {
        Batch {
            index: 7,
            bucket: "logs-bucket".to_string(),
            region: "eu-west-1".to_string(),
            keys: vec![
                "2024/01/01/a.json".to_string(),
                "2024/01/01/b.json.gz".to_string(),
            ],
            expr: r#"level == "error" && contains(msg, "timeout")"#.to_string(),
            encoding: MatchEncoding::Gzip,
        }
    }

    #[test]
    fn the_one_where_a_batch_survives_the_trip_over_the_wall() {
        let the_batch = a_batch_with_baggage();
        let the_wire = serde_json::to_vec(&the_batch).expect("💀 batch should serialize");
        let the_arrival: Batch =
            serde_json::from_slice(&the_wire).expect("💀 batch should deserialize");

        assert_eq!(the_arrival.index, 7);
        assert_eq!(the_arrival.keys, the_batch.keys);
        assert_eq!(the_arrival.bucket, "logs-bucket");
        assert_eq!(the_arrival.region, "eu-west-1");
        assert_eq!(the_arrival.expr, the_batch.expr);
        assert_eq!(the_arrival.encoding, MatchEncoding::Gzip);
    }

    #[test]
    fn the_one_where_an_old_client_forgets_the_encoding() {
        let the_json = r#"{"index":0,"bucket":"b","region":"us-east-1","keys":["k"],"expr":"true"}"#;
        let the_batch: Batch = serde_json::from_str(the_json).expect("💀 encoding should default");
        assert_eq!(the_batch.encoding, MatchEncoding::Plain);
    }

    #[test]
    fn the_one_where_a_sparse_result_still_parses() {
        let the_json = r#"{"index":3,"matches":["{\"a\":1}"],"errors":[]}"#;
        let the_result: ScanResult =
            serde_json::from_str(the_json).expect("💀 sparse result should parse");
        assert_eq!(the_result.index, 3);
        assert_eq!(the_result.matches, vec![r#"{"a":1}"#.to_string()]);
        assert!(the_result.truncated.is_none());
        assert!(the_result.gzip_matches.is_empty());
        assert!(the_result.took.is_none());
    }

    #[test]
    fn the_one_where_gzip_bytes_travel_as_base64() {
        let the_result = ScanResult {
            index: 1,
            gzip_matches: vec![0x1f, 0x8b, 0x08, 0x00, 0xff],
            ..ScanResult::default()
        };
        let the_wire = serde_json::to_value(&the_result).expect("💀 result should serialize");
        assert_eq!(the_wire["gzip_matches"], serde_json::json!("H4sIAP8="));

        let the_arrival: ScanResult =
            serde_json::from_value(the_wire).expect("💀 result should deserialize");
        assert_eq!(the_arrival.gzip_matches, the_result.gzip_matches);
    }

    #[test]
    fn the_one_where_gzip_bytes_that_are_not_base64_are_refused() {
        let the_json = r#"{"index":1,"gzip_matches":"not base64!"}"#;
        assert!(serde_json::from_str::<ScanResult>(the_json).is_err());
    }
}
