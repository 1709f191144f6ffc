//! Wire stability of the metadata envelope.

use std::collections::HashMap;

use entwine::model::Metadata;
use entwine::prelude::*;

fn sample() -> Metadata {
    Metadata {
        alpha: 3,
        s: 5,
        p: 5,
        root_cid: "QmRoot".into(),
        data_cid_index: HashMap::from([("QmData1".into(), 1), ("QmData2".into(), 2)]),
        parity_cids: vec![
            vec!["QmH1".into(), "QmH2".into()],
            vec!["QmR1".into(), "QmR2".into()],
            vec!["QmL1".into(), "QmL2".into()],
        ],
    }
}

#[test]
fn envelope_keys_are_wire_stable() {
    let json: serde_json::Value = serde_json::from_slice(&sample().to_json().unwrap()).unwrap();
    let object = json.as_object().unwrap();

    for key in [
        "Alpha",
        "S",
        "P",
        "RootCID",
        "DataCIDIndexMap",
        "ParityCIDs",
    ] {
        assert!(object.contains_key(key), "missing key {key}");
    }
    assert_eq!(object.len(), 6);
    assert_eq!(object["DataCIDIndexMap"]["QmData2"], 2);
}

#[test]
fn envelope_round_trips() {
    let metadata = sample();
    let parsed = Metadata::from_json(&metadata.to_json().unwrap()).unwrap();
    assert_eq!(parsed, metadata);
}

#[test]
fn envelope_parses_stored_documents() {
    let stored = r#"{
        "Alpha": 3,
        "S": 5,
        "P": 5,
        "RootCID": "QmRoot",
        "DataCIDIndexMap": {"QmData1": 1},
        "ParityCIDs": [["QmH1"], ["QmR1"], ["QmL1"]]
    }"#;

    let metadata = Metadata::from_json(stored.as_bytes()).unwrap();
    assert_eq!(metadata.alpha, 3);
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata.params().unwrap().s, 5);
    assert_eq!(metadata.index_to_cid()[&1], "QmData1");
}

#[test]
fn malformed_envelope_is_a_serialization_error() {
    let err = Metadata::from_json(b"{\"Alpha\": \"three\"}").unwrap_err();
    assert!(matches!(err, Error::SerializationError(_)));
}
