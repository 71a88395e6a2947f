use super::*;

#[test]
fn encode_errors_are_transient() {
    use serde::ser::Error as _;
    let error = StorageError::Encode(bson::ser::Error::custom("boom"));
    assert!(error.is_transient());
}

#[test]
fn decode_errors_are_transient() {
    use serde::de::Error as _;
    let error = StorageError::Decode(bson::de::Error::custom("boom"));
    assert!(error.is_transient());
}
