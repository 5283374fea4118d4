//! Tests for malformed envelopes and error classification

mod common;

use common::*;

fn valid(shape: Shape) -> Vec<u8> {
    Envelope::seal(shape, Bytes::from_static(b"payload"))
        .unwrap()
        .encode()
        .to_vec()
}

#[test]
fn test_prefix_too_short() {
    let test_cases = vec![
        (vec![], Shape::Request, 8),
        (vec![0x10, 0, 0, 0], Shape::Request, 8),
        (vec![0x10, 0, 0, 0, 0x10, 0, 0], Shape::Request, 8),
        (vec![0x10, 0, 0, 0, 0, 0, 2, 0, 0x10, 0, 0], Shape::Response, 12),
    ];

    for (bytes, shape, prefix) in test_cases {
        match Envelope::decode(&bytes, shape) {
            Err(KmsError::InsufficientData { expected, actual }) => {
                assert_eq!(expected, prefix);
                assert_eq!(actual, bytes.len());
            }
            other => panic!("{} bytes: expected InsufficientData, got {:?}", bytes.len(), other),
        }
    }
}

#[test]
fn test_corrupted_length_copy_rejected() {
    for shape in [Shape::Request, Shape::Response] {
        let second_at = shape.prefix_size() - 4;

        let mut first_corrupt = valid(shape);
        first_corrupt[0] ^= 0x01;
        let mut second_corrupt = valid(shape);
        second_corrupt[second_at] ^= 0x01;

        for bytes in [first_corrupt, second_corrupt] {
            let err = Envelope::decode(&bytes, shape).unwrap_err();
            assert!(matches!(err, KmsError::LengthMismatch { .. }), "{}: got {:?}", shape, err);
            assert!(err.is_format_error());
            assert!(!err.is_contract_violation());
        }
    }
}

#[test]
fn test_both_lengths_corrupted_consistently() {
    // matching but wrong length fields are caught by the record size check
    let mut bytes = valid(Shape::Request);
    bytes[0] += 4;
    bytes[4] += 4;
    match Envelope::decode(&bytes, Shape::Request) {
        Err(KmsError::DeclaredLengthMismatch { expected, actual }) => {
            assert_eq!(actual, bytes.len());
            assert_eq!(expected, bytes.len() + 4);
        }
        other => panic!("Expected DeclaredLengthMismatch, got {:?}", other),
    }
}

#[test]
fn test_body_too_short_for_tag() {
    let mut bytes = vec![15, 0, 0, 0, 15, 0, 0, 0];
    bytes.extend_from_slice(&[0; 15 + 5]);
    assert!(matches!(
        Envelope::decode(&bytes, Shape::Request),
        Err(KmsError::BodyTooShort(15))
    ));
}

#[test]
fn test_empty_payload_is_valid() {
    // bodyLength 16: tag only
    let envelope = Envelope::seal(Shape::Response, Bytes::new()).unwrap();
    let bytes = envelope.encode();
    assert_eq!(bytes.len(), 12 + 16 + 4);
    let decoded = Envelope::decode(&bytes, Shape::Response).unwrap();
    assert!(decoded.payload().is_empty());
    assert_eq!(decoded.tag().to_string(), "d144963029e2bd12f9970c9f52b27f09");
}

#[test]
fn test_invalid_response_marker() {
    let mut bytes = valid(Shape::Response);
    bytes[6] = 0x03;
    assert!(matches!(
        Envelope::decode(&bytes, Shape::Response),
        Err(KmsError::InvalidMarker(0x0000_0300))
    ));
}

#[test]
fn test_request_decoded_as_response_fails() {
    let bytes = valid(Shape::Request);
    let err = Envelope::decode(&bytes, Shape::Response).unwrap_err();
    assert!(err.is_format_error(), "got {:?}", err);
}

#[test]
fn test_missing_or_extra_padding() {
    let bytes = valid(Shape::Request);

    let truncated = &bytes[..bytes.len() - 1];
    assert!(matches!(
        Envelope::decode(truncated, Shape::Request),
        Err(KmsError::DeclaredLengthMismatch { .. })
    ));

    let mut extended = bytes.clone();
    extended.push(0);
    assert!(matches!(
        Envelope::decode(&extended, Shape::Request),
        Err(KmsError::DeclaredLengthMismatch { .. })
    ));
}

#[test]
fn test_stream_decode_waits_for_full_record() {
    let bytes = valid(Shape::Request);
    let mut partial = Bytes::copy_from_slice(&bytes[..bytes.len() - 2]);
    match Envelope::decode_from(&mut partial, Shape::Request) {
        Err(KmsError::InsufficientData { expected, actual }) => {
            assert_eq!(expected, bytes.len());
            assert_eq!(actual, bytes.len() - 2);
        }
        other => panic!("Expected InsufficientData, got {:?}", other),
    }
    // nothing consumed on failure
    assert_eq!(partial.len(), bytes.len() - 2);
}

#[test]
fn test_tag_slice_contract() {
    match Tag::from_slice(&[0u8; 12]) {
        Err(KmsError::ContractViolation { what, expected, actual }) => {
            assert_eq!(what, "tag");
            assert_eq!(expected, TAG_SIZE);
            assert_eq!(actual, 12);
        }
        other => panic!("Expected ContractViolation, got {:?}", other),
    }
}
