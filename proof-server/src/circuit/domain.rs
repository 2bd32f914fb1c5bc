//! Locating the email domain for in-circuit extraction
//!
//! The circuit reads the domain out of the signed `header.claims` text. The
//! claims segment is base64, so a decoded byte at offset `d` of the claims
//! JSON starts inside base64 character `floor(4d / 3)` of that segment.

use serde::Serialize;

use super::token::DecodedCredential;
use crate::error::PipelineError;

/// Position of the identity domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainLocation {
    /// Offset in the signed message of the first base64 character carrying
    /// the domain's first byte
    pub index: usize,
    /// Domain length in bytes
    pub length: usize,
    /// Offset of the domain's first byte in the decoded claims JSON
    pub payload_offset: usize,
    pub domain: String,
}

/// Find the domain of the identity field `field`.
///
/// Fails with `MissingIdentityField` when the field is absent or not an
/// address, and `FieldTooLong` when the domain exceeds `max_length`.
pub fn locate_domain(
    credential: &DecodedCredential,
    field: &str,
    max_length: usize,
) -> Result<DomainLocation, PipelineError> {
    // validates presence and the single '@'
    credential.claims.identity(field)?;

    let missing = || PipelineError::MissingIdentityField {
        field: field.to_string(),
    };
    let raw = credential.claims.raw();
    let (start, end) = string_value_span(raw, field).ok_or_else(missing)?;
    let at = raw[start..end]
        .iter()
        .position(|b| *b == b'@')
        .ok_or_else(missing)?;

    let payload_offset = start + at + 1;
    let length = end - payload_offset;
    if length == 0 {
        return Err(missing());
    }
    if length > max_length {
        return Err(PipelineError::FieldTooLong {
            length,
            max: max_length,
        });
    }

    let domain = String::from_utf8_lossy(&raw[payload_offset..end]).into_owned();

    Ok(DomainLocation {
        index: credential.claims_offset() + base64_char_offset(payload_offset),
        length,
        payload_offset,
        domain,
    })
}

/// Index of the first base64 character that encodes bits of decoded byte `d`
pub fn base64_char_offset(decoded_offset: usize) -> usize {
    decoded_offset * 4 / 3
}

/// Inverse of [`base64_char_offset`]
pub fn decoded_offset(char_offset: usize) -> usize {
    char_offset - char_offset / 4
}

/// Byte span (without quotes) of the string value stored under the
/// top-level key `key` of a raw JSON object.
///
/// Nested objects are skipped. With duplicate keys the last one wins, which
/// is the member `serde_json` keeps when parsing the same text.
fn string_value_span(raw: &[u8], key: &str) -> Option<(usize, usize)> {
    let mut found = None;
    let mut depth = 0usize;
    let mut expect_key = false;
    let mut i = 0;

    while i < raw.len() {
        match raw[i] {
            b'"' => {
                let start = i + 1;
                let end = string_end(raw, start)?;
                i = end + 1;
                if depth != 1 || !expect_key {
                    continue;
                }
                expect_key = false;

                let colon = skip_whitespace(raw, i);
                if raw.get(colon) != Some(&b':') {
                    return None;
                }
                i = skip_whitespace(raw, colon + 1);
                if raw[start..end] != *key.as_bytes() {
                    continue;
                }
                found = match raw.get(i) {
                    Some(b'"') => {
                        let value_end = string_end(raw, i + 1)?;
                        let span = (i + 1, value_end);
                        i = value_end + 1;
                        Some(span)
                    }
                    // a later non-string member replaces any earlier match
                    _ => None,
                };
            }
            b'{' => {
                depth += 1;
                expect_key = depth == 1;
                i += 1;
            }
            b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b',' => {
                expect_key = depth == 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    found
}

/// Index of the closing quote of the string whose contents start at `start`
fn string_end(raw: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i < raw.len() {
        match raw[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn skip_whitespace(raw: &[u8], mut pos: usize) -> usize {
    while raw.get(pos).is_some_and(|b| b.is_ascii_whitespace()) {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::decode_base64;
    use crate::circuit::token::decode_credential;
    use crate::circuit::token::tests::encode_unsigned;

    const HEADER: &str = r#"{"alg":"RS256","kid":"test-key","typ":"JWT"}"#;

    fn locate(claims: &str, max: usize) -> Result<(DecodedCredential, DomainLocation), PipelineError> {
        let decoded = decode_credential(&encode_unsigned(HEADER, claims))?;
        let location = locate_domain(&decoded, "email", max)?;
        Ok((decoded, location))
    }

    #[test]
    fn test_alice_example_com() {
        let claims = r#"{"iss":"accounts.example","email":"alice@example.com","email_verified":true}"#;
        let (decoded, location) = locate(claims, 64).unwrap();

        assert_eq!(location.length, 11);
        assert_eq!(location.domain, "example.com");
        assert_eq!(location.payload_offset, claims.find("example.com").unwrap());
        assert_eq!(
            &decoded.claims.raw()[location.payload_offset..][..location.length],
            b"example.com"
        );
        assert_eq!(
            location.index,
            decoded.period_index + 1 + location.payload_offset * 4 / 3
        );
    }

    #[test]
    fn test_index_addresses_signed_message() {
        // Try every alignment of the domain within a base64 quantum
        for pad in ["", "x", "xy"] {
            let claims = format!(r#"{{"p":"{pad}","email":"alice@example.com"}}"#);
            let (decoded, location) = locate(&claims, 64).unwrap();

            let quantum_start = location.index - (location.index - decoded.claims_offset()) % 4;
            let tail = decode_base64(&decoded.signed_message[quantum_start..]).unwrap();
            let skipped = (quantum_start - decoded.claims_offset()) / 4 * 3;
            let within = location.payload_offset - skipped;
            assert_eq!(&tail[within..within + location.length], b"example.com");
        }
    }

    #[test]
    fn test_char_offset_inverts() {
        for d in 0..500 {
            assert_eq!(decoded_offset(base64_char_offset(d)), d);
        }
    }

    #[test]
    fn test_whitespace_and_key_lookalikes() {
        let claims = r#"{"note":"email", "email" : "carol@sub.acme.test"}"#;
        let (_, location) = locate(claims, 64).unwrap();
        assert_eq!(location.domain, "sub.acme.test");
        assert_eq!(location.length, 13);
    }

    #[test]
    fn test_nested_email_is_not_the_identity() {
        let claims = r#"{"meta":{"email":"x@evil.test"},"email":"a@acme.test"}"#;
        let (decoded, location) = locate(claims, 64).unwrap();
        assert_eq!(decoded.claims.identity("email").unwrap(), "a@acme.test");
        assert_eq!(location.domain, "acme.test");
        assert_eq!(location.payload_offset, claims.rfind("acme.test").unwrap());

        let nested_only = r#"{"meta":{"email":"x@evil.test"},"list":[{"email":"y@evil.test"}]}"#;
        assert!(matches!(
            locate(nested_only, 64),
            Err(PipelineError::MissingIdentityField { .. })
        ));
    }

    #[test]
    fn test_duplicate_email_locates_the_parsed_member() {
        let claims = r#"{"email":"x@evil.test","sub":"1","email":"a@acme.test"}"#;
        let (decoded, location) = locate(claims, 64).unwrap();
        assert_eq!(decoded.claims.identity("email").unwrap(), "a@acme.test");
        assert_eq!(location.domain, "acme.test");
        assert_eq!(location.payload_offset, claims.rfind("acme.test").unwrap());
    }

    #[test]
    fn test_escaped_quotes_inside_values() {
        let claims = r#"{"name":"say \"email\": \"z@evil.test\"","email":"a@acme.test"}"#;
        let (_, location) = locate(claims, 64).unwrap();
        assert_eq!(location.domain, "acme.test");
    }

    #[test]
    fn test_missing_or_invalid_email() {
        assert!(matches!(
            locate(r#"{"sub":"1"}"#, 64),
            Err(PipelineError::MissingIdentityField { .. })
        ));
        assert!(matches!(
            locate(r#"{"email":"no-at-sign"}"#, 64),
            Err(PipelineError::MissingIdentityField { .. })
        ));
        assert!(matches!(
            locate(r#"{"email":"trailing@"}"#, 64),
            Err(PipelineError::MissingIdentityField { .. })
        ));
    }

    #[test]
    fn test_domain_over_maximum() {
        let err = locate(r#"{"email":"a@example.com"}"#, 10).unwrap_err();
        assert!(matches!(err, PipelineError::FieldTooLong { length: 11, max: 10 }));
        assert!(locate(r#"{"email":"a@example.com"}"#, 11).is_ok());
    }
}
