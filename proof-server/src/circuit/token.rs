//! Credential decoding
//!
//! A credential is `header.claims.signature`, each segment base64url. The
//! signature covers the literal `header.claims` text, so that substring is
//! kept byte-for-byte rather than re-encoded.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::decode_base64;
use crate::error::PipelineError;

/// JOSE header of the credential
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialHeader {
    pub alg: String,
    /// Key identifier used to look up the issuer's signing key
    pub kid: Option<String>,
    pub typ: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Claims payload: the identity field is read on demand, everything else is
/// passed through untouched.
#[derive(Debug, Clone)]
pub struct Claims {
    values: Map<String, Value>,
    /// Decoded JSON text exactly as carried by the claims segment
    raw: Vec<u8>,
}

impl Claims {
    /// The identity field as a single-`@` address.
    pub fn identity(&self, field: &str) -> Result<&str, PipelineError> {
        let missing = || PipelineError::MissingIdentityField {
            field: field.to_string(),
        };
        let value = self.values.get(field).and_then(Value::as_str).ok_or_else(missing)?;
        if value.matches('@').count() != 1 {
            return Err(missing());
        }
        Ok(value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// A split and decoded credential
#[derive(Debug, Clone)]
pub struct DecodedCredential {
    pub header: CredentialHeader,
    pub claims: Claims,
    /// Third segment, still encoded
    pub signature_segment: String,
    /// `header.claims` exactly as it appears in the credential
    pub signed_message: String,
    /// Byte offset of the first `.`
    pub period_index: usize,
}

impl DecodedCredential {
    /// Byte offset of the claims segment inside [`Self::signed_message`]
    pub fn claims_offset(&self) -> usize {
        self.period_index + 1
    }
}

/// Split `credential` into its segments and decode header and claims.
pub fn decode_credential(credential: &str) -> Result<DecodedCredential, PipelineError> {
    let credential = credential.trim();
    let segments: Vec<&str> = credential.split('.').collect();
    let [header_b64, claims_b64, signature_b64] = segments.as_slice() else {
        return Err(PipelineError::MalformedCredential(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let header_json = decode_segment("header", header_b64)?;
    let header: CredentialHeader = serde_json::from_slice(&header_json)
        .map_err(|e| PipelineError::MalformedCredential(format!("header is not valid JSON: {e}")))?;

    let claims_json = decode_segment("claims", claims_b64)?;
    let values: Map<String, Value> = serde_json::from_slice(&claims_json).map_err(|e| {
        PipelineError::MalformedCredential(format!("claims are not a JSON object: {e}"))
    })?;

    if signature_b64.is_empty() {
        return Err(PipelineError::MalformedCredential(
            "signature segment is empty".to_string(),
        ));
    }

    Ok(DecodedCredential {
        header,
        claims: Claims {
            values,
            raw: claims_json,
        },
        signature_segment: signature_b64.to_string(),
        signed_message: format!("{header_b64}.{claims_b64}"),
        period_index: header_b64.len(),
    })
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, PipelineError> {
    let bytes = decode_base64(segment)
        .map_err(|e| PipelineError::MalformedCredential(format!("{name} is not base64: {e}")))?;
    std::str::from_utf8(&bytes)
        .map_err(|_| PipelineError::MalformedCredential(format!("{name} is not UTF-8")))?;
    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use base64::Engine;

    pub(crate) fn encode_unsigned(header: &str, claims: &str) -> String {
        format!(
            "{}.{}.c2ln",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[test]
    fn test_decode_preserves_signed_message() {
        let token = encode_unsigned(
            r#"{"alg":"RS256","kid":"abc","typ":"JWT"}"#,
            r#"{"email":"alice@example.com","sub":"42"}"#,
        );
        let decoded = decode_credential(&token).unwrap();

        assert_eq!(decoded.header.alg, "RS256");
        assert_eq!(decoded.header.kid.as_deref(), Some("abc"));
        assert_eq!(decoded.signature_segment, "c2ln");
        assert_eq!(decoded.period_index, token.find('.').unwrap());
        assert!(token.starts_with(&decoded.signed_message));
        assert_eq!(decoded.signed_message.len() + 5, token.len());
        assert_eq!(decoded.claims.identity("email").unwrap(), "alice@example.com");
        assert_eq!(decoded.claims.get("sub"), Some(&Value::from("42")));
    }

    #[test]
    fn test_standard_alphabet_with_padding_is_accepted() {
        let header = STANDARD.encode(r#"{"alg":"RS256","kid":"k"}"#);
        let claims = STANDARD.encode(r#"{"email":"bob@corp.io"}"#);
        let token = format!("{header}.{claims}.c2ln");
        let decoded = decode_credential(&token).unwrap();

        // padding stays in the signed message
        assert_eq!(decoded.signed_message, format!("{header}.{claims}"));
        assert_eq!(decoded.claims.identity("email").unwrap(), "bob@corp.io");
    }

    #[test]
    fn test_wrong_segment_count() {
        for token in ["", "a.b", "a.b.c.d"] {
            assert!(matches!(
                decode_credential(token),
                Err(PipelineError::MalformedCredential(_))
            ));
        }
    }

    #[test]
    fn test_non_json_claims() {
        let token = format!(
            "{}.{}.c2ln",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode("not json")
        );
        assert!(matches!(
            decode_credential(&token),
            Err(PipelineError::MalformedCredential(_))
        ));
    }

    #[test]
    fn test_identity_field_validation() {
        let decoded = decode_credential(&encode_unsigned(
            r#"{"alg":"RS256"}"#,
            r#"{"email":"two@at@signs","mail":7}"#,
        ))
        .unwrap();

        assert!(matches!(
            decoded.claims.identity("email"),
            Err(PipelineError::MissingIdentityField { .. })
        ));
        assert!(decoded.claims.identity("mail").is_err());
        assert!(decoded.claims.identity("absent").is_err());
    }
}
