//! Submissions: signed content admitted into the ledger.

use serde::{Deserialize, Serialize};

use crate::canonical::submission_content_bytes;
use crate::crypto::{Identity, RecoverableSignature};
use crate::types::SubmissionId;

/// A signed piece of content, pending or sealed.
///
/// Content and signature never change after admission. `block_ref` is set
/// exactly once, when the submission is sealed into a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Content address of the signed fields.
    pub id: SubmissionId,

    /// Identity recovered from `signature`.
    pub author: Identity,

    /// The signed message, verbatim.
    pub content: String,

    /// Signature over `content`.
    pub signature: RecoverableSignature,

    /// Optional category from the configured set.
    pub category: Option<String>,

    /// Admission time (Unix millis).
    pub created_at: i64,

    /// Number of the block this submission was sealed into.
    pub block_ref: Option<u64>,
}

impl Submission {
    /// Build a pending submission, deriving its id.
    pub fn new(
        author: Identity,
        content: String,
        signature: RecoverableSignature,
        category: Option<String>,
        created_at: i64,
    ) -> Self {
        let id = SubmissionId::derive(&submission_content_bytes(
            &author,
            &content,
            &signature,
            category.as_deref(),
            created_at,
        ));
        Self {
            id,
            author,
            content,
            signature,
            category,
            created_at,
            block_ref: None,
        }
    }

    /// Whether the submission is still waiting for a block.
    pub fn is_pending(&self) -> bool {
        self.block_ref.is_none()
    }

    /// Recompute the id from the signed fields.
    pub fn compute_id(&self) -> SubmissionId {
        SubmissionId::derive(&submission_content_bytes(
            &self.author,
            &self.content,
            &self.signature,
            self.category.as_deref(),
            self.created_at,
        ))
    }

    /// Check that the stored id matches the signed fields.
    pub fn id_matches(&self) -> bool {
        self.compute_id() == self.id
    }
}

/// An admission request as it arrives from the request layer.
///
/// Every field is still untrusted text. `identity` is the address the caller
/// claims to be; it must match the address recovered from `signature`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub content: String,
    pub signature: String,
    pub identity: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl SubmissionRequest {
    pub fn new(
        content: impl Into<String>,
        signature: impl Into<String>,
        identity: impl Into<String>,
        category: Option<String>,
    ) -> Self {
        Self {
            content: content.into(),
            signature: signature.into(),
            identity: identity.into(),
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn make(content: &str, category: Option<&str>, created_at: i64) -> Submission {
        let keypair = Keypair::from_secret(&[0x42; 32]).unwrap();
        let signature = keypair.sign(content.as_bytes()).unwrap();
        Submission::new(
            keypair.identity(),
            content.to_string(),
            signature,
            category.map(str::to_string),
            created_at,
        )
    }

    #[test]
    fn test_new_is_pending_with_valid_id() {
        let s = make("i ate the last cookie", None, 1736870400000);
        assert!(s.is_pending());
        assert!(s.id_matches());
    }

    #[test]
    fn test_id_covers_signed_fields() {
        let base = make("same words", Some("secret"), 1000);
        assert_ne!(base.id, make("same words", Some("regret"), 1000).id);
        assert_ne!(base.id, make("same words", Some("secret"), 1001).id);
        assert_ne!(base.id, make("other words", Some("secret"), 1000).id);
        assert_eq!(base.id, make("same words", Some("secret"), 1000).id);
    }

    #[test]
    fn test_tampered_content_breaks_id() {
        let mut s = make("original", None, 1000);
        s.content = "edited".to_string();
        assert!(!s.id_matches());
    }

    #[test]
    fn test_block_ref_does_not_change_id() {
        let mut s = make("sealed later", None, 1000);
        s.block_ref = Some(3);
        assert!(s.id_matches());
        assert!(!s.is_pending());
    }

    #[test]
    fn test_request_json_category_optional() {
        let json = r#"{"content":"hi","signature":"0x00","identity":"0x01"}"#;
        let request: SubmissionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.category, None);
        assert_eq!(request.content, "hi");
    }
}
