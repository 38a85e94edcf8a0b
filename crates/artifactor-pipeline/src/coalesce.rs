use artifactor_core::types::InferenceRequest;
use sha2::{Digest, Sha256};

/// Number of content bytes used when hashing a request id (matches the
/// "content-prefix" the stable hash is defined over).
const CONTENT_PREFIX_LEN: usize = 1000;

/// Compute the stable request id: a hash of (content-prefix, title,
/// description, file-type, language, user_id). Two submissions with
/// identical fields hash to the same id and therefore coalesce onto the
/// same cache entry and, if concurrent, the same in-flight computation.
pub fn compute_request_id(req: &InferenceRequest) -> String {
    let prefix_len = req.content.len().min(CONTENT_PREFIX_LEN);
    let mut hasher = Sha256::new();
    hasher.update(req.content[..prefix_len].as_bytes());
    hasher.update(b"\0");
    hasher.update(req.title.as_bytes());
    hasher.update(b"\0");
    hasher.update(req.description.as_bytes());
    hasher.update(b"\0");
    hasher.update(req.file_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(req.language.as_bytes());
    hasher.update(b"\0");
    hasher.update(req.user_id.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifactor_core::types::{InferencePriority, UserId};
    use chrono::Utc;

    fn req(content: &str) -> InferenceRequest {
        InferenceRequest {
            request_id: String::new(),
            content: content.to_string(),
            title: "t".into(),
            description: "d".into(),
            file_type: "rs".into(),
            language: "rust".into(),
            user_id: UserId::from("u1".to_string()),
            priority: InferencePriority::High,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn identical_fields_hash_identically() {
        assert_eq!(compute_request_id(&req("fn main() {}")), compute_request_id(&req("fn main() {}")));
    }

    #[test]
    fn different_content_hashes_differently() {
        assert_ne!(compute_request_id(&req("a")), compute_request_id(&req("b")));
    }
}
