//! Signature verification: does a scraped signature carry the expected
//! links, and does its verification code belong to this forum profile?

use std::collections::BTreeSet;

use serde::Serialize;
use venue_core::{LinkCheck, VerificationCodec};

use crate::types::SignatureBlock;

/// Outcome of checking one signature. A mismatch is a business result, not
/// an error; `reason` says what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureVerification {
    pub found: bool,
    pub links_verified: bool,
    pub code_verified: bool,
    pub reason: Option<String>,
}

impl SignatureVerification {
    #[must_use]
    pub fn verified(&self) -> bool {
        self.links_verified && self.code_verified
    }

    /// Result used while test mode is on: every fetched page passes.
    #[must_use]
    pub fn test_mode() -> Self {
        Self {
            found: true,
            links_verified: true,
            code_verified: true,
            reason: None,
        }
    }

    fn not_found() -> Self {
        Self {
            found: false,
            links_verified: false,
            code_verified: false,
            reason: Some("signature not found".to_string()),
        }
    }
}

/// Identity the verification code must decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileIdentity {
    pub profile_id: u64,
    pub forum_user_id: u64,
}

/// Compare a scraped signature against the expected link set and check that
/// at least one embedded code decodes to `identity`.
#[must_use]
pub fn verify_signature(
    block: Option<&SignatureBlock>,
    expected: &BTreeSet<String>,
    codec: &VerificationCodec,
    identity: ProfileIdentity,
) -> SignatureVerification {
    let Some(block) = block.filter(|b| !b.links.is_empty()) else {
        return SignatureVerification::not_found();
    };

    let check = LinkCheck::compare(&block.links, expected);
    let code_verified = check.codes.iter().any(|code| {
        codec.matches_profile(code, identity.profile_id, identity.forum_user_id)
    });

    let reason = if let Some(reason) = check.mismatch_reason() {
        Some(reason)
    } else if code_verified {
        None
    } else {
        Some("verification code does not match this forum profile".to_string())
    };

    SignatureVerification {
        found: true,
        links_verified: check.matched,
        code_verified,
        reason,
    }
}
