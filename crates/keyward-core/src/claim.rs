//! Signed identity claims.
//!
//! A request layer receives a [`SignedClaim`], verifies it against the
//! issuer's key, and passes the resulting [`AccountId`] to the vault. The
//! vault itself never sees unverified identities.

use serde::{Deserialize, Serialize};

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, SigningKeypair};
use crate::error::{CoreError, Result};
use crate::types::{AccountId, OrgId};

/// Domain separator prepended to the claim bytes before signing.
pub const CLAIM_DOMAIN: &[u8] = b"keyward-claim-v1:";

/// An identity assertion: "this account acts within this org".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub org_id: OrgId,
    pub account_id: AccountId,
    /// Unix milliseconds.
    pub issued_at: i64,
    /// Unix milliseconds.
    pub expires_at: i64,
}

impl Claim {
    /// Canonical CBOR encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    fn signed_message(bytes: &[u8]) -> Vec<u8> {
        let mut msg = Vec::with_capacity(CLAIM_DOMAIN.len() + bytes.len());
        msg.extend_from_slice(CLAIM_DOMAIN);
        msg.extend_from_slice(bytes);
        msg
    }

    /// Sign this claim.
    pub fn sign(self, issuer: &SigningKeypair) -> Result<SignedClaim> {
        let body = self.to_bytes()?;
        let signature = issuer.sign(&Self::signed_message(&body));
        Ok(SignedClaim { body, signature })
    }
}

/// A claim and the issuer's signature over its canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedClaim {
    body: Vec<u8>,
    signature: Ed25519Signature,
}

impl SignedClaim {
    /// Check the signature and validity window, returning the claim.
    pub fn verify(&self, issuer: &Ed25519PublicKey, now: i64) -> Result<Claim> {
        issuer.verify(&Claim::signed_message(&self.body), &self.signature)?;

        let claim: Claim = ciborium::from_reader(self.body.as_slice())
            .map_err(|e| CoreError::DecodingError(e.to_string()))?;

        if now < claim.issued_at {
            return Err(CoreError::ClaimNotYetValid {
                issued_at: claim.issued_at,
                now,
            });
        }
        if now > claim.expires_at {
            return Err(CoreError::ClaimExpired {
                expires_at: claim.expires_at,
                now,
            });
        }

        Ok(claim)
    }

    /// Wire form: 64-byte signature followed by the CBOR body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Parse the wire form. The signature is not checked here.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= 64 {
            return Err(CoreError::DecodingError("claim too short".into()));
        }
        let (sig, body) = bytes.split_at(64);
        let mut arr = [0u8; 64];
        arr.copy_from_slice(sig);
        Ok(Self {
            body: body.to_vec(),
            signature: Ed25519Signature::from_bytes(arr),
        })
    }
}
