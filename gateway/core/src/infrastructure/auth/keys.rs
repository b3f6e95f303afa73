// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! RSA signing key for the local token issuer and its public JWKS form.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const KEY_BITS: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to generate RSA key: {0}")]
    Generate(String),
    #[error("failed to decode RSA private key: {0}")]
    Decode(String),
    #[error("failed to encode RSA private key: {0}")]
    Encode(String),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Public half of a signing key as published in a JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<PublicJwk>,
}

/// RS256 key pair with a stable key id derived from the modulus.
pub struct SigningKeyPair {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    modulus: String,
    exponent: String,
}

impl SigningKeyPair {
    /// Generates a fresh 2048-bit key. Only suitable for the local issuer.
    pub fn generate() -> Result<Self, KeyError> {
        let key = RsaPrivateKey::new(&mut rand_core::OsRng, KEY_BITS)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        Self::from_private_key(&key)
    }

    /// Loads a PKCS#1 PEM private key.
    pub fn from_pkcs1_pem(pem: &str) -> Result<Self, KeyError> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| KeyError::Decode(e.to_string()))?;
        Self::from_private_key(&key)
    }

    fn from_private_key(key: &RsaPrivateKey) -> Result<Self, KeyError> {
        let der = key.to_pkcs1_der().map_err(|e| KeyError::Encode(e.to_string()))?;
        let encoding = EncodingKey::from_rsa_der(der.as_bytes());

        let modulus_bytes = key.n().to_bytes_be();
        let modulus = URL_SAFE_NO_PAD.encode(&modulus_bytes);
        let exponent = URL_SAFE_NO_PAD.encode(key.e().to_bytes_be());
        let decoding = DecodingKey::from_rsa_components(&modulus, &exponent)?;

        let fingerprint = hex::encode(Sha256::digest(&modulus_bytes));
        Ok(Self {
            kid: format!("mock-key-{}", &fingerprint[..8]),
            encoding,
            decoding,
            modulus,
            exponent,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn public_jwk(&self) -> PublicJwk {
        PublicJwk {
            kty: "RSA".to_string(),
            alg: "RS256".to_string(),
            key_use: "sig".to_string(),
            kid: self.kid.clone(),
            n: self.modulus.clone(),
            e: self.exponent.clone(),
        }
    }

    pub fn jwks(&self) -> JwksDocument {
        JwksDocument {
            keys: vec![self.public_jwk()],
        }
    }
}

/// Fixed 2048-bit key shared by tests. Never use outside tests.
#[cfg(test)]
pub(crate) const TEST_RSA_PRIVATE_PEM: &str = include_str!("../../../tests/fixtures/signing_key.pem");
