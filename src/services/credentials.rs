//! Per-user tracker API keys
//!
//! Keys are sealed with AES-256-GCM before they reach the store. The stored
//! form is base64 of `nonce || ciphertext`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::UserApiKey;
use crate::services::tracker::TrackerClient;
use crate::store::CredentialStore;

const NONCE_LEN: usize = 12;

/// Authenticated encryption for stored API keys
#[derive(Clone)]
pub struct ApiKeyCipher {
    cipher: Aes256Gcm,
}

impl ApiKeyCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| AppError::CryptoError(format!("key must be 32 bytes, got {}", key.len())))?;
        Ok(Self { cipher })
    }

    /// Key material given as base64, as it appears in configuration
    pub fn from_base64(secret: &str) -> Result<Self> {
        let key = BASE64
            .decode(secret.trim())
            .map_err(|e| AppError::CryptoError(format!("secret is not valid base64: {}", e)))?;
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AppError::CryptoError(format!("encryption failed: {}", e)))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let sealed = BASE64
            .decode(encoded)
            .map_err(|e| AppError::CryptoError(format!("stored key is not valid base64: {}", e)))?;
        if sealed.len() <= NONCE_LEN {
            return Err(AppError::CryptoError("stored key is truncated".into()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AppError::CryptoError("stored key failed authentication".into()))?;
        String::from_utf8(plaintext).map_err(|e| AppError::CryptoError(e.to_string()))
    }
}

/// Decrypted API key of a registered user
pub async fn user_api_key<S: CredentialStore + ?Sized>(
    store: &S,
    cipher: &ApiKeyCipher,
    user_id: &str,
) -> Result<String> {
    let record = store.user_key(user_id).await?.ok_or_else(|| {
        AppError::InvalidRequest(format!(
            "no API key registered for '{}'; register one in settings first",
            user_id
        ))
    })?;
    cipher.decrypt(&record.api_key_encrypted)
}

/// Registration of user keys against the tracker's identity endpoint
pub struct KeyRegistry<'a, S: ?Sized> {
    pub tracker: &'a TrackerClient,
    pub store: &'a S,
    pub cipher: &'a ApiKeyCipher,
    pub email_domain: &'a str,
}

impl<'a, S: CredentialStore + ?Sized> KeyRegistry<'a, S> {
    /// Resolve the key's owner upstream, then store the key encrypted
    pub async fn register(&self, api_key: &str) -> Result<UserApiKey> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::InvalidRequest("api_key is required".into()));
        }

        let user = self
            .tracker
            .current_user(api_key)
            .await?
            .ok_or_else(|| AppError::InvalidRequest("API key was rejected by the tracker".into()))?;

        let now = Utc::now();
        let record = UserApiKey {
            user_name: user.display_name(),
            email: format!("{}@{}", user.login, self.email_domain),
            user_id: user.login,
            firstname: user.firstname,
            lastname: user.lastname,
            api_key_encrypted: self.cipher.encrypt(api_key)?,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_user_key(&record).await?;

        info!(user_id = %record.user_id, "Registered tracker API key");
        Ok(record)
    }

    pub async fn lookup(&self, user_id: &str) -> Result<Option<UserApiKey>> {
        self.store.user_key(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tracker::{TrackerConfig, API_KEY_HEADER};
    use crate::store::memory::MemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cipher() -> ApiKeyCipher {
        ApiKeyCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_is_randomized_and_reversible() {
        let cipher = cipher();
        let a = cipher.encrypt("secret-key").unwrap();
        let b = cipher.encrypt("secret-key").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), "secret-key");
    }

    #[test]
    fn test_tampering_and_wrong_key_are_rejected() {
        let sealed = cipher().encrypt("secret-key").unwrap();

        let other = ApiKeyCipher::new(&[8u8; 32]).unwrap();
        assert!(other.decrypt(&sealed).is_err());

        let mut bytes = BASE64.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(cipher().decrypt(&BASE64.encode(bytes)).is_err());
        assert!(cipher().decrypt("AAAA").is_err());
    }

    #[test]
    fn test_key_length_is_checked() {
        assert!(ApiKeyCipher::new(&[0u8; 16]).is_err());
        assert!(ApiKeyCipher::from_base64(&BASE64.encode([1u8; 32])).is_ok());
        assert!(ApiKeyCipher::from_base64("not base64!").is_err());
    }

    #[tokio::test]
    async fn test_register_stores_identity_and_encrypted_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .and(header(API_KEY_HEADER, "user-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": 3, "login": "jdoe", "firstname": "Jane", "lastname": "Doe"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tracker = TrackerClient::new(&TrackerConfig {
            base_url: server.uri(),
            api_key: "system".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let store = MemoryStore::new();
        let cipher = cipher();
        let registry = KeyRegistry {
            tracker: &tracker,
            store: &store,
            cipher: &cipher,
            email_domain: "example.com",
        };

        let record = registry.register(" user-key ").await.unwrap();
        assert_eq!(record.user_id, "jdoe");
        assert_eq!(record.user_name, "Jane Doe");
        assert_eq!(record.email, "jdoe@example.com");
        assert_ne!(record.api_key_encrypted, "user-key");

        assert_eq!(user_api_key(&store, &cipher, "jdoe").await.unwrap(), "user-key");
        assert!(matches!(
            user_api_key(&store, &cipher, "nobody").await,
            Err(AppError::InvalidRequest(_))
        ));

        assert!(matches!(
            registry.register("bad-key").await,
            Err(AppError::InvalidRequest(_))
        ));
    }
}
