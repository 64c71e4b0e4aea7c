// =============================================================================
// OVERLAY COORDINATOR — envelope.rs
// AES-GCM Envelope: nonce + ciphertext + tag
//
// Компоненты:
//   SharedKey      — pre-shared симметричный ключ (128 или 256 бит)
//   NonceSequence  — salt ‖ counter, один на процесс: nonce не повторяется
//                    ни для одного ключа, сколько бы кодеков ни было
//   Envelope       — JSON обёртка {nonce, ciphertext, tag} в base64
//   EnvelopeCodec  — seal / open
// =============================================================================

use crate::constants::{NONCE_SALT_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::protocol::Message;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::OnceLock;

pub const KEY_ENV_VAR: &str = "COORDINATOR_KEY";

// -----------------------------------------------------------------------------
// SharedKey
// -----------------------------------------------------------------------------

/// Pre-shared key distributed out-of-band. Every party holds the same bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey {
    bytes: Vec<u8>,
}

impl SharedKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            16 | 32 => Ok(SharedKey { bytes: bytes.to_vec() }),
            n => Err(Error::Config(format!("key must be 16 or 32 bytes, got {}", n))),
        }
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Config(format!("key is not valid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_env() -> Result<Self> {
        let encoded = std::env::var(KEY_ENV_VAR)
            .map_err(|_| Error::Config(format!("{} is not set", KEY_ENV_VAR)))?;
        Self::from_base64(&encoded)
    }

    /// Fresh 256-bit key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        SharedKey { bytes }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn bits(&self) -> usize {
        self.bytes.len() * 8
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey({} bits, redacted)", self.bits())
    }
}

// -----------------------------------------------------------------------------
// NonceSequence
// -----------------------------------------------------------------------------

/// `salt(8) ‖ counter_be(4)`. The counter never wraps.
///
/// Codecs share the process-wide sequence from [`NonceSequence::process`],
/// so two codecs under the same key never emit the same nonce. Other
/// parties draw their own 64-bit salt.
pub struct NonceSequence {
    salt: [u8; NONCE_SALT_SIZE],
    counter: AtomicU32,
}

static PROCESS_NONCES: OnceLock<NonceSequence> = OnceLock::new();

impl NonceSequence {
    pub fn new() -> Self {
        let mut salt = [0u8; NONCE_SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        NonceSequence { salt, counter: AtomicU32::new(0) }
    }

    pub fn process() -> &'static NonceSequence {
        PROCESS_NONCES.get_or_init(NonceSequence::new)
    }

    pub fn next(&self) -> Result<[u8; NONCE_SIZE]> {
        let n = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_add(1))
            .map_err(|_| Error::protocol("nonce space exhausted for this process"))?;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..NONCE_SALT_SIZE].copy_from_slice(&self.salt);
        nonce[NONCE_SALT_SIZE..].copy_from_slice(&n.to_be_bytes());
        Ok(nonce)
    }

    pub fn issued(&self) -> u64 {
        u64::from(self.counter.load(Ordering::SeqCst))
    }
}

impl Default for NonceSequence {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Envelope — wire format
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

impl Envelope {
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::protocol(format!("bad envelope: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.nonce.len() + self.ciphertext.len() + self.tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod b64 {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: impl AsRef<[u8]>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// -----------------------------------------------------------------------------
// EnvelopeCodec
// -----------------------------------------------------------------------------

enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

/// Seals and opens envelopes under one shared key.
pub struct EnvelopeCodec {
    cipher: Cipher,
    nonces: &'static NonceSequence,
    sealed: AtomicU64,
}

impl EnvelopeCodec {
    pub fn new(key: &SharedKey) -> Result<Self> {
        let bad_len = |_| Error::Config("unsupported key length".to_string());
        let cipher = match key.bytes.len() {
            16 => Cipher::Aes128(Box::new(Aes128Gcm::new_from_slice(&key.bytes).map_err(bad_len)?)),
            _ => Cipher::Aes256(Box::new(Aes256Gcm::new_from_slice(&key.bytes).map_err(bad_len)?)),
        };
        Ok(EnvelopeCodec { cipher, nonces: NonceSequence::process(), sealed: AtomicU64::new(0) })
    }

    pub fn seal(&self, message: &Message) -> Result<Envelope> {
        self.seal_bytes(message.to_json()?)
    }

    /// Seals an arbitrary JSON object (messages with extra fields such as `size`).
    pub fn seal_value(&self, value: &serde_json::Value) -> Result<Envelope> {
        self.seal_bytes(serde_json::to_vec(value)?)
    }

    fn seal_bytes(&self, mut buffer: Vec<u8>) -> Result<Envelope> {
        let nonce = self.nonces.next()?;
        let nonce_ga = GenericArray::from_slice(&nonce);
        let tag = match &self.cipher {
            Cipher::Aes128(c) => c.encrypt_in_place_detached(nonce_ga, b"", &mut buffer),
            Cipher::Aes256(c) => c.encrypt_in_place_detached(nonce_ga, b"", &mut buffer),
        }
        .map_err(|_| Error::protocol("encryption failed"))?;
        self.sealed.fetch_add(1, Ordering::Relaxed);
        Ok(Envelope { nonce: nonce.to_vec(), ciphertext: buffer, tag: tag.to_vec() })
    }

    /// Verifies the tag, then parses the plaintext as JSON.
    pub fn open_value(&self, envelope: &Envelope) -> Result<serde_json::Value> {
        let plaintext = self.open_bytes(envelope)?;
        serde_json::from_slice(&plaintext).map_err(|e| Error::protocol(format!("bad plaintext: {}", e)))
    }

    pub fn open(&self, envelope: &Envelope) -> Result<Message> {
        Message::from_value(self.open_value(envelope)?)
    }

    fn open_bytes(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        if envelope.nonce.len() != NONCE_SIZE || envelope.tag.len() != TAG_SIZE {
            return Err(Error::Authentication);
        }
        let nonce = GenericArray::from_slice(&envelope.nonce);
        let tag = GenericArray::from_slice(&envelope.tag);
        let mut buffer = envelope.ciphertext.clone();
        let verified = match &self.cipher {
            Cipher::Aes128(c) => c.decrypt_in_place_detached(nonce, b"", &mut buffer, tag),
            Cipher::Aes256(c) => c.decrypt_in_place_detached(nonce, b"", &mut buffer, tag),
        };
        // буфер не покидает функцию без проверенного тега
        verified.map_err(|_| Error::Authentication)?;
        Ok(buffer)
    }

    pub fn sealed_count(&self) -> u64 {
        self.sealed.load(Ordering::Relaxed)
    }
}
