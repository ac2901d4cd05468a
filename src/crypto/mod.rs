//! NIST P-256 primitives used by both sides of a transaction.
//!
//! Public keys travel as 65 byte uncompressed SEC1 points, signatures as the 64 byte `r ‖ s`
//! form, and only the X coordinate of a point takes part in key derivation.

pub mod keystore;

use aes_gcm::aead::{Aead, Key, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use elliptic_curve::sec1::ToEncodedPoint;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{PublicKey, SecretKey};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use signature::{Signer, Verifier};

use crate::definitions::secure_channel::SecureChannelState;
use crate::error::{Error, Result};

/// Length of an uncompressed SEC1 encoded P-256 point.
pub const PUBLIC_KEY_LENGTH: usize = 65;
pub const SIGNATURE_LENGTH: usize = 64;

#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Import a 32 byte big-endian private scalar.
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        if secret.len() != 32 {
            return Err(Error::InvalidPrivateKey);
        }
        let secret = SecretKey::from_slice(secret).map_err(|_| Error::InvalidPrivateKey)?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn secret_bytes(&self) -> Vec<u8> {
        self.secret.to_bytes().to_vec()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("secret", &"<redacted>")
            .field("public", &hex::encode(encode_public_key(&self.public)))
            .finish()
    }
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

pub fn generate_ephemeral_keypair() -> KeyPair {
    KeyPair::generate()
}

pub fn encode_public_key(public_key: &PublicKey) -> [u8; PUBLIC_KEY_LENGTH] {
    let point = public_key.to_encoded_point(false);
    let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
    bytes.copy_from_slice(point.as_bytes());
    bytes
}

/// The X coordinate of `public_key`.
pub fn x_bytes(public_key: &PublicKey) -> [u8; 32] {
    let mut x = [0u8; 32];
    x.copy_from_slice(&encode_public_key(public_key)[1..33]);
    x
}

pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != PUBLIC_KEY_LENGTH {
        return Err(Error::InvalidPublicKey);
    }
    PublicKey::from_sec1_bytes(bytes).map_err(|_| Error::InvalidPublicKey)
}

/// HKDF-SHA-256 extract and expand into `N` bytes.
pub fn key_derivation<const N: usize>(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; N]> {
    let mut okm = [0u8; N];
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(info, &mut okm)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

pub fn generate_signature(data: &[u8], secret: &SecretKey) -> Result<[u8; SIGNATURE_LENGTH]> {
    let signing_key = SigningKey::from(secret);
    let signature: Signature = signing_key
        .try_sign(data)
        .map_err(|e| Error::Signing(e.to_string()))?;
    let mut bytes = [0u8; SIGNATURE_LENGTH];
    bytes.copy_from_slice(&signature.to_bytes());
    Ok(bytes)
}

pub fn verify_signature(data: &[u8], public_key: &PublicKey, signature: &[u8]) -> bool {
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    VerifyingKey::from(public_key)
        .verify(data, &signature)
        .is_ok()
}

/// SHA-256 over the shared X coordinate, a big-endian counter of 1 and the transaction id.
pub fn diffie_hellman_key_derivation(
    remote_public: &PublicKey,
    local_secret: &SecretKey,
    transaction_identifier: &[u8],
) -> [u8; 32] {
    let shared = p256::ecdh::diffie_hellman(local_secret.to_nonzero_scalar(), remote_public.as_affine());
    let mut hasher = Sha256::new();
    hasher.update(shared.raw_secret_bytes());
    hasher.update(1u32.to_be_bytes());
    hasher.update(transaction_identifier);
    hasher.finalize().into()
}

fn nonce(counter: u32) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[7] = 0x01;
    nonce[11] = counter as u8;
    nonce
}

fn channel_cipher(channel: &SecureChannelState) -> Result<Aes256Gcm> {
    let keys = channel.keys()?;
    let key = Key::<Aes256Gcm>::from(keys.exchange_sk_device);
    Ok(Aes256Gcm::new(&key))
}

/// Encrypt `data` under the device exchange key, returning the advanced channel.
pub fn response_encryption(
    channel: &SecureChannelState,
    data: &[u8],
) -> Result<(SecureChannelState, Vec<u8>)> {
    let cipher = channel_cipher(channel)?;
    let nonce = nonce(channel.counter());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), data)
        .map_err(|_| Error::Aead("encryption"))?;
    Ok((channel.advanced(), ciphertext))
}

pub fn response_decryption(
    channel: &SecureChannelState,
    data: &[u8],
) -> Result<(SecureChannelState, Vec<u8>)> {
    let cipher = channel_cipher(channel)?;
    let nonce = nonce(channel.counter());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), data)
        .map_err(|_| Error::Aead("decryption"))?;
    Ok((channel.advanced(), plaintext))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definitions::secure_channel::{SecureChannelKeys, VOLATILE_KEY_BLOCK_LENGTH};
    use hex_literal::hex;

    fn channel() -> SecureChannelState {
        let block = key_derivation::<VOLATILE_KEY_BLOCK_LENGTH>(b"ikm", &[0u8; 32], b"info").unwrap();
        SecureChannelState::new(Some(SecureChannelKeys::from_volatile_block(&block)))
    }

    #[test]
    fn nonce_layout() {
        assert_eq!(nonce(1), hex!("000000000000000100000001"));
        assert_eq!(nonce(0x1FF), hex!("0000000000000001000000ff"));
    }

    #[test]
    fn aead_round_trip_advances_counter_twice() {
        let sender = channel();
        let (sender_after, ciphertext) = response_encryption(&sender, b"attack at dawn").unwrap();
        assert_eq!(sender_after.counter(), 2);
        assert_eq!(ciphertext.len(), b"attack at dawn".len() + 16);

        let (receiver_after, plaintext) = response_decryption(&sender, &ciphertext).unwrap();
        assert_eq!(plaintext, b"attack at dawn");

        let (receiver_after, _) = response_encryption(&receiver_after, b"").unwrap();
        assert_eq!(receiver_after.counter(), sender.counter() + 2);

        // wrong counter means wrong nonce
        assert!(matches!(
            response_decryption(&sender_after, &ciphertext),
            Err(Error::Aead(_))
        ));
    }

    #[test]
    fn aead_requires_keys() {
        let channel = SecureChannelState::default();
        assert!(matches!(
            response_encryption(&channel, b"data"),
            Err(Error::MissingChannelKeys)
        ));
        assert!(matches!(
            response_decryption(&channel, b"data"),
            Err(Error::MissingChannelKeys)
        ));
    }

    #[test]
    fn signatures() {
        let keypair = KeyPair::generate();
        let data = hex!("4d0411223344860201024c0100");
        let signature = generate_signature(&data, keypair.secret_key()).unwrap();
        assert!(verify_signature(&data, keypair.public_key(), &signature));

        for i in 0..data.len() {
            let mut tampered = data;
            tampered[i] ^= 0x01;
            assert!(!verify_signature(&tampered, keypair.public_key(), &signature));
        }
        assert!(!verify_signature(&data, KeyPair::generate().public_key(), &signature));
        assert!(!verify_signature(&data, keypair.public_key(), &signature[..63]));
    }

    #[test]
    fn diffie_hellman_is_symmetric() {
        let reader = KeyPair::generate();
        let endpoint = KeyPair::generate();
        let transaction_identifier = random_bytes::<16>();
        assert_eq!(
            diffie_hellman_key_derivation(
                endpoint.public_key(),
                reader.secret_key(),
                &transaction_identifier
            ),
            diffie_hellman_key_derivation(
                reader.public_key(),
                endpoint.secret_key(),
                &transaction_identifier
            ),
        );
    }

    #[test]
    fn public_key_encoding() {
        let keypair = KeyPair::generate();
        let encoded = encode_public_key(keypair.public_key());
        assert_eq!(encoded[0], 0x04);
        assert_eq!(&encoded[1..33], &x_bytes(keypair.public_key()));
        assert_eq!(&decode_public_key(&encoded).unwrap(), keypair.public_key());

        let compressed = keypair.public_key().to_encoded_point(true);
        assert!(matches!(
            decode_public_key(compressed.as_bytes()),
            Err(Error::InvalidPublicKey)
        ));
        assert!(decode_public_key(&[0x04; 65]).is_err());
    }

    #[test]
    fn private_key_import() {
        let keypair = KeyPair::generate();
        let imported = KeyPair::from_bytes(&keypair.secret_bytes()).unwrap();
        assert_eq!(imported.public_key(), keypair.public_key());
        assert!(KeyPair::from_bytes(&[0u8; 32]).is_err());
        assert!(KeyPair::from_bytes(&[1u8; 31]).is_err());
        assert!(!format!("{keypair:?}").contains(&hex::encode(keypair.secret_bytes())));
    }
}
