use rand::{Rng, distributions::Alphanumeric};
use sha2::{Digest, Sha256};

pub const API_KEY_LENGTH: usize = 64;
pub const WEBHOOK_SECRET_LENGTH: usize = 40;
pub const LINK_CODE_LENGTH: usize = 10;

/// Upper-case letters and digits without the look-alikes O, 0, I and 1.
const LINK_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_api_key() -> String {
    random_token(API_KEY_LENGTH)
}

pub fn generate_webhook_secret() -> String {
    format!("whsec_{}", random_token(WEBHOOK_SECRET_LENGTH))
}

/// Public code of a payment link, easy to read out over the phone.
pub fn generate_link_code() -> String {
    let mut rng = rand::thread_rng();
    (0..LINK_CODE_LENGTH)
        .map(|_| char::from(LINK_CODE_ALPHABET[rng.gen_range(0..LINK_CODE_ALPHABET.len())]))
        .collect()
}

/// Random hex suffix for generated payment references.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(buf.as_mut_slice());
    hex::encode(buf)
}

/// Opaque key handed to merchants for status lookups. The nonce keeps two
/// requests with identical reference and amount apart.
pub fn generate_transaction_hash(reference: &str, merchant_id: &str, amount: &str) -> String {
    let nonce = random_token(16);
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    hasher.update(b":");
    hasher.update(merchant_id.as_bytes());
    hasher.update(b":");
    hasher.update(amount.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}
