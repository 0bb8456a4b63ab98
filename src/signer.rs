use sha2::Sha256;

/// Signature algorithm used for outbound payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureScheme {
    /// HMAC-SHA256 over the UTF-8 payload bytes, hex-encoded. The default.
    #[default]
    HmacSha256,
    /// Non-cryptographic rolling hash of `payload + secret`.
    ///
    /// Exists for environments without an HMAC primitive. Opt-in only;
    /// receivers can tell the two apart by the header prefix and MUST NOT
    /// treat this one as secure.
    Simple,
}

/// Signs delivery payloads with a webhook's shared secret.
///
/// Identical `(payload, secret)` inputs always produce identical signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureSigner {
    scheme: SignatureScheme,
}

impl SignatureSigner {
    /// Signer using the default HMAC-SHA256 scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signer with an explicit scheme.
    pub fn with_scheme(scheme: SignatureScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Sign a serialized payload. The result carries a scheme prefix
    /// (`sha256=` or `simple=`) so receivers know how to verify it.
    pub fn sign(&self, payload: &str, secret: &str) -> String {
        match self.scheme {
            SignatureScheme::HmacSha256 => format!("sha256={}", hmac_sha256(payload, secret)),
            SignatureScheme::Simple => format!("simple={:08x}", rolling_hash(payload, secret)),
        }
    }

    /// Verify a signature produced by [`SignatureSigner::sign`].
    pub fn verify(&self, payload: &str, secret: &str, signature: &str) -> bool {
        self.sign(payload, secret) == signature
    }
}

fn hmac_sha256(payload: &str, secret: &str) -> String {
    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC key can be of any size, as per crate documentation"),
    };

    mac.update(payload.as_bytes());

    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

fn rolling_hash(payload: &str, secret: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in payload.bytes().chain(secret.bytes()) {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
    }
    hash
}
