use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &[u8], val: &[u8]) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("hmac takes keys of any length"));
    mac.update(val);
    mac
}

pub fn get_digest(secret: &[u8], val: &[u8]) -> Vec<u8> {
    mac_for(secret, val).finalize().into_bytes().to_vec()
}

/// Constant-time comparison against the expected digest.
pub fn is_valid(secret: &[u8], val: &[u8], digest: &[u8]) -> bool {
    mac_for(secret, val).verify_slice(digest).is_ok()
}
