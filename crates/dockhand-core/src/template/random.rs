//! Random identifiers for `{rand}` and `{randhex}`.
//!
//! Entropy comes from v4 UUIDs (OS CSPRNG). The version and variant bytes
//! carry fixed bits and are skipped.

use uuid::Uuid;

fn random_bytes(n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let id = Uuid::new_v4();
        for (i, byte) in id.as_bytes().iter().enumerate() {
            if i == 6 || i == 8 {
                continue;
            }
            out.push(*byte);
            if out.len() == n {
                break;
            }
        }
    }
    out
}

/// `n` uniformly distributed decimal digits.
pub fn digits(n: usize) -> String {
    let mut out = String::with_capacity(n);
    while out.len() < n {
        for byte in random_bytes(n - out.len()) {
            // 250 is the largest multiple of 10 below 256.
            if byte < 250 {
                out.push(char::from(b'0' + byte % 10));
            }
        }
    }
    out
}

/// `n` lowercase hex characters.
pub fn hex_digits(n: usize) -> String {
    let mut out = hex::encode(random_bytes(n.div_ceil(2)));
    out.truncate(n);
    out
}
