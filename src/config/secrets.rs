//! Secret generation and small normalizers for configuration values

use rand::Rng;

/// Length of generated database passwords
pub const PASSWORD_LENGTH: usize = 40;

const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

/// Generate a database password from the given random source.
///
/// Callers own the generator; there is no process-wide seed.
pub fn generate_db_password<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PASSWORD_LENGTH)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// Reduce a URL-ish domain to a bare host name.
///
/// Strips an `http://`/`https://` scheme and anything after the first `/`.
pub fn parse_fqdn(fqdn: &str) -> &str {
    let fqdn = fqdn.strip_prefix("http://").unwrap_or(fqdn);
    let fqdn = fqdn.strip_prefix("https://").unwrap_or(fqdn);
    fqdn.split('/').next().unwrap_or(fqdn)
}
