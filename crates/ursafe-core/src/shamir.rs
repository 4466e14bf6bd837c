//! Threshold secret sharing over GF(256).
//!
//! A share is an opaque byte string: one identifier byte followed by one
//! byte per secret byte. Splitting is randomized, so two splits of the
//! same secret are never comparable share-for-share.

use sharks::{Share, Sharks};
use tracing::debug;

use crate::error::{Error, Result};

/// Shares required to reconstruct a split secret.
pub const REQUIRED_SHARES: usize = 10;
/// Total shares produced at split time.
pub const TOTAL_SHARES: usize = 20;

/// Split `secret` into `n` shares, any `m` of which reconstruct it.
pub fn split(secret: &[u8], n: usize, m: usize) -> Result<Vec<Vec<u8>>> {
    if secret.is_empty() {
        return Err(Error::InvalidParameters("secret must not be empty".into()));
    }
    if m < 1 {
        return Err(Error::InvalidParameters(
            "threshold must be at least 1".into(),
        ));
    }
    if m > n {
        return Err(Error::InvalidParameters(format!(
            "threshold {m} cannot exceed share count {n}"
        )));
    }
    if n > 255 {
        return Err(Error::InvalidParameters(format!(
            "share count {n} exceeds the GF(256) field limit"
        )));
    }
    let sharks = Sharks(m as u8);
    let shares: Vec<Vec<u8>> = sharks
        .dealer(secret)
        .take(n)
        .map(|share| Vec::from(&share))
        .collect();
    debug!(n, m, "split secret");
    Ok(shares)
}

/// Reconstruct a secret from shares produced by [`split`].
///
/// With at least as many shares as the split threshold this returns the
/// original secret. With fewer it returns bytes unequal to the original;
/// callers treat a downstream authentication failure as the
/// authoritative signal, exactly as the vault session does.
pub fn combine(shares: &[Vec<u8>]) -> Result<Vec<u8>> {
    if shares.is_empty() {
        return Err(Error::InvalidParameters("no shares provided".into()));
    }
    if shares.len() > 255 {
        return Err(Error::InvalidParameters(
            "more shares than the GF(256) field permits".into(),
        ));
    }
    let parsed: Vec<Share> = shares
        .iter()
        .map(|bytes| Share::try_from(bytes.as_slice()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::InvalidParameters(format!("malformed share: {e}")))?;
    let sharks = Sharks(parsed.len() as u8);
    sharks
        .recover(&parsed)
        .map_err(|e| Error::InvalidParameters(format!("share reconstruction failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rand::RngCore;

    fn random_secret() -> [u8; 32] {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        secret
    }

    #[test]
    fn share_shape() {
        let secret = random_secret();
        let shares = split(&secret, TOTAL_SHARES, REQUIRED_SHARES).unwrap();
        assert_eq!(shares.len(), TOTAL_SHARES);
        for share in &shares {
            assert_eq!(share.len(), secret.len() + 1);
        }
    }

    #[test]
    fn any_threshold_selection_reconstructs() {
        let secret = random_secret();
        let shares = split(&secret, TOTAL_SHARES, REQUIRED_SHARES).unwrap();

        // First half, second half, and a straddling pick.
        let host_half = &shares[..REQUIRED_SHARES];
        assert_eq!(combine(&host_half.to_vec()).unwrap(), secret);

        let usb_half = &shares[REQUIRED_SHARES..];
        assert_eq!(combine(&usb_half.to_vec()).unwrap(), secret);

        let straddle: Vec<Vec<u8>> = shares
            .iter()
            .skip(5)
            .take(REQUIRED_SHARES)
            .cloned()
            .collect();
        assert_eq!(combine(&straddle).unwrap(), secret);

        // More than the threshold also works.
        assert_eq!(combine(&shares[..15].to_vec()).unwrap(), secret);
    }

    #[test]
    fn below_threshold_yields_wrong_secret() {
        let secret = random_secret();
        let shares = split(&secret, TOTAL_SHARES, REQUIRED_SHARES).unwrap();
        let short = shares[..REQUIRED_SHARES - 1].to_vec();
        match combine(&short) {
            Ok(recovered) => assert_ne!(recovered.as_slice(), secret.as_slice()),
            Err(_) => {}
        }
    }

    #[test]
    fn splits_are_randomized() {
        let secret = random_secret();
        let first = split(&secret, TOTAL_SHARES, REQUIRED_SHARES).unwrap();
        let second = split(&secret, TOTAL_SHARES, REQUIRED_SHARES).unwrap();
        assert_ne!(first, second);
        assert_eq!(combine(&first[..10].to_vec()).unwrap(), secret);
        assert_eq!(combine(&second[..10].to_vec()).unwrap(), secret);
    }

    #[test]
    fn rejects_bad_parameters() {
        let secret = random_secret();
        assert!(split(&[], 20, 10).is_err());
        assert!(split(&secret, 10, 20).is_err());
        assert!(split(&secret, 20, 0).is_err());
        assert!(split(&secret, 300, 10).is_err());
        assert!(combine(&[]).is_err());
        assert!(combine(&[vec![1u8]]).is_err());
    }
}
