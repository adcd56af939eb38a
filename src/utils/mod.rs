use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

pub mod logger;

pub use logger::init_logging;

/// Mainnet network id, the low nibble of every Shelley address header.
pub const MAINNET: u8 = 1;

/// Hash length of payment and stake credentials.
pub const CREDENTIAL_LEN: usize = 28;

pub fn remove_trailing_slash(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

/// One half of a Shelley address: a 28-byte key hash or script hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Key(&'a [u8]),
    Script(&'a [u8]),
}

impl<'a> Credential<'a> {
    fn hash(&self) -> &'a [u8] {
        match self {
            Credential::Key(h) | Credential::Script(h) => h,
        }
    }

    fn is_script(&self) -> bool {
        matches!(self, Credential::Script(_))
    }
}

/// Encode a mainnet Shelley address (bech32 `addr1...`) from its credentials.
///
/// Header type nibble:
///   0..=3 base address (payment key/script x stake key/script)
///   6, 7  enterprise address (no staking part), key or script payment
pub fn shelley_address(payment: Credential, stake: Option<Credential>) -> Result<String> {
    for cred in std::iter::once(&payment).chain(stake.as_ref()) {
        if cred.hash().len() != CREDENTIAL_LEN {
            return Err(anyhow!(
                "credential must be {} bytes, got {}",
                CREDENTIAL_LEN,
                cred.hash().len()
            ));
        }
    }
    let header_type: u8 = match stake {
        Some(stake) => (payment.is_script() as u8) | ((stake.is_script() as u8) << 1),
        None => 6 | payment.is_script() as u8,
    };
    let mut payload = Vec::with_capacity(1 + 2 * CREDENTIAL_LEN);
    payload.push((header_type << 4) | MAINNET);
    payload.extend_from_slice(payment.hash());
    if let Some(stake) = stake {
        payload.extend_from_slice(stake.hash());
    }
    let hrp = bech32::Hrp::parse("addr").map_err(|e| anyhow!("bech32 HRP error: {}", e))?;
    bech32::encode::<bech32::Bech32>(hrp, &payload)
        .map_err(|e| anyhow!("bech32 encode error: {}", e))
}

/// Longest pause between two attempts.
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Exponential backoff for requests to flaky indexers and registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Pause before retry number `attempt + 1`: the base delay doubled per attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(5);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(MAX_RETRY_DELAY_MS))
    }

    /// Run `f` until it succeeds or the retries are spent, returning the last error.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= self.retries {
                return Err(err);
            }
            let delay = self.delay(attempt);
            warn!(
                what,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_address(hash_hex: &str) -> String {
        let hash = hex::decode(hash_hex).unwrap();
        shelley_address(Credential::Script(&hash), None).unwrap()
    }

    #[test]
    fn test_enterprise_script_addresses() {
        assert_eq!(
            script_address("ea07914e72654ca5a5c5e26a95596e6fa0b5c4c317e43e2f92457ea1"),
            "addr1w84q0y2wwfj5efd9ch3x492edeh6pdwycvt7g030jfzhagg5ftr54"
        );
        assert_eq!(
            script_address("8c66f1ac8b57debcab9a07b3b9b0a5595a5ad76e3bcae756c82efe4f"),
            "addr1wxxxdudv3dtaa09tngrm8wds54v45kkhdcau4e6keqh0uncksc7pn"
        );
    }

    #[test]
    fn test_base_address_header() {
        let pay = [0x11u8; 28];
        let stake = [0x22u8; 28];
        let addr = shelley_address(Credential::Key(&pay), Some(Credential::Key(&stake))).unwrap();
        let (_, data) = bech32::decode(&addr).unwrap();
        assert_eq!(data[0], 0x01);
        assert_eq!(data.len(), 57);
        let addr =
            shelley_address(Credential::Script(&pay), Some(Credential::Key(&stake))).unwrap();
        let (_, data) = bech32::decode(&addr).unwrap();
        assert_eq!(data[0], 0x11);
    }

    #[test]
    fn test_invalid_credential_length() {
        assert!(shelley_address(Credential::Script(&[0u8; 2]), None).is_err());
        let short_stake = Some(Credential::Key(&[0u8; 3]));
        assert!(shelley_address(Credential::Key(&[0u8; 28]), short_stake).is_err());
    }

    #[test]
    fn test_remove_trailing_slash() {
        assert_eq!(remove_trailing_slash("http://kupo:1442/"), "http://kupo:1442");
        assert_eq!(remove_trailing_slash("http://kupo:1442"), "http://kupo:1442");
    }

    #[test]
    fn test_retry_delay_doubles_then_caps() {
        let policy = RetryPolicy {
            retries: 10,
            base_delay_ms: 500,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay(9), Duration::from_millis(16_000));
        let slow = RetryPolicy {
            retries: 1,
            base_delay_ms: 5_000,
        };
        assert_eq!(slow.delay(4), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mut calls = 0;
        let policy = RetryPolicy {
            retries: 2,
            base_delay_ms: 1,
        };
        let result: Result<(), &str> = policy
            .run("test", || {
                calls += 1;
                async { Err("down") }
            })
            .await;
        assert_eq!(result, Err("down"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let mut calls = 0;
        let result: Result<u32, String> = RetryPolicy::default()
            .run("test", || {
                calls += 1;
                let attempt = calls;
                async move { Ok(attempt) }
            })
            .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls, 1);
    }
}
