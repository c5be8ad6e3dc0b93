//! Property tests for the cache eviction bound and the crypto
//! round-trip, run against arbitrary inputs rather than fixed cases.

use std::time::Duration;

use proptest::prelude::*;
use store_core::cache::{Cache, CacheConfig};
use store_core::crypto;

fn cache_config(max_size: usize) -> CacheConfig {
    CacheConfig {
        max_size,
        default_ttl: Duration::ZERO,
        cleanup_interval: Duration::from_secs(60),
    }
}

proptest! {
    /// However many distinct entries are pushed through, the cache
    /// never holds more than `max_size` of them at once.
    #[test]
    fn cache_never_exceeds_max_size(max_size in 1usize..16, inserts in 0usize..200) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let cache = Cache::new(cache_config(max_size));
            for i in 0..inserts {
                cache.set(&format!("e{i}"), vec![i as u8], 1).await;
                prop_assert!(cache.len().await <= max_size);
            }
            Ok(())
        })?;
    }

    /// AES-256-GCM decrypt always recovers the original plaintext for
    /// any byte string it was encrypted from.
    #[test]
    fn encrypt_decrypt_round_trips_for_any_plaintext(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
        let key = crypto::generate_symmetric();
        let enc = crypto::encrypt(&key, &plaintext).unwrap();
        let decrypted = crypto::decrypt(&key, &enc.ciphertext, &enc.nonce, &enc.tag).unwrap();
        prop_assert_eq!(decrypted, plaintext);
    }
}
