//! Many instances starting at once against one cache.

use std::sync::Arc;
use std::time::Duration;

use rogalik_cache::{MemoryCache, SharedCache};
use rogalik_keys::{KeyConfig, KeyPairManager, KeyPairStatus, SymmetricEncryptor};

fn config() -> KeyConfig {
    KeyConfig {
        poll_interval: Duration::from_millis(10),
        ..KeyConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_instance_generates() {
    let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
    let managers: Vec<Arc<KeyPairManager>> = (0..8)
        .map(|_| {
            Arc::new(
                KeyPairManager::new(
                    Arc::clone(&cache),
                    SymmetricEncryptor::from_bytes(&[3u8; 32]),
                    config(),
                )
                .unwrap(),
            )
        })
        .collect();

    let handles: Vec<_> = managers
        .iter()
        .map(|m| {
            let m = Arc::clone(m);
            tokio::spawn(async move { m.ensure_keys().await.unwrap() })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }

    let generated = statuses
        .iter()
        .filter(|s| **s == KeyPairStatus::Generated)
        .count();
    assert_eq!(generated, 1, "statuses: {statuses:?}");

    let first = managers[0].get_public_key().await.unwrap();
    for m in &managers {
        assert_eq!(m.get_public_key().await.unwrap(), first);
        assert!(m.get_private_key().await.is_ok());
    }
    assert!(!cache.exists(rogalik_keys::KEYPAIR_LOCK).await.unwrap());
}

#[tokio::test]
async fn test_late_instance_sees_existing_pair() {
    let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
    let encryptor = SymmetricEncryptor::from_bytes(&[3u8; 32]);

    let first = KeyPairManager::new(Arc::clone(&cache), encryptor.clone(), config()).unwrap();
    assert_eq!(first.ensure_keys().await.unwrap(), KeyPairStatus::Generated);

    let late = KeyPairManager::new(cache, encryptor, config()).unwrap();
    assert_eq!(late.ensure_keys().await.unwrap(), KeyPairStatus::Existing);
    assert_eq!(
        late.get_public_key().await.unwrap(),
        first.get_public_key().await.unwrap()
    );
}
