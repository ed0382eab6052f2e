//! Persistence of the SQLite price cache across reopen

use reflect_gains::gains::price_cache::{cache_key, PriceCache, UNRESOLVED_SENTINEL};
use reflect_gains::gains::SqlitePriceCache;

#[tokio::test]
async fn test_sqlite_cache_survives_reopen() {
    let path = std::env::temp_dir().join(format!("price_cache_{}.db", rand::random::<u64>()));

    let cache = SqlitePriceCache::open(&path).await.expect("Failed to open cache");
    cache.set(&cache_key("0xpriced"), "42.125").await.unwrap();
    cache.set(&cache_key("0xpending"), UNRESOLVED_SENTINEL).await.unwrap();
    cache.close().await;

    let reopened = SqlitePriceCache::open(&path).await.expect("Failed to reopen cache");
    assert_eq!(
        reopened.get(&cache_key("0xpriced")).await.unwrap().as_deref(),
        Some("42.125")
    );
    assert_eq!(
        reopened.get(&cache_key("0xpending")).await.unwrap().as_deref(),
        Some(UNRESOLVED_SENTINEL)
    );

    // Resolved entries are immutable; the sentinel is not.
    reopened.set(&cache_key("0xpriced"), "1").await.unwrap();
    reopened.set(&cache_key("0xpending"), "3.5").await.unwrap();
    assert_eq!(
        reopened.get(&cache_key("0xpriced")).await.unwrap().as_deref(),
        Some("42.125")
    );
    assert_eq!(
        reopened.get(&cache_key("0xpending")).await.unwrap().as_deref(),
        Some("3.5")
    );
    assert_eq!(reopened.len().await.unwrap(), 2);

    reopened.close().await;
    let _ = std::fs::remove_file(&path);
}
