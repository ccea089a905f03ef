use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tokio::sync::Barrier;

use crate::db::connect_sqlite_temp;
use crate::{user, verification_token};

/// Test that the conditional update lets exactly one of many concurrent callers win
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mark_used_is_at_most_once() -> Result<()> {
    let db = connect_sqlite_temp().await?;
    let u = user::create(&db, "race@example.com", "Race", user::DEFAULT_ROLE).await?;
    let token = verification_token::create(
        &db,
        u.id,
        &"f".repeat(64),
        verification_token::TYPE_PASSWORD_RESET,
        Utc::now() + Duration::hours(1),
    ).await?;

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let mut handles = Vec::with_capacity(contenders);
    for _ in 0..contenders {
        let db = db.clone();
        let barrier = Arc::clone(&barrier);
        let id = token.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            verification_token::mark_used(&db, id).await
        }));
    }

    let mut winners = 0;
    for h in handles {
        if h.await?? {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let stored = verification_token::find_by_hash(&db, &token.token_hash, &token.token_type).await?.expect("token row");
    assert!(stored.is_used);
    assert!(!verification_token::mark_used(&db, token.id).await?);
    Ok(())
}
