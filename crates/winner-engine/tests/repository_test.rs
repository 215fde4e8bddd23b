//! PostgreSQL 仓储测试
//!
//! 需要运行中的数据库，表结构来自 `migrations/`：
//!
//! ```bash
//! TEST_DATABASE_URL=postgres://... cargo test -p winner-engine --test repository_test -- --ignored
//! ```

use giveaway_shared::database::Database;
use giveaway_shared::test_utils::{test_customer_id, test_database_config};
use winner_engine::{
    CampaignRepository, PgCampaignRepository, PgWinnerRepository, WinnerRepository,
};

async fn setup() -> Database {
    let db = Database::connect(&test_database_config())
        .await
        .expect("数据库不可用");
    sqlx::migrate!("../../migrations")
        .run(db.pool())
        .await
        .expect("迁移失败");
    db
}

async fn insert_campaign(db: &Database, campaign_type: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO campaigns (name, type, policy, start_time, end_time)
        VALUES ('launch', $1,
                '{"total_reward": 3, "min_order_amount": 199.5, "max_tracked_orders": 20}',
                NOW(), NOW() + INTERVAL '1 day')
        RETURNING id
        "#,
    )
    .bind(campaign_type)
    .fetch_one(db.pool())
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 实例"]
async fn test_load_campaign_by_type() {
    let db = setup().await;
    let campaign_type = format!("type-{}", test_customer_id());
    let id = insert_campaign(&db, &campaign_type).await;

    let repo = PgCampaignRepository::new(db.pool().clone());
    let campaign = repo
        .get_campaign_by_type(&campaign_type)
        .await
        .unwrap()
        .expect("活动应存在");

    assert_eq!(campaign.id, id);
    assert_eq!(campaign.policy.reward_count, 3);
    assert_eq!(campaign.policy.min_amount, 199.5);
    assert_eq!(campaign.policy.max_tracked_customers, 20);

    assert!(
        repo.get_campaign_by_type("no-such-type")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 实例"]
async fn test_save_winner_is_idempotent() {
    let db = setup().await;
    let id = insert_campaign(&db, &format!("type-{}", test_customer_id())).await;
    let repo = PgWinnerRepository::new(db.pool().clone());

    let customer = test_customer_id();
    repo.save_winner(id, &customer).await.unwrap();
    repo.save_winner(id, &customer).await.unwrap();

    assert_eq!(repo.list_winners(id).await.unwrap(), vec![customer]);
}
