//! 先到先得赠品活动的中奖判定引擎
//!
//! 按订单创建时间的先后，选出最先下单且订单最终成功、金额达到门槛的前 N 名客户。
//! 订单结果乱序到达，队首阻塞保证更晚的订单不能越过仍未决的更早订单。

pub mod backlog;
pub mod engine;
pub mod error;
pub mod finalizer;
pub mod ledger;
pub mod membership;
pub mod models;
pub mod progress;
pub mod registry;
pub mod repository;
pub mod state;
pub mod store;

pub use engine::WinnerEngine;
pub use error::{EngineError, Result};
pub use finalizer::{FinalizationReport, WinnerFinalizer};
pub use models::{
    AdmitOutcome, Campaign, CampaignPolicy, DrainOutcome, OrderStatus, PendingOrder, StatusUpdate,
};
pub use registry::{CampaignRegistry, InMemoryCampaignRegistry, RedisCampaignRegistry};
pub use repository::{
    CampaignRepository, PgCampaignRepository, PgWinnerRepository, WinnerRepository,
};
pub use state::CampaignState;
pub use store::{CampaignStore, InMemoryCampaignStore, RedisCampaignStore};
