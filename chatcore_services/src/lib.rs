pub mod narrative_service;
pub mod subscription_service;
pub mod topics;
pub mod user_service;
pub mod vip_checker;

pub use narrative_service::NarrativeService;
pub use subscription_service::SubscriptionService;
pub use user_service::UserService;
pub use vip_checker::VIPChecker;
