pub mod currency;
pub mod message;
pub mod narrative;
pub mod subscription;
pub mod user;

pub use currency::BesitosTransactionType;
pub use message::{Message, MessageStatus};
pub use narrative::{
  Choice, FragmentMetadata, HintDefinition, HintUnlockCondition, NarrativeFragment, NarrativeProgress,
  UnlockConditions,
};
pub use subscription::{PlanType, SubscriptionRecord, SubscriptionStatus};
pub use user::{
  CurrentState, PlatformUserBlob, SessionData, UserContext, UserDocument, UserPreferences,
  UserProfile, UserProfilePatch, ViewHistoryEntry,
};
