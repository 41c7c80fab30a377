pub mod coordinator;
pub mod gamification_client;
pub mod hint_system;
pub mod messenger;

pub use coordinator::{BesitosOutcome, Coordinator, InteractionAction};
pub use gamification_client::GamificationClient;
pub use hint_system::HintSystem;
pub use messenger::{ChatSender, Messenger};
