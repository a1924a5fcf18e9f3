pub mod broadcast_hub;
pub mod drafting;
pub mod oracle_gateway;
pub mod pipeline;
pub mod progress_tracker;
pub mod prompts;
pub mod retry;
pub mod verification_loop;
pub mod verifying;

pub use broadcast_hub::{ChannelSubscriber, EventBroadcastHub, SubscriberHandle};
pub use drafting::{Draft, DraftingRole};
pub use oracle_gateway::OracleGateway;
pub use pipeline::{decide, DocumentInput, PipelineRequest, StageOrchestrator};
pub use progress_tracker::ProgressTracker;
pub use prompts::RoleInstructions;
pub use retry::{RetryPolicy, Retryable};
pub use verification_loop::{LoopDecision, LoopOutcome, LoopPhase, LoopState, VerificationLoop};
pub use verifying::{FixedRecall, RecallEstimator, Verification, VerifyingRole};
