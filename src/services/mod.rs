pub mod invite_issuer;
pub mod invite_tracker;
pub mod join_log;
pub mod resolver;
pub mod scheduler;
pub mod sequencer;
pub mod snapshot_store;

pub use invite_issuer::InviteIssuer;
pub use invite_tracker::{InviteTracker, JoinResolution};
pub use join_log::JoinLog;
pub use resolver::{find_used_invite, AttributionResolver, UsedInvite};
pub use scheduler::{DeferredRefreshScheduler, DEFAULT_DELETE_REFRESH_DELAY};
pub use sequencer::EventSequencer;
pub use snapshot_store::InviteSnapshotStore;
