//! Ferry Core - sessions, domain policy, and shared models.
//!
//! This crate holds the state-owning and pure parts of the Ferry web relay:
//!
//! - [`session`] - the session registry with sliding expiry and sweeping
//! - [`policy`] - allow/block evaluation of target URLs
//! - [`settings`] - process-wide relay configuration
//! - [`models`] - the forwarding request and response envelopes
//! - [`crypto`] - digest and credential generation
//! - [`clock`] - the time source shared by everything with a TTL

pub mod clock;
pub mod crypto;
pub mod models;
pub mod policy;
pub mod session;
pub mod settings;

pub use clock::{Clock, ManualClock, SystemClock};
pub use models::{ProxyRequest, ProxyResponse};
pub use policy::{is_allowed, PolicyDecision, PolicyFilter};
pub use session::{Session, SessionId, SessionRegistry, SessionStatus, SESSION_TIMEOUT};
pub use settings::ProxySettings;
