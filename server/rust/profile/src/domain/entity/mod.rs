pub mod audit_event;
pub mod auth_session;
pub mod job;
pub mod session;

pub use audit_event::{AuditActor, AuditEvent, AuditOutcome};
pub use auth_session::{AuthSession, LoginTransaction, AUTH_SESSION_KEY, LOGIN_TRANSACTION_KEY};
pub use job::{JobDefinition, JobError};
pub use session::Session;
