pub mod audit_logger;
pub mod job_registry;
pub mod permission_repository;

pub use audit_logger::AuditLogger;
pub use job_registry::JobRegistry;
pub use permission_repository::PermissionRepository;
