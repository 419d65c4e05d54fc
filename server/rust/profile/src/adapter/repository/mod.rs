pub mod audit_log_postgres;
pub mod permission_postgres;
