use std::sync::Arc;

use profile_auth::Principal;

use crate::domain::error::AccessError;
use crate::domain::repository::PermissionRepository;

/// AuthorizationService は主体が指定パーミッションを持つかを判定するドメインサービス。
///
/// 判定は毎回ロールからパーミッションの和集合を求め直す。監査は行わない。
pub struct AuthorizationService {
    permission_repo: Arc<dyn PermissionRepository>,
}

impl AuthorizationService {
    pub fn new(permission_repo: Arc<dyn PermissionRepository>) -> Self {
        Self { permission_repo }
    }

    /// `permission` が主体のロールのパーミッション和集合に含まれるかを返す。
    ///
    /// ロールが無い主体はリポジトリを参照せずに常に false。
    /// リポジトリ障害は拒否ではなく `AuthorizationUnavailable` として返す。
    pub async fn has_permission(
        &self,
        principal: &Principal,
        permission: &str,
    ) -> Result<bool, AccessError> {
        if principal.roles.is_empty() {
            return Ok(false);
        }

        let roles: Vec<String> = principal.roles.iter().cloned().collect();
        let permissions = self
            .permission_repo
            .permissions_for_roles(&roles)
            .await
            .map_err(|e| AccessError::AuthorizationUnavailable(e.to_string()))?;

        Ok(permissions.contains(permission))
    }
}
