use profile_auth::Principal;
use serde::Serialize;

/// MeUser は `/me` で返す主体の公開情報。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeUser {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetMeOutput {
    pub authenticated: bool,
    pub user: MeUser,
}

/// GetMeUseCase は認証済み主体の情報を返す。
#[derive(Debug, Default)]
pub struct GetMeUseCase;

impl GetMeUseCase {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, principal: &Principal) -> GetMeOutput {
        GetMeOutput {
            authenticated: true,
            user: MeUser {
                sub: principal.subject.clone(),
                email: principal.email.clone(),
                name: principal.display_name.clone(),
                roles: principal.roles.iter().cloned().collect(),
            },
        }
    }
}
