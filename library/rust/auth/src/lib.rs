//! profile-auth: OIDC 信頼アンカーに対するトークン検証ライブラリ
//!
//! ディスカバリドキュメントと JWKS エンドポイントから公開鍵を取得し、JWT の署名・発行者・
//! オーディエンス・有効期限を検証する。検証済み Claims から `Principal` を導出し、
//! Authorization Code + PKCE フローで使用する PKCE パラメータ生成とトークン交換も提供する。
//!
//! # 使い方
//!
//! ```ignore
//! use profile_auth::{JwksKeyStore, JwksVerifier};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let keys = Arc::new(JwksKeyStore::new(
//!     "https://auth.example.com/realms/app/protocol/openid-connect/certs",
//!     Duration::from_secs(600),
//!     Duration::from_secs(5),
//! ));
//! let verifier = JwksVerifier::new(keys, "https://auth.example.com/realms/app", Some("profile-api"));
//!
//! let verified = verifier.verify("eyJ...").await?;
//! println!("{}", verified.principal);
//! ```

pub mod claims;
pub mod code_exchange;
pub mod discovery;
pub mod error;
pub mod jwks;
pub mod pkce;
pub mod principal;
pub mod single_flight;
pub mod verifier;

pub use claims::IdentityClaims;
pub use code_exchange::{CodeExchangeClient, CodeExchangeRequest, TokenResponse};
pub use discovery::{discover, ProviderMetadata};
pub use error::AuthError;
pub use jwks::{DefaultJwksFetcher, JwksFetcher, JwksKeyStore};
pub use pkce::{code_challenge_s256, LoginArtifacts};
pub use principal::{Principal, RawClaims, VerifiedToken};
pub use single_flight::SingleFlight;
pub use verifier::JwksVerifier;

#[cfg(test)]
mod tests;
