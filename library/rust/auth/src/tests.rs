//! テスト: JWKS 検証 + 鍵ローテーション + ディスカバリ + トークン交換

use crate::code_exchange::{CodeExchangeClient, CodeExchangeRequest};
use crate::discovery::discover;
use crate::error::AuthError;
use crate::jwks::{DefaultJwksFetcher, JwksFetcher, JwksKeyStore};
use crate::verifier::JwksVerifier;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_ISSUER: &str = "https://auth.example.com/realms/profile";
const TEST_AUDIENCE: &str = "profile-api";
const KID_A: &str = "key-a";
const KID_B: &str = "key-b";

/// RSA 鍵生成は重いのでテスト全体で 2 本だけ生成して使い回す。
fn key_a() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
}

fn key_b() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
}

fn jwk_json(private_key: &RsaPrivateKey, kid: &str) -> Value {
    let public_key = private_key.to_public_key();
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}

fn jwk_set(keys: &[(&RsaPrivateKey, &str)]) -> JwkSet {
    let keys: Vec<Value> = keys.iter().map(|(k, kid)| jwk_json(k, kid)).collect();
    serde_json::from_value(json!({ "keys": keys })).unwrap()
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn default_claims() -> Value {
    let now = now_secs();
    json!({
        "sub": "user-uuid-1234",
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "exp": now + 900,
        "iat": now,
        "email": "taro.yamada@example.com",
        "name": "Taro Yamada",
        "realm_access": { "roles": ["user", "admin"] },
        "groups": ["ops", "user"],
    })
}

fn sign(private_key: &RsaPrivateKey, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);

    let pem = private_key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .unwrap();
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();

    encode(&header, claims, &key).unwrap()
}

/// 取得回数を数え、返す鍵セットを差し替えられるフェッチャー。
struct CountingFetcher {
    keys: Mutex<JwkSet>,
    calls: AtomicUsize,
    delay: Duration,
    fail: AtomicBool,
}

impl CountingFetcher {
    fn new(keys: JwkSet) -> Arc<Self> {
        Self::with_delay(keys, Duration::ZERO)
    }

    fn with_delay(keys: JwkSet, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            keys: Mutex::new(keys),
            calls: AtomicUsize::new(0),
            delay,
            fail: AtomicBool::new(false),
        })
    }

    fn rotate(&self, keys: JwkSet) {
        *self.keys.lock().unwrap() = keys;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl JwksFetcher for CountingFetcher {
    async fn fetch_keys(&self, _jwks_uri: &str) -> Result<JwkSet, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::JwksFetchFailed("connection refused".into()));
        }
        Ok(self.keys.lock().unwrap().clone())
    }
}

fn verifier_with(fetcher: Arc<CountingFetcher>, ttl: Duration) -> JwksVerifier {
    let store = JwksKeyStore::with_fetcher("https://unused/certs", ttl, fetcher)
        .with_min_refresh_interval(Duration::ZERO);
    JwksVerifier::new(Arc::new(store), TEST_ISSUER, Some(TEST_AUDIENCE))
}

// --- 検証 ---

#[tokio::test]
async fn test_verify_token_success() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let token = sign(key_a(), Some(KID_A), &default_claims());
    let verified = verifier.verify(&token).await.unwrap();

    assert_eq!(verified.principal.subject, "user-uuid-1234");
    assert_eq!(
        verified.principal.email.as_deref(),
        Some("taro.yamada@example.com")
    );
    assert_eq!(
        verified.principal.display_name.as_deref(),
        Some("Taro Yamada")
    );
    let roles: Vec<_> = verified.principal.roles.iter().cloned().collect();
    assert_eq!(roles, vec!["admin", "ops", "user"]);
    assert_eq!(verified.raw_claims["iss"], TEST_ISSUER);
}

#[tokio::test]
async fn test_verify_token_expired() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let mut claims = default_claims();
    claims["exp"] = json!(now_secs() - 3600);
    let token = sign(key_a(), Some(KID_A), &claims);

    let err = verifier.verify(&token).await.unwrap_err();
    assert_eq!(err, AuthError::TokenExpired);
}

#[tokio::test]
async fn test_verify_token_wrong_issuer() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let mut claims = default_claims();
    claims["iss"] = json!("https://evil.example.com");
    let token = sign(key_a(), Some(KID_A), &claims);

    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn test_verify_token_wrong_audience() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let mut claims = default_claims();
    claims["aud"] = json!("some-other-api");
    let token = sign(key_a(), Some(KID_A), &claims);

    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn test_verify_token_without_audience_check() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let store = JwksKeyStore::with_fetcher("https://unused/certs", Duration::from_secs(600), fetcher);
    let verifier = JwksVerifier::new(Arc::new(store), TEST_ISSUER, None);

    let mut claims = default_claims();
    claims["aud"] = json!("some-other-api");
    let token = sign(key_a(), Some(KID_A), &claims);

    assert!(verifier.verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_verify_token_signed_by_unknown_key_fails() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    // kid は既知だが別の鍵で署名されている
    let token = sign(key_b(), Some(KID_A), &default_claims());

    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn test_verify_token_invalid_token() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher.clone(), Duration::from_secs(600));

    let err = verifier.verify("not-a-jwt").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
    // ヘッダが読めない時点で鍵取得はしない
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_verify_rejects_hmac_tokens() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KID_A.into());
    let token = encode(
        &header,
        &default_claims(),
        &EncodingKey::from_secret(b"shared-secret"),
    )
    .unwrap();

    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(msg) if msg.contains("unsupported algorithm")));
}

#[tokio::test]
async fn test_verify_token_missing_subject() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let mut claims = default_claims();
    claims.as_object_mut().unwrap().remove("sub");
    let token = sign(key_a(), Some(KID_A), &claims);

    let err = verifier.verify(&token).await.unwrap_err();
    assert_eq!(err, AuthError::MissingSubject);
}

#[tokio::test]
async fn test_verify_token_without_kid_uses_single_key() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let token = sign(key_a(), None, &default_claims());
    assert!(verifier.verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_verify_token_without_kid_is_ambiguous_with_multiple_keys() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A), (key_b(), KID_B)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let token = sign(key_a(), None, &default_claims());
    let err = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn test_id_token_verified_against_explicit_audience() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let mut claims = default_claims();
    claims["aud"] = json!("profile-web");
    let token = sign(key_a(), Some(KID_A), &claims);

    assert!(verifier.verify(&token).await.is_err());
    assert!(verifier
        .verify_with_audience(&token, Some("profile-web"))
        .await
        .is_ok());
}

// --- 鍵キャッシュ / ローテーション ---

#[tokio::test]
async fn test_keys_are_cached_within_ttl() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher.clone(), Duration::from_secs(600));

    let token = sign(key_a(), Some(KID_A), &default_claims());
    for _ in 0..3 {
        verifier.verify(&token).await.unwrap();
    }

    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_unknown_kid_forces_refresh() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let verifier = verifier_with(fetcher.clone(), Duration::from_secs(600));

    let token_a = sign(key_a(), Some(KID_A), &default_claims());
    verifier.verify(&token_a).await.unwrap();

    // IdP が鍵をローテーションした
    fetcher.rotate(jwk_set(&[(key_b(), KID_B)]));
    let token_b = sign(key_b(), Some(KID_B), &default_claims());

    let verified = verifier.verify(&token_b).await.unwrap();
    assert_eq!(verified.principal.subject, "user-uuid-1234");
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_unknown_kid_refresh_is_rate_limited() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    let store = JwksKeyStore::with_fetcher(
        "https://unused/certs",
        Duration::from_secs(600),
        fetcher.clone(),
    )
    .with_min_refresh_interval(Duration::from_secs(60));
    let verifier = JwksVerifier::new(Arc::new(store), TEST_ISSUER, Some(TEST_AUDIENCE));

    verifier
        .verify(&sign(key_a(), Some(KID_A), &default_claims()))
        .await
        .unwrap();

    let token = sign(key_b(), Some("never-published"), &default_claims());
    for _ in 0..3 {
        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(msg) if msg.contains("unknown kid")));
    }

    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_cache_misses_trigger_single_fetch() {
    let fetcher =
        CountingFetcher::with_delay(jwk_set(&[(key_a(), KID_A)]), Duration::from_millis(100));
    let verifier = Arc::new(verifier_with(fetcher.clone(), Duration::from_secs(600)));
    let token = sign(key_a(), Some(KID_A), &default_claims());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let verifier = verifier.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move { verifier.verify(&token).await }));
    }

    for h in handles {
        assert!(h.await.unwrap().is_ok());
    }
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_stale_keys_are_used_when_refresh_fails() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    // TTL 0 なので毎回再取得を試みる
    let verifier = verifier_with(fetcher.clone(), Duration::ZERO);
    let token = sign(key_a(), Some(KID_A), &default_claims());

    verifier.verify(&token).await.unwrap();
    fetcher.fail.store(true, Ordering::SeqCst);

    assert!(verifier.verify(&token).await.is_ok());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_fetch_failure_without_cache_is_infrastructure_error() {
    let fetcher = CountingFetcher::new(jwk_set(&[(key_a(), KID_A)]));
    fetcher.fail.store(true, Ordering::SeqCst);
    let verifier = verifier_with(fetcher, Duration::from_secs(600));

    let err = verifier
        .verify(&sign(key_a(), Some(KID_A), &default_claims()))
        .await
        .unwrap_err();
    assert!(err.is_infrastructure());
}

// --- HTTP 経由（wiremock） ---

#[tokio::test]
async fn test_default_fetcher_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "keys": [jwk_json(key_a(), KID_A)] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = JwksKeyStore::new(
        &format!("{}/certs", server.uri()),
        Duration::from_secs(600),
        Duration::from_secs(2),
    );
    let verifier = JwksVerifier::new(Arc::new(store), TEST_ISSUER, Some(TEST_AUDIENCE));

    let verified = verifier
        .verify(&sign(key_a(), Some(KID_A), &default_claims()))
        .await
        .unwrap();
    assert_eq!(verified.principal.subject, "user-uuid-1234");
}

#[tokio::test]
async fn test_default_fetcher_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "keys": [] }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let fetcher = DefaultJwksFetcher::new(Duration::from_millis(50));
    let err = fetcher
        .fetch_keys(&format!("{}/certs", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::Timeout(50));
}

#[tokio::test]
async fn test_discover_provider_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/realms/profile/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": format!("{}/realms/profile", server.uri()),
            "jwks_uri": format!("{}/realms/profile/certs", server.uri()),
            "authorization_endpoint": format!("{}/realms/profile/auth", server.uri()),
            "token_endpoint": format!("{}/realms/profile/token", server.uri()),
        })))
        .mount(&server)
        .await;

    let issuer = format!("{}/realms/profile", server.uri());
    let meta = discover(&reqwest::Client::new(), &issuer).await.unwrap();

    assert_eq!(meta.issuer, issuer);
    assert_eq!(meta.jwks_uri, format!("{}/certs", issuer));
    assert_eq!(meta.token_endpoint, Some(format!("{}/token", issuer)));
    assert_eq!(meta.end_session_endpoint, None);
}

#[tokio::test]
async fn test_discover_missing_jwks_uri_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
        })))
        .mount(&server)
        .await;

    let err = discover(&reqwest::Client::new(), &server.uri())
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::DiscoveryFailed("missing jwks_uri".into()));
}

#[tokio::test]
async fn test_code_exchange_sends_pkce_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains("code_verifier=verifier-xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at",
            "token_type": "Bearer",
            "id_token": "header.payload.sig",
            "expires_in": 300,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CodeExchangeClient::new(reqwest::Client::new(), Duration::from_secs(2));
    let resp = client
        .exchange(&CodeExchangeRequest {
            token_endpoint: format!("{}/token", server.uri()),
            code: "auth-code-1".into(),
            code_verifier: "verifier-xyz".into(),
            redirect_uri: "http://localhost:3000/auth/callback".into(),
            client_id: "profile-web".into(),
            client_secret: None,
        })
        .await
        .unwrap();

    assert_eq!(resp.access_token, "at");
    assert_eq!(resp.id_token.as_deref(), Some("header.payload.sig"));
    assert_eq!(resp.expires_in, Some(300));
}

#[tokio::test]
async fn test_code_exchange_error_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Code not valid",
        })))
        .mount(&server)
        .await;

    let client = CodeExchangeClient::new(reqwest::Client::new(), Duration::from_secs(2));
    let err = client
        .exchange(&CodeExchangeRequest {
            token_endpoint: format!("{}/token", server.uri()),
            code: "used-code".into(),
            code_verifier: "v".into(),
            redirect_uri: "http://localhost:3000/auth/callback".into(),
            client_id: "profile-web".into(),
            client_secret: Some("s3cret".into()),
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthError::TokenEndpoint("invalid_grant: Code not valid".into())
    );
}
