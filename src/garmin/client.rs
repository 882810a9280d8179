use super::parse::DailyPayloads;
use super::sso::{Endpoints, LoginStep, SsoClient};
use super::tokens::{GarminTokens, OAuth2Token, load_tokens, save_tokens};
use super::{AuthOutcome, GarminOperations};
use crate::error::{AppError, Result};
use crate::models::GarminMetrics;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

const DEFAULT_DOMAIN: &str = "garmin.com";
const API_USER_AGENT: &str = "GCM-iOS-5.7.2.1";

struct Session {
    oauth2: OAuth2Token,
    display_name: String,
}

pub struct GarminClient {
    http: Client,
    sso: SsoClient,
    api_base_url: String,
    email: String,
    password: String,
    token_path: PathBuf,
    session: Option<Session>,
}

impl GarminClient {
    /// Create a client for garmin.com. Tokens are cached at `token_path`.
    pub fn new(email: &str, password: &str, token_path: PathBuf) -> Result<Self> {
        Self::with_endpoints(
            Endpoints::for_domain(DEFAULT_DOMAIN),
            email,
            password,
            token_path,
        )
    }

    pub fn with_endpoints(
        endpoints: Endpoints,
        email: &str,
        password: &str,
        token_path: PathBuf,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_base_url: endpoints.api_base.clone(),
            sso: SsoClient::new(endpoints)?,
            email: email.to_string(),
            password: password.to_string(),
            token_path,
            session: None,
        })
    }

    /// Use cached tokens, refreshing the OAuth2 token when it has expired.
    /// `Ok(false)` means there is nothing cached.
    async fn resume_session(&mut self) -> Result<bool> {
        let Some(tokens) = load_tokens(&self.token_path)? else {
            debug!("No cached Garmin tokens found");
            return Ok(false);
        };

        let tokens = if tokens.oauth2.is_expired() {
            debug!("Garmin access token expired, refreshing...");
            let oauth2 = self.sso.refresh(&tokens.oauth1).await?;
            GarminTokens { oauth2, ..tokens }
        } else {
            debug!("Using cached Garmin tokens");
            tokens
        };

        self.start_session(tokens).await?;
        Ok(true)
    }

    async fn finish_login(&mut self, ticket: &str) -> Result<()> {
        let tokens = self.sso.exchange_ticket(ticket).await?;
        self.start_session(tokens).await
    }

    async fn start_session(&mut self, tokens: GarminTokens) -> Result<()> {
        let profile = self
            .fetch(&tokens.oauth2, "/userprofile-service/socialProfile")
            .await?
            .unwrap_or_default();
        let display_name = profile
            .get("displayName")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Garmin("Profile has no display name".to_string()))?
            .to_string();

        save_tokens(&self.token_path, &tokens)?;
        info!(user = %display_name, "Authenticated to Garmin Connect");

        self.session = Some(Session {
            oauth2: tokens.oauth2,
            display_name,
        });
        Ok(())
    }

    /// GET a Connect API path. `None` for an empty body.
    async fn fetch(&self, token: &OAuth2Token, path: &str) -> Result<Option<Value>> {
        let url = format!("{}{}", self.api_base_url, path);
        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, API_USER_AGENT)
            .header(AUTHORIZATION, token.authorization_header())
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let body = response.text().await?;
                if body.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(serde_json::from_str(&body)?))
            }
            StatusCode::UNAUTHORIZED => Err(AppError::GarminAuth(
                "Garmin rejected the session token".to_string(),
            )),
            StatusCode::TOO_MANY_REQUESTS => Err(AppError::RateLimited),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Garmin(format!("{} {} - {}", status, path, body)))
            }
        }
    }

    /// Like `fetch`, but an API error or unreadable body for this one
    /// resource means "no data".
    async fn fetch_optional(&self, token: &OAuth2Token, path: &str) -> Result<Option<Value>> {
        match self.fetch(token, path).await {
            Err(AppError::Garmin(e)) => {
                debug!("No data: {}", e);
                Ok(None)
            }
            Err(AppError::Serialization(e)) => {
                debug!("Ignoring malformed response from {}: {}", path, e);
                Ok(None)
            }
            other => other,
        }
    }
}

#[async_trait]
impl GarminOperations for GarminClient {
    #[instrument(name = "Authenticating to Garmin", skip_all)]
    async fn authenticate(&mut self) -> AuthOutcome {
        match self.resume_session().await {
            Ok(true) => return AuthOutcome::Authenticated,
            Ok(false) => {}
            Err(AppError::RateLimited) => return AuthOutcome::Failed(AppError::RateLimited),
            Err(e) => debug!("Cached Garmin session unusable ({}), signing in", e),
        }

        match self.sso.login(&self.email, &self.password).await {
            Ok(LoginStep::MfaRequired) => AuthOutcome::MfaRequired,
            Ok(LoginStep::Ticket(ticket)) => self.finish_login(&ticket).await.into(),
            Err(e) => AuthOutcome::Failed(e),
        }
    }

    #[instrument(name = "Completing Garmin MFA", skip_all)]
    async fn submit_mfa_code(&mut self, code: &str) -> AuthOutcome {
        match self.sso.submit_mfa(code).await {
            Ok(ticket) => self.finish_login(&ticket).await.into(),
            Err(e) => AuthOutcome::Failed(e),
        }
    }

    #[instrument(name = "Fetching day", skip_all, fields(%date))]
    async fn get_metrics(&self, date: NaiveDate) -> Result<GarminMetrics> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| AppError::GarminAuth("Not authenticated".to_string()))?;
        let token = &session.oauth2;
        let user = &session.display_name;
        let day = date.format("%Y-%m-%d").to_string();

        let payloads = DailyPayloads {
            summary: self
                .fetch_optional(
                    token,
                    &format!(
                        "/usersummary-service/usersummary/daily/{}?calendarDate={}",
                        user, day
                    ),
                )
                .await?,
            sleep: self
                .fetch_optional(
                    token,
                    &format!(
                        "/wellness-service/wellness/dailySleepData/{}?date={}&nonSleepBufferMinutes=60",
                        user, day
                    ),
                )
                .await?,
            hrv: self
                .fetch_optional(token, &format!("/hrv-service/hrv/{}", day))
                .await?,
            weight: self
                .fetch_optional(
                    token,
                    &format!(
                        "/weight-service/weight/dateRange?startDate={}&endDate={}",
                        day, day
                    ),
                )
                .await?,
            blood_pressure: self
                .fetch_optional(
                    token,
                    &format!(
                        "/bloodpressure-service/bloodpressure/range/{}/{}?includeAll=true",
                        day, day
                    ),
                )
                .await?,
            vo2max: self
                .fetch_optional(
                    token,
                    &format!("/metrics-service/metrics/maxmet/daily/{}/{}", day, day),
                )
                .await?,
            training_status: self
                .fetch_optional(
                    token,
                    &format!("/metrics-service/metrics/trainingstatus/aggregated/{}", day),
                )
                .await?,
            activities: self
                .fetch_optional(
                    token,
                    &format!(
                        "/activitylist-service/activities/search/activities?startDate={}&endDate={}&start=0&limit=100",
                        day, day
                    ),
                )
                .await?,
        };

        Ok(payloads.into_metrics(date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garmin::tokens::test_helpers::mock_tokens;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer, token_path: PathBuf) -> GarminClient {
        let endpoints = Endpoints {
            sso_base: format!("{}/sso", server.uri()),
            api_base: server.uri(),
            consumer_url: format!("{}/oauth_consumer.json", server.uri()),
        };
        GarminClient::with_endpoints(endpoints, "runner@example.com", "secret", token_path)
            .unwrap()
    }

    async fn mount_social_profile(server: &MockServer, access_token: &str) {
        Mock::given(method("GET"))
            .and(path("/userprofile-service/socialProfile"))
            .and(header("Authorization", format!("Bearer {}", access_token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "displayName": "runner"
            })))
            .mount(server)
            .await;
    }

    async fn mount_token_exchange(server: &MockServer, access_token: &str) {
        Mock::given(method("GET"))
            .and(path("/oauth_consumer.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "consumer_key": "ck",
                "consumer_secret": "cs"
            })))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth-service/oauth/exchange/user/2.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "access_token": access_token,
                "refresh_token": "refresh",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
    }

    async fn mount_sso_signin(server: &MockServer, title: &str) {
        Mock::given(method("GET"))
            .and(path("/sso/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/sso/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<form><input type="hidden" name="_csrf" value="csrf-123"></form>"#,
            ))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/sso/signin"))
            .and(body_string_contains("_csrf=csrf-123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<html><head><title>{}</title></head></html>", title)),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_authenticate_with_cached_tokens() {
        let server = MockServer::start().await;
        mount_social_profile(&server, "test-access-token").await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("tokens.json");
        let tokens = mock_tokens(chrono::Utc::now().timestamp() + 3600);
        save_tokens(&token_path, &tokens).unwrap();

        let mut client = test_client(&server, token_path);
        assert!(matches!(
            client.authenticate().await,
            AuthOutcome::Authenticated
        ));
    }

    #[tokio::test]
    async fn test_expired_tokens_are_refreshed() {
        let server = MockServer::start().await;
        mount_token_exchange(&server, "fresh-token").await;
        mount_social_profile(&server, "fresh-token").await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("tokens.json");
        save_tokens(&token_path, &mock_tokens(0)).unwrap();

        let mut client = test_client(&server, token_path.clone());
        assert!(matches!(
            client.authenticate().await,
            AuthOutcome::Authenticated
        ));

        let saved = load_tokens(&token_path).unwrap().unwrap();
        assert_eq!(saved.oauth2.access_token, "fresh-token");
        assert_eq!(saved.oauth1.oauth_token, "oauth1-token");
    }

    #[tokio::test]
    async fn test_sso_login_with_mfa() {
        let server = MockServer::start().await;
        mount_sso_signin(&server, "GARMIN > MFA Challenge").await;
        mount_token_exchange(&server, "mfa-token").await;
        mount_social_profile(&server, "mfa-token").await;

        Mock::given(method("POST"))
            .and(path("/sso/verifyMFA/loginEnterMfaCode"))
            .and(body_string_contains("mfa-code=123456"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><title>Success</title></head>
                <body><a href="https://sso.garmin.com/sso/embed?ticket=ST-42-abc">ok</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/oauth-service/oauth/preauthorized"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("oauth_token=t1&oauth_token_secret=s1&mfa_token=m1"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("tokens.json");
        let mut client = test_client(&server, token_path.clone());

        assert!(matches!(
            client.authenticate().await,
            AuthOutcome::MfaRequired
        ));
        assert!(matches!(
            client.submit_mfa_code("123456").await,
            AuthOutcome::Authenticated
        ));

        let saved = load_tokens(&token_path).unwrap().unwrap();
        assert_eq!(saved.oauth1.oauth_token, "t1");
        assert_eq!(saved.oauth1.mfa_token.as_deref(), Some("m1"));
        assert_eq!(saved.oauth2.access_token, "mfa-token");
    }

    #[tokio::test]
    async fn test_mfa_rate_limited() {
        let server = MockServer::start().await;
        mount_sso_signin(&server, "Enter MFA Code").await;

        Mock::given(method("POST"))
            .and(path("/sso/verifyMFA/loginEnterMfaCode"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut client = test_client(&server, dir.path().join("tokens.json"));

        assert!(matches!(
            client.authenticate().await,
            AuthOutcome::MfaRequired
        ));
        assert!(matches!(
            client.submit_mfa_code("000000").await,
            AuthOutcome::Failed(AppError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_mfa_without_pending_login_fails() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut client = test_client(&server, dir.path().join("tokens.json"));

        assert!(matches!(
            client.submit_mfa_code("123456").await,
            AuthOutcome::Failed(AppError::GarminAuth(_))
        ));
    }

    #[tokio::test]
    async fn test_get_metrics_requires_session() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, dir.path().join("tokens.json"));

        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(matches!(
            client.get_metrics(date).await,
            Err(AppError::GarminAuth(_))
        ));
    }

    #[tokio::test]
    async fn test_get_metrics_tolerates_missing_sources() {
        let server = MockServer::start().await;
        mount_social_profile(&server, "test-access-token").await;

        Mock::given(method("GET"))
            .and(path("/usersummary-service/usersummary/daily/runner"))
            .and(header("Authorization", "Bearer test-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSteps": 8421,
                "restingHeartRate": 49
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/hrv-service/hrv/2024-01-02"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/activitylist-service/activities/search/activities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "activityType": { "typeKey": "running" }, "distance": 10000.0, "duration": 3000.0 }
            ])))
            .mount(&server)
            .await;

        // Everything else is unmatched and answers 404

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("tokens.json");
        save_tokens(&token_path, &mock_tokens(chrono::Utc::now().timestamp() + 3600)).unwrap();

        let mut client = test_client(&server, token_path);
        assert!(matches!(
            client.authenticate().await,
            AuthOutcome::Authenticated
        ));

        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let metrics = client.get_metrics(date).await.unwrap();

        assert_eq!(metrics.date, date);
        assert_eq!(metrics.steps, Some(8421));
        assert_eq!(metrics.resting_heart_rate, Some(49));
        assert_eq!(metrics.running_activity_count, Some(1));
        assert_eq!(metrics.running_distance, Some(10.0));
        assert_eq!(metrics.overnight_hrv, None);
        assert_eq!(metrics.sleep_score, None);
        assert_eq!(metrics.weight, None);
    }

    #[tokio::test]
    async fn test_get_metrics_skips_forbidden_and_malformed_sources() {
        let server = MockServer::start().await;
        mount_social_profile(&server, "test-access-token").await;

        Mock::given(method("GET"))
            .and(path("/usersummary-service/usersummary/daily/runner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSteps": 8421
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(
                "/bloodpressure-service/bloodpressure/range/2024-01-02/2024-01-02",
            ))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/hrv-service/hrv/2024-01-02"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("tokens.json");
        save_tokens(&token_path, &mock_tokens(chrono::Utc::now().timestamp() + 3600)).unwrap();

        let mut client = test_client(&server, token_path);
        assert!(matches!(
            client.authenticate().await,
            AuthOutcome::Authenticated
        ));

        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let metrics = client.get_metrics(date).await.unwrap();

        assert_eq!(metrics.steps, Some(8421));
        assert_eq!(metrics.blood_pressure_systolic, None);
        assert_eq!(metrics.blood_pressure_diastolic, None);
        assert_eq!(metrics.overnight_hrv, None);
    }

    #[tokio::test]
    async fn test_get_metrics_propagates_rejected_session() {
        let server = MockServer::start().await;
        mount_social_profile(&server, "test-access-token").await;

        Mock::given(method("GET"))
            .and(path("/usersummary-service/usersummary/daily/runner"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("tokens.json");
        save_tokens(&token_path, &mock_tokens(chrono::Utc::now().timestamp() + 3600)).unwrap();

        let mut client = test_client(&server, token_path);
        assert!(matches!(
            client.authenticate().await,
            AuthOutcome::Authenticated
        ));

        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(matches!(
            client.get_metrics(date).await,
            Err(AppError::GarminAuth(_))
        ));
    }
}
