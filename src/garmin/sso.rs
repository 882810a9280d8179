//! Garmin Connect SSO login: the embedded widget form flow, optional MFA,
//! then the OAuth1 ticket exchange and OAuth1 -> OAuth2 exchange.

use super::oauth1::{OAuth1Signer, OAuthConsumer, parse_oauth_response};
use super::tokens::{GarminTokens, OAuth1Token, OAuth2Token};
use crate::error::{AppError, Result};
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use std::sync::LazyLock;
use tracing::{debug, instrument};

const SSO_USER_AGENT: &str = "GCM-iOS-5.7.2.1";
const OAUTH_USER_AGENT: &str = "com.garmin.android.apps.connectmobile";

static CSRF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="_csrf"\s+value="([^"]+)""#).expect("valid regex"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>([^<]+)</title>").expect("valid regex"));
static TICKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"embed\?ticket=([^"]+)""#).expect("valid regex"));

/// Base URLs of the services involved in logging in.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub sso_base: String,
    pub api_base: String,
    pub consumer_url: String,
}

impl Endpoints {
    pub fn for_domain(domain: &str) -> Self {
        Self {
            sso_base: format!("https://sso.{}/sso", domain),
            api_base: format!("https://connectapi.{}", domain),
            consumer_url: "https://thegarth.s3.amazonaws.com/oauth_consumer.json".to_string(),
        }
    }

    fn sso_embed(&self) -> String {
        format!("{}/embed", self.sso_base)
    }
}

pub(super) enum LoginStep {
    Ticket(String),
    MfaRequired,
}

pub(super) struct SsoClient {
    client: Client,
    endpoints: Endpoints,
    last_url: Option<String>,
    csrf_token: Option<String>,
}

impl SsoClient {
    pub fn new(endpoints: Endpoints) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoints,
            last_url: None,
            csrf_token: None,
        })
    }

    fn signin_params(&self) -> Vec<(&'static str, String)> {
        let embed = self.endpoints.sso_embed();
        vec![
            ("id", "gauth-widget".to_string()),
            ("embedWidget", "true".to_string()),
            ("gauthHost", embed.clone()),
            ("service", embed.clone()),
            ("source", embed.clone()),
            ("redirectAfterAccountLoginUrl", embed.clone()),
            ("redirectAfterAccountCreationUrl", embed),
        ]
    }

    /// Submit credentials. On `MfaRequired` the session keeps the CSRF token
    /// and cookies needed by [`SsoClient::submit_mfa`].
    #[instrument(name = "Signing in to Garmin SSO", skip_all)]
    pub async fn login(&mut self, email: &str, password: &str) -> Result<LoginStep> {
        let sso_embed = self.endpoints.sso_embed();
        let embed_params = [
            ("id", "gauth-widget"),
            ("embedWidget", "true"),
            ("gauthHost", self.endpoints.sso_base.as_str()),
        ];
        let response = self
            .client
            .get(&sso_embed)
            .query(&embed_params)
            .header(USER_AGENT, SSO_USER_AGENT)
            .send()
            .await?;
        check_status(&response)?;
        let _ = response.text().await?;

        let signin_url = format!("{}/signin", self.endpoints.sso_base);
        let response = self
            .client
            .get(&signin_url)
            .query(&self.signin_params())
            .header(USER_AGENT, SSO_USER_AGENT)
            .send()
            .await?;
        check_status(&response)?;
        self.last_url = Some(response.url().to_string());
        let csrf_token = extract(&CSRF_RE, &response.text().await?, "CSRF token")?;

        let form = [
            ("username", email),
            ("password", password),
            ("embed", "true"),
            ("_csrf", csrf_token.as_str()),
        ];
        let response = self
            .client
            .post(&signin_url)
            .query(&self.signin_params())
            .header(USER_AGENT, SSO_USER_AGENT)
            .header(REFERER, self.last_url.clone().unwrap_or_default())
            .form(&form)
            .send()
            .await?;
        check_status(&response)?;
        self.last_url = Some(response.url().to_string());
        let html = response.text().await?;

        let title = extract(&TITLE_RE, &html, "page title")?;
        if title.contains("MFA") {
            debug!("SSO login requires MFA");
            self.csrf_token = Some(csrf_token);
            Ok(LoginStep::MfaRequired)
        } else if title == "Success" {
            Ok(LoginStep::Ticket(extract(&TICKET_RE, &html, "ticket")?))
        } else {
            Err(AppError::GarminAuth(format!(
                "Unexpected login response: {}",
                title
            )))
        }
    }

    #[instrument(name = "Submitting Garmin MFA code", skip_all)]
    pub async fn submit_mfa(&mut self, code: &str) -> Result<String> {
        let csrf_token = self
            .csrf_token
            .take()
            .ok_or_else(|| AppError::GarminAuth("No MFA challenge is pending".to_string()))?;

        let mfa_url = format!("{}/verifyMFA/loginEnterMfaCode", self.endpoints.sso_base);
        let form = [
            ("mfa-code", code.trim()),
            ("embed", "true"),
            ("_csrf", csrf_token.as_str()),
            ("fromPage", "setupEnterMfaCode"),
        ];
        let response = self
            .client
            .post(&mfa_url)
            .query(&self.signin_params())
            .header(USER_AGENT, SSO_USER_AGENT)
            .header(REFERER, self.last_url.clone().unwrap_or_default())
            .form(&form)
            .send()
            .await?;
        check_status(&response)?;
        let html = response.text().await?;

        let title = extract(&TITLE_RE, &html, "page title")?;
        if title == "Success" {
            extract(&TICKET_RE, &html, "ticket")
        } else if is_rate_limit_page(&title, &html) {
            Err(AppError::RateLimited)
        } else {
            Err(AppError::GarminAuth(format!(
                "MFA verification failed: {}",
                title
            )))
        }
    }

    /// Trade an SSO ticket for OAuth1 and OAuth2 tokens.
    #[instrument(name = "Exchanging Garmin SSO ticket", skip_all)]
    pub async fn exchange_ticket(&self, ticket: &str) -> Result<GarminTokens> {
        let consumer = self.fetch_consumer().await?;

        let login_url = self.endpoints.sso_embed();
        let url = format!(
            "{}/oauth-service/oauth/preauthorized?ticket={}&login-url={}&accepts-mfa-tokens=true",
            self.endpoints.api_base, ticket, login_url
        );
        let auth_header = OAuth1Signer::new(&consumer).sign("GET", &url, &[])?;

        // OAuth requests go out without the SSO cookie jar
        let response = oauth_client()?
            .get(&url)
            .header(USER_AGENT, OAUTH_USER_AGENT)
            .header("Authorization", auth_header)
            .send()
            .await?;
        check_status(&response)?;
        if !response.status().is_success() {
            return Err(AppError::GarminAuth(format!(
                "Failed to get OAuth1 token: {}",
                response.status()
            )));
        }

        let params = parse_oauth_response(&response.text().await?);
        let oauth1 = OAuth1Token {
            oauth_token: params
                .get("oauth_token")
                .cloned()
                .ok_or_else(|| AppError::GarminAuth("Missing oauth_token".to_string()))?,
            oauth_token_secret: params
                .get("oauth_token_secret")
                .cloned()
                .ok_or_else(|| AppError::GarminAuth("Missing oauth_token_secret".to_string()))?,
            mfa_token: params.get("mfa_token").cloned(),
        };

        let oauth2 = self.exchange_with(&consumer, &oauth1).await?;
        Ok(GarminTokens { oauth1, oauth2 })
    }

    /// Mint a fresh OAuth2 token from a still-valid OAuth1 token.
    #[instrument(name = "Refreshing Garmin OAuth2 token", skip_all)]
    pub async fn refresh(&self, oauth1: &OAuth1Token) -> Result<OAuth2Token> {
        let consumer = self.fetch_consumer().await?;
        self.exchange_with(&consumer, oauth1).await
    }

    async fn exchange_with(
        &self,
        consumer: &OAuthConsumer,
        oauth1: &OAuth1Token,
    ) -> Result<OAuth2Token> {
        let url = format!(
            "{}/oauth-service/oauth/exchange/user/2.0",
            self.endpoints.api_base
        );

        let form: Vec<(&str, &str)> = oauth1
            .mfa_token
            .as_deref()
            .map(|mfa| vec![("mfa_token", mfa)])
            .unwrap_or_default();

        let auth_header = OAuth1Signer::new(consumer)
            .with_token(&oauth1.oauth_token, &oauth1.oauth_token_secret)
            .sign("POST", &url, &form)?;

        let response = oauth_client()?
            .post(&url)
            .header(USER_AGENT, OAUTH_USER_AGENT)
            .header("Authorization", auth_header)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&form)
            .send()
            .await?;
        check_status(&response)?;
        if !response.status().is_success() {
            return Err(AppError::GarminAuth(format!(
                "Failed to exchange OAuth1 for OAuth2: {}",
                response.status()
            )));
        }

        let token: OAuth2Token = response.json().await?;
        Ok(token.stamp_expiry())
    }

    async fn fetch_consumer(&self) -> Result<OAuthConsumer> {
        let response = self.client.get(&self.endpoints.consumer_url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::GarminAuth(format!(
                "Failed to fetch OAuth consumer: {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

fn oauth_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

fn check_status(response: &Response) -> Result<()> {
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::RateLimited);
    }
    Ok(())
}

fn is_rate_limit_page(title: &str, html: &str) -> bool {
    let text = format!("{} {}", title, html).to_lowercase();
    text.contains("rate limit") || text.contains("too many")
}

fn extract(re: &Regex, html: &str, what: &str) -> Result<String> {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AppError::GarminAuth(format!("Could not find {} in SSO response", what)))
}
