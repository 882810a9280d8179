use crate::error::{AppError, Result};
use crate::garmin::{AuthOutcome, GarminOperations};
use crate::models::GarminMetrics;
use chrono::NaiveDate;
use indicatif::ProgressStyle;
use tracing::{Span, info, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

pub struct SyncEngine<G> {
    garmin_client: G,
}

impl<G> SyncEngine<G>
where
    G: GarminOperations + Send + Sync,
{
    pub fn new(garmin_client: G) -> Self {
        Self { garmin_client }
    }

    /// Log in to Garmin, asking `prompt_mfa` for a code if the login needs one.
    /// The code gets a single attempt.
    pub async fn authenticate<F>(&mut self, prompt_mfa: F) -> Result<()>
    where
        F: FnOnce() -> Result<String>,
    {
        match self.garmin_client.authenticate().await {
            AuthOutcome::Authenticated => Ok(()),
            AuthOutcome::Failed(e) => Err(e),
            AuthOutcome::MfaRequired => {
                info!("Garmin requires a multi-factor code");
                let code = prompt_mfa()?;
                match self.garmin_client.submit_mfa_code(&code).await {
                    AuthOutcome::Authenticated => Ok(()),
                    AuthOutcome::MfaRequired => Err(AppError::GarminAuth(
                        "MFA code was not accepted".to_string(),
                    )),
                    AuthOutcome::Failed(e) => Err(e),
                }
            }
        }
    }

    /// One record per date from `start` to `end` inclusive, fetched in order.
    /// Any failure abandons the whole range.
    #[instrument(name = "Fetching metrics", skip_all, fields(%start, %end))]
    pub async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<GarminMetrics>> {
        validate_range(start, end)?;
        let dates: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();

        let span = Span::current();
        span.pb_set_style(
            &ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
            )
            .map_err(|e| AppError::Other(e.into()))?,
        );
        span.pb_set_message("Fetching days");
        span.pb_set_length(dates.len() as u64);

        let mut records = Vec::with_capacity(dates.len());
        for date in dates {
            records.push(self.garmin_client.get_metrics(date).await?);
            span.pb_inc(1);
        }

        info!(days = records.len(), "Fetched metrics");
        Ok(records)
    }
}

pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        return Err(AppError::Config(format!(
            "End date {} is before start date {}",
            end, start
        )));
    }
    Ok(())
}

#[cfg(test)]
mod mocks {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub(crate) struct MockGarminClient {
        pub login: VecDeque<AuthOutcome>,
        pub mfa: VecDeque<AuthOutcome>,
        pub submitted_codes: Arc<Mutex<Vec<String>>>,
        pub fetched: Arc<Mutex<Vec<NaiveDate>>>,
        pub fail_on: Option<NaiveDate>,
    }

    impl MockGarminClient {
        pub fn logging_in_with(login: AuthOutcome) -> Self {
            Self {
                login: VecDeque::from([login]),
                ..Default::default()
            }
        }

        pub fn with_mfa(mut self, outcome: AuthOutcome) -> Self {
            self.mfa = VecDeque::from([outcome]);
            self
        }
    }

    #[async_trait]
    impl GarminOperations for MockGarminClient {
        async fn authenticate(&mut self) -> AuthOutcome {
            self.login.pop_front().unwrap_or(AuthOutcome::Authenticated)
        }

        async fn submit_mfa_code(&mut self, code: &str) -> AuthOutcome {
            self.submitted_codes.lock().unwrap().push(code.to_string());
            self.mfa.pop_front().unwrap_or(AuthOutcome::Authenticated)
        }

        async fn get_metrics(&self, date: NaiveDate) -> Result<GarminMetrics> {
            self.fetched.lock().unwrap().push(date);
            if self.fail_on == Some(date) {
                return Err(AppError::RateLimited);
            }
            Ok(GarminMetrics::new(date))
        }
    }
}
