//! Remote operation executor.
//!
//! Every call to the control plane goes through [`ServerConnection::execute`].
//! It resolves credentials, lazily creates the session client, applies the
//! proxy, runs the work under one [`RetryPolicy`] and keeps the visible
//! server state in step with the outcome.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{ClientFactory, CloudClient};
use crate::application::services::retry::{Next, RetryContext, RetryPolicy, sleep_or_cancel};
use crate::application::services::session::ServerConnection;
use crate::domain::{ApplicationUrlLookup, CloudError, Credentials, DeployError, ServerState};

impl<F: ClientFactory> ServerConnection<F> {
    /// Run `work` against the session client under `policy`.
    ///
    /// A stopped server is optimistically moved to `Starting` and reverted
    /// to `Stopped` if the call fails; success leaves it `Started`.
    ///
    /// # Errors
    ///
    /// `Auth` when no credentials can be obtained or re-login fails,
    /// `Canceled` when `cancel` fires, `Remote` for the last control-plane
    /// failure once the policy gives up.
    pub async fn execute<T, W, Fut>(
        &self,
        label: &str,
        policy: RetryPolicy,
        cancel: &CancellationToken,
        work: W,
    ) -> Result<T, DeployError>
    where
        W: FnMut(Arc<F::Client>) -> Fut + Send,
        Fut: Future<Output = Result<T, CloudError>> + Send,
        T: Send,
    {
        if cancel.is_cancelled() {
            return Err(DeployError::Canceled);
        }
        let credentials = self.ensure_credentials()?;
        let moved = self.begin_starting();

        let result = self
            .run_with_policy(label, policy, cancel, &credentials, work)
            .await;

        match &result {
            Ok(_) => self.set_server_state(ServerState::Started),
            Err(e) => {
                debug!(label, error = %e, "remote operation failed");
                if moved {
                    self.set_server_state(ServerState::Stopped);
                }
            }
        }
        result
    }

    fn ensure_credentials(&self) -> Result<Credentials, DeployError> {
        if let Some(existing) = self.credentials.lock().clone() {
            return Ok(existing);
        }
        match self.prompt().credentials(&self.url) {
            Some(creds) if creds.is_complete() => {
                *self.credentials.lock() = Some(creds.clone());
                Ok(creds)
            }
            _ => Err(DeployError::Auth(format!(
                "no credentials supplied for {}",
                self.url
            ))),
        }
    }

    /// The session client, created on first use. Proxy settings are applied
    /// on every acquisition.
    async fn client(&self, credentials: &Credentials) -> Result<Arc<F::Client>, DeployError> {
        let mut session = self.session.lock().await;
        let client = if let Some(client) = &session.client {
            Arc::clone(client)
        } else {
            debug!(url = %self.url, "creating control-plane session");
            let client = self
                .factory
                .create(&self.url, credentials)
                .map_err(|source| DeployError::Remote {
                    label: "connect".to_string(),
                    source,
                })?;
            let client = Arc::new(client);
            session.client = Some(Arc::clone(&client));
            client
        };
        let proxy = self.proxy.lock().clone();
        client.set_proxy(proxy.as_deref());
        Ok(client)
    }

    async fn run_with_policy<T, W, Fut>(
        &self,
        label: &str,
        policy: RetryPolicy,
        cancel: &CancellationToken,
        credentials: &Credentials,
        mut work: W,
    ) -> Result<T, DeployError>
    where
        W: FnMut(Arc<F::Client>) -> Fut + Send,
        Fut: Future<Output = Result<T, CloudError>> + Send,
        T: Send,
    {
        let mut client = self.client(credentials).await?;
        let mut ctx = RetryContext::new(label, policy);
        loop {
            ctx.attempts += 1;
            debug!(label, attempt = ctx.attempts, "remote call");
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DeployError::Canceled),
                r = work(Arc::clone(&client)) => r,
            };
            let err = match outcome {
                Ok(value) => {
                    self.populate_url_lookup(&client).await;
                    return Ok(value);
                }
                Err(err) => err,
            };
            match ctx.next(&err) {
                Next::Fail => {
                    return Err(DeployError::Remote {
                        label: ctx.label,
                        source: err,
                    });
                }
                Next::Relogin => {
                    info!(label, "session rejected, logging in again");
                    self.relogin(&client, cancel).await?;
                }
                Next::Wait(delay) => {
                    debug!(label, error = %err, ?delay, "transient failure, polling");
                    sleep_or_cancel(delay, cancel).await?;
                }
            }
            client = self.client(credentials).await?;
        }
    }

    /// Log in again with a bounded number of attempts.
    async fn relogin(&self, client: &F::Client, cancel: &CancellationToken) -> Result<(), DeployError> {
        let attempts = self.timeouts().login_attempts.max(1);
        let interval = self.timeouts().login_interval;
        let mut last = None;
        for attempt in 1..=attempts {
            let res = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DeployError::Canceled),
                r = client.login() => r,
            };
            match res {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "login failed");
                    last = Some(e);
                    if attempt < attempts {
                        sleep_or_cancel(interval, cancel).await?;
                    }
                }
            }
        }
        Err(match last {
            Some(e) if !e.is_auth_failure() => DeployError::Remote {
                label: "login".to_string(),
                source: e,
            },
            Some(e) => DeployError::Auth(e.to_string()),
            None => DeployError::Auth("login was not attempted".to_string()),
        })
    }

    /// Fill the URL lookup once per session. Failures are logged and retried
    /// after the next successful call.
    async fn populate_url_lookup(&self, client: &F::Client) {
        let mut session = self.session.lock().await;
        if session.url_lookup.is_some() {
            return;
        }
        match client.get_domains().await {
            Ok(domains) => {
                session.url_lookup = Some(ApplicationUrlLookup::new(
                    domains.into_iter().map(|d| d.name),
                ));
            }
            Err(e) => warn!(error = %e, "could not load application domains"),
        }
    }
}
