use crate::{
    DrmConfig, DrmError,
    cdm::CdmSystem,
    fatal::{FatalExit, FatalRecovery, HelperProcessRecovery},
    license::{HttpLicenseClient, LicenseClient},
    output::{OutputProtection, StaticOutputProtection},
    token::{AccessToken, HttpTokenSource, TokenSource},
};
use std::sync::Arc;

/// Everything one player instance shares between its DRM sessions.
pub struct DrmContext {
    pub config: Arc<DrmConfig>,
    pub token: AccessToken,
    pub cdm: Option<Arc<dyn CdmSystem>>,
    pub license_client: Arc<dyn LicenseClient>,
    pub output: Arc<dyn OutputProtection>,
    pub fatal: Arc<FatalExit>,
}

impl DrmContext {
    pub fn builder(config: DrmConfig) -> DrmContextBuilder {
        DrmContextBuilder {
            config,
            cdm: None,
            license_client: None,
            output: None,
            fatal_recovery: None,
            token_source: None,
        }
    }
}

/// Collaborators that are not set fall back to the stock ones: blocking
/// HTTP license client, output protection reporting HDCP 2.2, helper
/// process recovery and an HTTP token source when `token_url` is set.
pub struct DrmContextBuilder {
    config: DrmConfig,
    cdm: Option<Arc<dyn CdmSystem>>,
    license_client: Option<Arc<dyn LicenseClient>>,
    output: Option<Arc<dyn OutputProtection>>,
    fatal_recovery: Option<Arc<dyn FatalRecovery>>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl DrmContextBuilder {
    pub fn cdm(mut self, cdm: Arc<dyn CdmSystem>) -> Self {
        self.cdm = Some(cdm);
        self
    }

    pub fn license_client(mut self, client: Arc<dyn LicenseClient>) -> Self {
        self.license_client = Some(client);
        self
    }

    pub fn output_protection(mut self, output: Arc<dyn OutputProtection>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn fatal_recovery(mut self, recovery: Arc<dyn FatalRecovery>) -> Self {
        self.fatal_recovery = Some(recovery);
        self
    }

    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    pub fn build(self) -> Result<DrmContext, DrmError> {
        let config = self.config.validated()?;

        let license_client = match self.license_client {
            Some(x) => x,
            None => Arc::new(HttpLicenseClient::new()?),
        };

        let token_source = match (self.token_source, &config.token_url) {
            (Some(x), _) => Some(x),
            (None, Some(url)) => Some(
                Arc::new(HttpTokenSource::new(url.as_str(), config.license_timeout())?)
                    as Arc<dyn TokenSource>,
            ),
            (None, None) => None,
        };

        let recovery = self.fatal_recovery.unwrap_or_else(|| {
            Arc::new(HelperProcessRecovery::new(config.cdm_helper_processes.clone()))
        });

        Ok(DrmContext {
            token: AccessToken::new(token_source),
            cdm: self.cdm,
            license_client,
            output: self
                .output
                .unwrap_or_else(|| Arc::new(StaticOutputProtection::new(true))),
            fatal: Arc::new(FatalExit::new(recovery, config.fatal_flush_delay())),
            config: Arc::new(config),
        })
    }
}
