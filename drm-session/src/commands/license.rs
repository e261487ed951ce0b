use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use drm_cenc::{SystemId, extract_key_id};
use drm_session::{DrmConfig, DrmContext, DrmSessionManager};
use log::info;

#[derive(Args, Clone, Debug)]
/// Negotiate clear key licenses through the built-in CDM.
pub struct License {
    /// Init segment file path or base64 encoded PSSH box.
    #[arg(required = true, value_name = "PATH|BASE64")]
    input: String,

    /// Clear key license server URL.
    #[arg(long, value_name = "URL")]
    url: String,

    /// Extra headers for license request in same format as curl.
    ///
    /// This option can be used multiple times.
    #[arg(short = 'H', long = "header", value_name = "KEY:VALUE", value_parser = Self::parse_header)]
    headers: Vec<(String, String)>,

    /// Bearer token attached to the license request.
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// License request timeout in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 10_000)]
    timeout: u64,
}

impl License {
    fn parse_header(value: &str) -> Result<(String, String)> {
        if let Some((k, v)) = value.split_once(':') {
            Ok((k.trim().to_owned(), v.trim().to_owned()))
        } else {
            bail!("Expected 'KEY:VALUE' but found '{}'.", value);
        }
    }

    pub fn execute(self) -> Result<()> {
        let boxes: Vec<_> = super::read_pssh(&self.input)?
            .into_iter()
            .filter(|x| SystemId::ClearKey.accepts(x.system_id))
            .collect();

        if boxes.is_empty() {
            bail!("No clear key pssh box found, only clear key licenses are supported.");
        }

        let config = DrmConfig {
            clearkey_license_url: Some(self.url),
            license_server_override: true,
            license_headers: self.headers.into_iter().collect(),
            license_timeout_ms: self.timeout,
            ..Default::default()
        };
        let manager = DrmSessionManager::new(DrmContext::builder(config).build()?);

        if let Some(token) = &self.token {
            manager.set_access_token(token);
        }

        for pssh in boxes {
            let key = extract_key_id(SystemId::ClearKey, &pssh.raw)?;
            info!("requesting license for key {}", key.to_hex());

            match manager.create_session(&pssh.system_id.uuid(), &pssh.raw, "cli") {
                Ok(session) => println!(
                    "[{}] {} {:?}",
                    "KEY".green(),
                    key.to_hex(),
                    session.state()
                ),
                Err(e) => println!(
                    "[{}] {} {} ({})",
                    "KEY".red(),
                    key.to_hex(),
                    e,
                    e.code()
                ),
            }
        }

        Ok(())
    }
}
