use anyhow::Result;
use clap::Args;
use colored::Colorize;
use drm_cenc::{SystemId, extract_content_metadata, extract_key_id, pssh::playready};

#[derive(Args, Clone, Debug)]
/// Print the protection systems and key ids of init data.
pub struct Inspect {
    /// Init segment file path or base64 encoded PSSH box.
    #[arg(required = true, value_name = "PATH|BASE64")]
    input: String,
}

impl Inspect {
    pub fn execute(self) -> Result<()> {
        for pssh in super::read_pssh(&self.input)? {
            println!(
                "{} {} (v{}, {} bytes)",
                "PSSH".bold().green(),
                pssh.system_id,
                pssh.version,
                pssh.raw.len()
            );
            println!("  system id: {}", pssh.system_id.uuid());

            for kid in &pssh.key_ids {
                println!("  kid: {}", hex::encode(kid));
            }

            let (key_id, metadata) = if pssh.system_id == SystemId::PlayReady {
                for header in playready::parse(&pssh.data)? {
                    println!("  wrm header: v{}", header.version);

                    if let Some(la_url) = &header.la_url {
                        println!("  la url: {la_url}");
                    }
                }

                (
                    extract_key_id(pssh.system_id, &pssh.data),
                    extract_content_metadata(pssh.system_id, &pssh.data),
                )
            } else {
                (extract_key_id(pssh.system_id, &pssh.raw), vec![])
            };

            match key_id {
                Ok(key) => println!("  session key: {key}"),
                Err(e) => println!("  session key: {}", e.to_string().yellow()),
            }

            if !metadata.is_empty() {
                println!("  content metadata: {} bytes", metadata.len());
            }
        }

        Ok(())
    }
}
