use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::crypto::PasswordHasher;

pub async fn cmd_hash_password(config: &Config, password: Option<String>) -> anyhow::Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            let mut line = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .context("Failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }

    let hasher = PasswordHasher::new(&config.security)?;
    println!("{}", hasher.hash(&password).await?);
    Ok(())
}
