use anyhow::{Result, anyhow};
use dotenvy::dotenv;
use keyring::Entry;
use serde::Deserialize;
use std::fs;

pub const KEYRING_SERVICE: &str = "sliceput-token";
pub const KEYRING_USER: &str = "sliceput";

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    slice_size: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    sliceput_slice_size: Option<u64>,
    sliceput_token: Option<String>,
}

pub struct Config {
    pub slice_size: Option<u64>,
    pub bearer_token: Option<String>,
}

fn merge_config(base: ConfigFile, override_config: ConfigEnv) -> Config {
    let slice_size = override_config.sliceput_slice_size.or(base.slice_size);

    // Session URLs are usually pre-authenticated, so a missing token is fine.
    let bearer_token = override_config.sliceput_token.or_else(|| {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()?;
        let secret = entry.get_secret().ok()?;
        String::from_utf8(secret).ok()
    });

    Config {
        slice_size,
        bearer_token,
    }
}

pub fn read_config() -> Result<Config> {
    let _ = dotenv();
    let env_config = envy::from_env::<ConfigEnv>().unwrap_or_default();

    let project_dirs = directories::ProjectDirs::from("dev", "sliceput", "sliceput")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    let config_file = project_dirs.config_dir().join("config.toml");
    let file_config = if let Ok(config) = fs::read_to_string(config_file) {
        toml::from_str(&config)?
    } else {
        ConfigFile::default()
    };

    Ok(merge_config(file_config, env_config))
}

pub fn set_token_keyring(token: String) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_secret(token.as_bytes())?;
    println!("Bearer token stored for use with sliceput");
    Ok(())
}
