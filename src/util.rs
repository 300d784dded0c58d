use std::path::PathBuf;

const DEFAULT_COMMAND_PORT: u16 = 10000;

const DEFAULT_STATUS_PORT: u16 = 11000;

pub fn get_default_command_port() -> u16 {
    DEFAULT_COMMAND_PORT
}

pub fn get_default_status_port() -> u16 {
    DEFAULT_STATUS_PORT
}

const TXHUB_CONFIG: &str = "TXHUB_CONFIG";

const DEFAULT_CONFIG: &str = "./txhub.json";

/// Config file path from the environment, falling back to `./txhub.json`.
pub fn get_config_path() -> PathBuf {
    let path_from_env = std::env::var(TXHUB_CONFIG);
    path_from_env.map_or(PathBuf::from(DEFAULT_CONFIG), PathBuf::from)
}

/// Random placeholder name for catalog entities discovered on a device,
/// e.g. `unknown_scheme_3fa2c01b`.
pub fn placeholder_name(kind: &str) -> String {
    format!("unknown_{kind}_{:08x}", rand::random::<u32>())
}

pub fn is_placeholder_name(name: &str) -> bool {
    name.starts_with("unknown_")
}
