use std::path::PathBuf;

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.fluxer.app/?v=1&encoding=json";
const DEFAULT_API_URL: &str = "https://api.fluxer.app";

#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token. Required; startup fails without it.
    pub token: String,
    /// Text prefix that marks a message as a command invocation.
    pub prefix: String,
    /// Directory of command definition files.
    pub commands_path: PathBuf,
    pub gateway_url: String,
    pub api_url: String,
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("FLUXBOT_TOKEN").expect("FLUXBOT_TOKEN is required"),
            prefix: std::env::var("FLUXBOT_PREFIX").unwrap_or_else(|_| "!".to_string()),
            commands_path: std::env::var("FLUXBOT_COMMANDS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./commands")),
            gateway_url: std::env::var("FLUXBOT_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            api_url: std::env::var("FLUXBOT_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            debug: std::env::var("FLUXBOT_DEBUG")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
