use std::fmt;

use reqwest::Client;

use crate::models::embed::Embed;
use crate::models::message::CreateMessage;

const USER_AGENT: &str = concat!("fluxbot/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub enum RestError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestError::Http(e) => write!(f, "HTTP error: {e}"),
            RestError::Api { status, body } => write!(f, "API returned {status}: {body}"),
        }
    }
}

impl From<reqwest::Error> for RestError {
    fn from(e: reqwest::Error) -> Self {
        RestError::Http(e)
    }
}

/// Authenticated client for the Fluxer REST API.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
        }
    }

    /// Post a message to a channel. Fire-and-forget from the session core's
    /// perspective: the caller logs failures, nothing is retried.
    pub async fn create_message(
        &self,
        channel_id: &str,
        content: Option<&str>,
        embed: Option<&Embed>,
    ) -> Result<(), RestError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let body = CreateMessage {
            content: content.map(str::to_owned),
            embeds: embed.map(|e| vec![e.clone()]),
        };
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .header("User-Agent", USER_AGENT)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RestError::Api { status, body });
        }

        Ok(())
    }
}
