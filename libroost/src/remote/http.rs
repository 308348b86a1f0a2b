//! HTTP implementation of the remote platform client
//!
//! Thin REST wrapper: one method per endpoint, bearer authentication, and
//! strict status checking. Any unexpected status surfaces as
//! `RemoteError::Api` with the upstream body preserved verbatim.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Config;
use crate::error::{RemoteError, Result};
use crate::remote::{Remote, RemoteUser, TokenGrant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpRemote {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    callback_url: String,
}

impl HttpRemote {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.remote.api_base.trim_end_matches('/').to_string(),
            client_id: config.oauth.client_id.clone(),
            client_secret: config.oauth.client_secret.clone(),
            callback_url: config.oauth.callback_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()).into())
    }

    /// Enforce the expected status and parse the body as JSON.
    async fn expect_json(&self, response: reqwest::Response, expected: u16) -> Result<Value> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if status != expected {
            return Err(RemoteError::Api { status, body }.into());
        }

        serde_json::from_str(&body).map_err(|e| RemoteError::Malformed(e.to_string()).into())
    }

    /// Enforce the expected status, discarding the body on success.
    async fn expect_status(&self, response: reqwest::Response, expected: u16) -> Result<()> {
        let status = response.status().as_u16();
        if status != expected {
            let body = response
                .text()
                .await
                .map_err(|e| RemoteError::Transport(e.to_string()))?;
            return Err(RemoteError::Api { status, body }.into());
        }
        Ok(())
    }
}

fn str_field<'a>(value: &'a Value, pointer: &str) -> Result<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Malformed(format!("missing field {}", pointer)).into())
}

#[async_trait]
impl Remote for HttpRemote {
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant> {
        let request = self
            .client
            .post(self.url("/oauth2/token"))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.callback_url),
                ("code_verifier", verifier),
            ]);

        let response = self.send(request).await?;
        let body = self.expect_json(response, 200).await?;

        Ok(TokenGrant {
            access_token: str_field(&body, "/access_token")?.to_string(),
            refresh_token: body
                .pointer("/refresh_token")
                .and_then(Value::as_str)
                .map(str::to_string),
            expires_in: body.pointer("/expires_in").and_then(Value::as_i64),
            scope: body
                .pointer("/scope")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn whoami(&self, access_token: &str) -> Result<RemoteUser> {
        let request = self
            .client
            .get(self.url("/users/me"))
            .bearer_auth(access_token);

        let response = self.send(request).await?;
        let body = self.expect_json(response, 200).await?;

        Ok(RemoteUser {
            id: str_field(&body, "/data/id")?.to_string(),
            handle: str_field(&body, "/data/username")?.to_string(),
            display_name: body
                .pointer("/data/name")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn user_by_handle(&self, access_token: &str, handle: &str) -> Result<RemoteUser> {
        let request = self
            .client
            .get(self.url(&format!("/users/by/username/{}", handle)))
            .bearer_auth(access_token);

        let response = self.send(request).await?;
        let body = self.expect_json(response, 200).await?;

        Ok(RemoteUser {
            id: str_field(&body, "/data/id")?.to_string(),
            handle: str_field(&body, "/data/username")?.to_string(),
            display_name: body
                .pointer("/data/name")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn publish(&self, access_token: &str, body: &str) -> Result<String> {
        let request = self
            .client
            .post(self.url("/tweets"))
            .bearer_auth(access_token)
            .json(&json!({ "text": body }));

        let response = self.send(request).await?;
        let body = self.expect_json(response, 201).await?;

        Ok(str_field(&body, "/data/id")?.to_string())
    }

    async fn create_list(
        &self,
        access_token: &str,
        name: &str,
        description: Option<&str>,
        private: bool,
    ) -> Result<String> {
        let mut payload = json!({ "name": name, "private": private });
        if let Some(description) = description {
            payload["description"] = json!(description);
        }

        let request = self
            .client
            .post(self.url("/lists"))
            .bearer_auth(access_token)
            .json(&payload);

        let response = self.send(request).await?;
        let body = self.expect_json(response, 201).await?;

        Ok(str_field(&body, "/data/id")?.to_string())
    }

    async fn update_list(
        &self,
        access_token: &str,
        list_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let mut payload = json!({ "name": name });
        if let Some(description) = description {
            payload["description"] = json!(description);
        }

        let request = self
            .client
            .put(self.url(&format!("/lists/{}", list_id)))
            .bearer_auth(access_token)
            .json(&payload);

        let response = self.send(request).await?;
        self.expect_status(response, 200).await
    }

    async fn delete_list(&self, access_token: &str, list_id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/lists/{}", list_id)))
            .bearer_auth(access_token);

        let response = self.send(request).await?;
        self.expect_status(response, 200).await
    }

    async fn add_list_member(
        &self,
        access_token: &str,
        list_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("/lists/{}/members", list_id)))
            .bearer_auth(access_token)
            .json(&json!({ "user_id": user_id }));

        let response = self.send(request).await?;
        self.expect_status(response, 200).await
    }

    async fn remove_list_member(
        &self,
        access_token: &str,
        list_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/lists/{}/members/{}", list_id, user_id)))
            .bearer_auth(access_token);

        let response = self.send(request).await?;
        self.expect_status(response, 200).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_field_extraction() {
        let value = json!({ "data": { "id": "999", "username": "alice" } });
        assert_eq!(str_field(&value, "/data/id").unwrap(), "999");
        assert_eq!(str_field(&value, "/data/username").unwrap(), "alice");

        let missing = str_field(&value, "/data/name");
        assert!(missing.is_err());
        assert!(missing.unwrap_err().to_string().contains("/data/name"));
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let mut config = Config::default_config();
        config.remote.api_base = "https://api.example.com/2/".to_string();
        let remote = HttpRemote::new(&config).unwrap();
        assert_eq!(remote.url("/tweets"), "https://api.example.com/2/tweets");
    }
}
