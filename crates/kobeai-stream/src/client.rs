// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP chat-completions transport.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kobeai_auth::ApiClient;
use kobeai_auth::api::transport_error;
use kobeai_config::model::{ServerConfig, StreamConfig};
use kobeai_core::{ChatRequest, ChatTransport, KobeError, Message, Role, StreamFailure};
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::StreamEngine;
use crate::identity::identity_reply;
use crate::session::StreamPolicy;

const COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionBody<'a> {
    message: &'a str,
    conversation_id: i64,
}

/// Streams assistant replies from `POST /chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatClient {
    api: ApiClient,
    engine: StreamEngine,
    connect_timeout: Duration,
    platform_type: Option<String>,
}

impl ChatClient {
    pub fn new(api: ApiClient, server: &ServerConfig, stream: &StreamConfig) -> Self {
        Self {
            api,
            engine: StreamEngine::new(StreamPolicy::from_config(stream)),
            connect_timeout: stream.connect_timeout(),
            platform_type: server.platform_type.clone(),
        }
    }

    pub fn engine(&self) -> &StreamEngine {
        &self.engine
    }

    fn completions_url(&self) -> Result<Url, KobeError> {
        match self.platform_type.as_deref().filter(|p| !p.is_empty()) {
            Some(platform) => self
                .api
                .url_with_query(COMPLETIONS_PATH, &[("platformType", platform)]),
            None => self.api.url_with_query(COMPLETIONS_PATH, &[]),
        }
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn stream_reply(
        &self,
        request: &ChatRequest,
        bearer: &str,
        on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Message, KobeError> {
        if let Some(reply) = identity_reply(&request.message) {
            debug!(conversation_id = %request.conversation_id, "answering identity question locally");
            on_update(reply);
            return Ok(Message::local(Role::Assistant, reply, Utc::now()));
        }

        let body = CompletionBody {
            message: &request.message,
            conversation_id: request.conversation_id.0,
        };
        let send = self
            .api
            .http()
            .post(self.completions_url()?)
            .header(AUTHORIZATION, bearer)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .json(&body)
            .send();

        let response = match tokio::time::timeout(self.connect_timeout, send).await {
            Err(_) => return Err(StreamFailure::ConnectTimeout.into()),
            Ok(Err(e)) => return Err(transport_error(e)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(KobeError::AuthExpired {
                message: "server rejected the credential".into(),
            });
        }
        if !status.is_success() {
            return Err(StreamFailure::HttpStatus {
                status: status.as_u16(),
            }
            .into());
        }
        info!(conversation_id = %request.conversation_id, status = %status, "reply stream opened");

        let content = self
            .engine
            .run(Box::pin(response.bytes_stream()), on_update).await?;
        Ok(Message::local(Role::Assistant, content, Utc::now()))
    }
}
