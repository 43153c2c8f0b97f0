// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `/chat/conversations` endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use kobeai_auth::{ApiClient, TokenGuard};
use kobeai_core::{Conversation, ConversationApi, ConversationId, KobeError, MessagePage};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::json;

const CONVERSATIONS: &str = "/chat/conversations";

/// Conversation CRUD against the backend, authenticated with the guard's
/// current credential.
pub struct HttpConversationApi {
    api: ApiClient,
    guard: Arc<TokenGuard>,
}

impl HttpConversationApi {
    pub fn new(api: ApiClient, guard: Arc<TokenGuard>) -> Self {
        Self { api, guard }
    }

    fn bearer(&self) -> Result<String, KobeError> {
        self.guard.bearer().ok_or_else(|| KobeError::AuthExpired {
            message: "no valid credential".into(),
        })
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, KobeError> {
        Ok(self.api.request(method, path, Some(&self.bearer()?)))
    }

    fn authed_to(&self, method: Method, url: Url) -> Result<RequestBuilder, KobeError> {
        Ok(self.api.request_to(method, url, Some(&self.bearer()?)))
    }

    /// A rejected credential signs the session out.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Option<T>, KobeError> {
        self.guard.check(self.api.send(req).await).await
    }

    async fn send_data<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, KobeError> {
        self.guard.check(self.api.send_data(req).await).await
    }
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn list(&self) -> Result<Vec<Conversation>, KobeError> {
        let req = self.authed(Method::GET, CONVERSATIONS)?;
        Ok(self.send(req).await?.unwrap_or_default())
    }

    async fn create(&self, title: &str) -> Result<Conversation, KobeError> {
        let req = self
            .authed(Method::POST, CONVERSATIONS)?
            .json(&json!({ "title": title }));
        self.send_data(req).await
    }

    async fn get(&self, id: ConversationId) -> Result<Conversation, KobeError> {
        let req = self.authed(Method::GET, &format!("{CONVERSATIONS}/{id}"))?;
        self.send_data(req).await
    }

    async fn rename(&self, id: ConversationId, title: &str) -> Result<(), KobeError> {
        let url = self
            .api
            .url_with_query(&format!("{CONVERSATIONS}/{id}/title"), &[("title", title)])?;
        let req = self.authed_to(Method::PUT, url)?;
        self.send::<serde_json::Value>(req).await.map(|_| ())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), KobeError> {
        let req = self.authed(Method::DELETE, &format!("{CONVERSATIONS}/{id}"))?;
        self.send::<serde_json::Value>(req).await.map(|_| ())
    }

    async fn messages(
        &self,
        id: ConversationId,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<MessagePage, KobeError> {
        let limit = limit.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        let url = self
            .api
            .url_with_query(&format!("{CONVERSATIONS}/{id}/messages"), &query)?;
        let req = self.authed_to(Method::GET, url)?;
        self.send_data(req).await
    }
}
