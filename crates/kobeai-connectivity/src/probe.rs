// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HEAD-request reachability probe.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kobeai_auth::ApiClient;
use kobeai_config::model::ConnectivityConfig;
use kobeai_core::{ConnectivityProbe, KobeError, ProbeResult};
use reqwest::Url;
use tokio::time::Instant;
use tracing::debug;

/// Sends `HEAD {base}{path}?t=<millis>`. Any HTTP response, including 401
/// and 403, counts as reachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    api: ApiClient,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(api: ApiClient, config: &ConnectivityConfig) -> Self {
        Self {
            api,
            path: config.probe_path.clone(),
            timeout: config.probe_timeout(),
        }
    }

    fn probe_url(&self) -> Result<Url, KobeError> {
        let stamp = Utc::now().timestamp_millis().to_string();
        self.api.url_with_query(&self.path, &[("t", &stamp)])
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> ProbeResult {
        let url = match self.probe_url() {
            Ok(url) => url,
            Err(e) => {
                return ProbeResult::Unreachable {
                    reason: e.to_string(),
                };
            }
        };
        let started = Instant::now();
        match self.api.http().head(url).timeout(self.timeout).send().await {
            Ok(response) => {
                let latency = started.elapsed();
                debug!(status = response.status().as_u16(), ?latency, "probe answered");
                ProbeResult::Reachable {
                    status: response.status().as_u16(),
                    latency,
                }
            }
            Err(e) => ProbeResult::Unreachable {
                reason: e.to_string(),
            },
        }
    }
}
