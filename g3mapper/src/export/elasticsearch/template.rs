/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::Path;

use anyhow::{Context, anyhow};
use http::Method;
use serde_json::Value;

use super::client::{ElasticsearchClient, HttpResponse};

pub(super) fn template_api_path(name: &str) -> String {
    format!("/_template/{name}")
}

/// Read and validate the template file.
pub(super) async fn read_template(path: &Path) -> anyhow::Result<Vec<u8>> {
    let path = path.to_path_buf();
    let content = tokio::task::spawn_blocking(move || std::fs::read(&path))
        .await
        .map_err(|e| anyhow!("failed to join read task: {e}"))?
        .context("failed to read template file")?;
    serde_json::from_slice::<Value>(&content).context("template file is not valid json")?;
    Ok(content)
}

pub(super) fn check_template_response(rsp: &HttpResponse) -> anyhow::Result<()> {
    rsp.check_status()?;
    let v: Value =
        serde_json::from_slice(&rsp.body).context("invalid json body in template response")?;
    if v.get("acknowledged").and_then(Value::as_bool) == Some(true) {
        Ok(())
    } else {
        Err(anyhow!("template request not acknowledged"))
    }
}

/// Upload the index template stored in `path` as `name`.
pub(super) async fn put_template(
    client: &mut ElasticsearchClient,
    name: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let body = read_template(path).await?;
    let rsp = client
        .send(
            Method::PUT,
            &template_api_path(name),
            "application/json",
            &body,
        )
        .await?;
    check_template_response(&rsp)
}
