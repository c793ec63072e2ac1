//! Streaming miss path.
//!
//! Header checks run before any body byte is read. An eligible response is
//! forked: the client receives chunks as the origin produces them (through
//! a bounded channel, so the origin is read no faster than the client
//! drains) while a background task accumulates the same chunks, runs the body checks and
//! writes the record once. Plugin `should_cache` hooks need the whole body up
//! front and are not consulted here.

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

use super::cacheability::{build_record, check_body, check_headers, header_skip, FetchResult};
use super::OriginResponse;
use crate::cache::{now_millis, RecordStore};
use crate::config::Config;
use crate::constants::TEE_CLIENT_BUFFER_CHUNKS;
use crate::engine::BackgroundTasks;
use crate::error::KasumiError;
use crate::metrics::KasumiMetrics;
use crate::pipeline::RequestContext;
use crate::response::{EngineResponse, ResponseBody};

/// Everything the background capture needs once the request has returned
pub struct TeeCapture {
    pub ctx: Arc<RequestContext>,
    pub config: Arc<Config>,
    pub store: RecordStore,
    pub key: String,
}

/// Fork an origin response. The returned response streams to the client;
/// eligibility for storage is decided in the background.
pub fn tee_response(
    response: OriginResponse,
    capture: TeeCapture,
    tasks: &BackgroundTasks,
    now: u64,
) -> FetchResult {
    if let Err(reason) = check_headers(response.status, &response.headers, &capture.config.cache) {
        return header_skip(response, reason, now, &capture.config.cache);
    }

    let EngineResponse {
        status,
        status_text,
        headers,
        body,
    } = response;
    let (client_tx, client_rx) = mpsc::channel::<Result<Bytes, KasumiError>>(TEE_CLIENT_BUFFER_CHUNKS);
    let mut upstream = body.into_stream();

    let captured_headers = headers.clone();
    let captured_status_text = status_text.clone();
    tasks.spawn("tee-capture", async move {
        let TeeCapture {
            ctx,
            config,
            store,
            key,
        } = capture;

        let mut client = Some(client_tx);
        let mut buf = Vec::new();
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    buf.extend_from_slice(&bytes);
                    // A slow client holds the capture back; a departed one
                    // does not stop it
                    if let Some(tx) = client.as_mut() {
                        if tx.send(Ok(bytes)).await.is_err() {
                            client = None;
                        }
                    }
                }
                Err(e) => {
                    if let Some(mut tx) = client.take() {
                        let _ = tx.send(Err(KasumiError::Origin(e.to_string()))).await;
                    }
                    return Err(e);
                }
            }
        }
        drop(client);

        let Ok(body) = String::from_utf8(buf) else {
            skip(&ctx, "content-type");
            return Ok(());
        };
        if let Err(reason) = check_body(&ctx, &captured_headers, &body, &config) {
            skip(&ctx, reason.as_str());
            return Ok(());
        }

        let now = now_millis();
        let record = build_record(
            status,
            &captured_status_text,
            &captured_headers,
            body,
            now,
            &config.cache,
        );
        store.put(&key, &record, now).await.map_err(|e| {
            KasumiMetrics::global().record_store_error("put");
            KasumiError::from(e)
        })?;
        ctx.claim("tee-stored");
        Ok(())
    });

    FetchResult {
        response: EngineResponse {
            status,
            status_text,
            headers,
            body: ResponseBody::Stream(client_rx.boxed()),
        },
        record: None,
        skip: false,
        reason: None,
    }
}

fn skip(ctx: &RequestContext, reason: &str) {
    ctx.claim(format!("skip:{}", reason));
    KasumiMetrics::global().record_skip(reason);
    tracing::debug!(request_id = %ctx.request_id(), reason, "Tee capture not stored");
}
