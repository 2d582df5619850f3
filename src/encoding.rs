// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gzip encoding of outgoing JSON request bodies.

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Body, Request};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Request body is a stream and cannot be compressed")]
    StreamingBody,
}

/// Compress `data` into a gzip member.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    compress(data, Compression::default())
}

fn compress(data: &[u8], level: Compression) -> Result<Vec<u8>, EncodingError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Parameter encoding that sends the parameters as a gzipped JSON body.
#[derive(Debug, Clone, Copy)]
pub struct GzipEncoding {
    level: Compression,
}

impl Default for GzipEncoding {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipEncoding {
    pub fn with_level(level: Compression) -> Self {
        Self { level }
    }

    /// Encode `parameters` into `request`.
    ///
    /// With no parameters the request is left as is. On error the request is
    /// not modified; `Content-Encoding: gzip` is only set once compression has
    /// succeeded.
    pub fn encode<T>(&self, request: &mut Request, parameters: Option<&T>) -> Result<(), EncodingError>
    where
        T: Serialize + ?Sized,
    {
        let Some(parameters) = parameters else {
            return Ok(());
        };

        let json = serde_json::to_vec(parameters)?;
        let compressed = compress(&json, self.level)?;

        tracing::debug!(
            raw_bytes = json.len(),
            compressed_bytes = compressed.len(),
            "Gzipped request body"
        );

        *request.body_mut() = Some(Body::from(compressed));
        let headers = request.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        Ok(())
    }
}

/// Compress the body a request already carries.
///
/// Requests without a body are left untouched.
pub fn gzip_request(request: &mut Request) -> Result<(), EncodingError> {
    let Some(body) = request.body() else {
        return Ok(());
    };
    let raw = body.as_bytes().ok_or(EncodingError::StreamingBody)?;
    let compressed = gzip(raw)?;

    *request.body_mut() = Some(Body::from(compressed));
    request
        .headers_mut()
        .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    Ok(())
}
