//! 中间件模块

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;

use crate::constants::REQUEST_ID_HEADER;

/// 请求日志中间件
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        elapsed = ?elapsed,
        "Request completed"
    );

    response
}

/// 请求 ID 中间件
///
/// 客户端已带 `X-Request-ID` 时沿用，否则生成 UUID；响应中回写同一个值
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let request_id = match req.headers().get(REQUEST_ID_HEADER) {
        Some(value) => value.clone(),
        None => {
            let generated = HeaderValue::try_from(uuid::Uuid::new_v4().to_string());
            match generated {
                Ok(value) => value,
                Err(_) => return next.run(req).await,
            }
        }
    };

    req.headers_mut()
        .insert(REQUEST_ID_HEADER, request_id.clone());

    let mut response = next.run(req).await;

    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);

    response
}
