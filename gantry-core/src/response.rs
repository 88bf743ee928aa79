//! 完整控制的响应

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use std::io::Write;

use crate::exchange::{HttpExchange, ResponseCookie};

/// HTTP 响应
///
/// 控制器方法返回它即可完全控制状态码、响应头和响应体，不需要额外的返回值映射。
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    cookies: Vec<ResponseCookie>,
    body: Option<(String, Bytes)>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
        }
    }

    /// 200 OK
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// 201 Created
    pub fn created(location: impl Into<String>) -> Self {
        Self::new(StatusCode::CREATED).header("Location", location)
    }

    /// 204 No Content
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// 追加响应头
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, cookie: ResponseCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.body = Some((content_type.into(), body.into()));
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        let text: String = text.into();
        self.body("text/plain; charset=utf-8", text)
    }

    /// JSON 响应体
    pub fn json<T: Serialize>(self, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.body("application/json", body))
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// 写入 exchange
    pub fn write_to(self, exchange: &mut dyn HttpExchange) -> std::io::Result<()> {
        exchange.set_status(self.status);
        for (name, value) in &self.headers {
            exchange.add_response_header(name, value);
        }
        for cookie in &self.cookies {
            exchange.set_cookie(cookie);
        }
        match self.body {
            Some((content_type, body)) => {
                exchange.write(&content_type, &mut |out: &mut dyn Write| out.write_all(&body))
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::BufferedExchange;
    use http::Method;

    #[test]
    fn test_write_to_exchange() {
        let mut exchange = BufferedExchange::request(Method::POST, "/items");

        HttpResponse::created("/items/7")
            .cookie(ResponseCookie::new("last", "7"))
            .json(&serde_json::json!({ "id": 7 }))
            .unwrap()
            .write_to(&mut exchange)
            .unwrap();

        assert_eq!(exchange.response_status(), StatusCode::CREATED);
        assert_eq!(exchange.response_header("location"), Some("/items/7"));
        assert_eq!(exchange.response_header("set-cookie"), Some("last=7"));
        assert_eq!(exchange.response_header("content-type"), Some("application/json"));
        assert_eq!(exchange.response_text(), r#"{"id":7}"#);
    }

    #[test]
    fn test_no_content_has_no_body() {
        let mut exchange = BufferedExchange::request(Method::DELETE, "/items/7");
        HttpResponse::no_content().write_to(&mut exchange).unwrap();

        assert_eq!(exchange.response_status(), StatusCode::NO_CONTENT);
        assert!(exchange.response_body().is_empty());
        assert!(exchange.response_header("content-type").is_none());
    }
}
