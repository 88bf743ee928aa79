//! 客户端请求构建
//!
//! 与服务端共用 [`PathTemplate`]：展开路径参数、附加查询参数，
//! 模板要求的查询参数若未设置，会以无值形式附加（`/items?draft`），保证命中同一个动作。
//! 响应侧把错误状态码和服务端渲染的错误消息还原成 [`HttpClientError::Status`]。

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, LOCATION};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use thiserror::Error;

use crate::template::PathTemplate;

/// 客户端错误
#[derive(Error, Debug)]
pub enum HttpClientError {
    #[error("Invalid path template '{template}': {message}")]
    Template { template: String, message: String },

    #[error("Missing path parameter '{0}'")]
    MissingPathParameter(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// 待发送的请求
#[derive(Debug, Clone)]
pub struct ClientRequest {
    method: Method,
    template: PathTemplate,
    path_parameters: HashMap<String, String>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Option<(String, Bytes)>,
}

impl ClientRequest {
    pub fn new(method: Method, template: &str) -> Result<Self, HttpClientError> {
        let template = PathTemplate::parse(template).map_err(|e| HttpClientError::Template {
            template: template.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            method,
            template,
            path_parameters: HashMap::new(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
        })
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.path_parameters.insert(name.into(), value.to_string());
        self
    }

    /// 追加查询参数，同名参数可重复
    pub fn query_param(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.headers.push((name.into(), value.to_string()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.cookies.push((name.into(), value.to_string()));
        self
    }

    pub fn json_body<T: Serialize>(self, value: &T) -> Result<Self, HttpClientError> {
        let body = serde_json::to_vec(value).map_err(HttpClientError::Encode)?;
        Ok(self.body("application/json", body))
    }

    pub fn body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.body = Some((content_type.into(), body.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// 展开后的路径和查询串
    pub fn path_and_query(&self) -> Result<String, HttpClientError> {
        let path = self
            .template
            .expand(&self.path_parameters)
            .map_err(|e| HttpClientError::MissingPathParameter(e.0))?;

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.query {
            query.append_pair(name, value);
        }
        if let Some(required) = self.template.required_query_param() {
            if !self.query.iter().any(|(name, _)| name == required) {
                query.append_key_only(required);
            }
        }

        let query = query.finish();
        if query.is_empty() {
            Ok(path)
        } else {
            Ok(format!("{path}?{query}"))
        }
    }

    /// 生成 `http::Request`，`base_url` 例如 `http://localhost:8080/api`
    pub fn to_http_request(&self, base_url: &str) -> Result<Request<Bytes>, HttpClientError> {
        let uri = format!("{}{}", base_url.trim_end_matches('/'), self.path_and_query()?);
        let mut builder = Request::builder().method(self.method.clone()).uri(uri);

        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !self.cookies.is_empty() {
            let cookies: Vec<String> = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            builder = builder.header(COOKIE, cookies.join("; "));
        }

        let body = match &self.body {
            Some((content_type, body)) => {
                builder = builder.header(CONTENT_TYPE, content_type.as_str());
                body.clone()
            }
            None => Bytes::new(),
        };
        Ok(builder.body(body)?)
    }
}

/// 收到的响应
#[derive(Debug, Clone)]
pub struct ClientResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ClientResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// 4xx/5xx 转换为 [`HttpClientError::Status`]
    pub fn error_for_status(self) -> Result<Self, HttpClientError> {
        if self.status.is_client_error() || self.status.is_server_error() {
            return Err(HttpClientError::Status {
                status: self.status,
                message: self.error_message(),
            });
        }
        Ok(self)
    }

    pub fn json<T: DeserializeOwned>(self) -> Result<T, HttpClientError> {
        let response = self.error_for_status()?;
        serde_json::from_slice(&response.body).map_err(HttpClientError::Decode)
    }

    pub fn text(self) -> Result<String, HttpClientError> {
        let response = self.error_for_status()?;
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    /// 还原服务端渲染的错误消息
    fn error_message(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let is_json = self
            .header(CONTENT_TYPE.as_str())
            .is_some_and(|value| value.starts_with("application/json"));

        if is_json {
            if let Ok(serde_json::Value::Object(object)) = serde_json::from_str(&text) {
                if let Some(serde_json::Value::String(message)) = object.get("message") {
                    return message.clone();
                }
            }
        }
        if let Some(message) = text.strip_prefix("MESSAGE: ") {
            return message.trim_end().to_string();
        }
        if text.trim().is_empty() {
            return self
                .status
                .canonical_reason()
                .unwrap_or("Unknown status")
                .to_string();
        }
        text.trim().to_string()
    }
}

impl From<Response<Bytes>> for ClientResponse {
    fn from(response: Response<Bytes>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }
}
