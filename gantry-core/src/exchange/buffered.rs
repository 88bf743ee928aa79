//! 基于 `http` 类型的内存 exchange
//!
//! 请求体整体缓冲为 [`Bytes`]，响应写入内存后通过 [`BufferedExchange::into_response`]
//! 转换为 `http::Response<Bytes>`。Web 适配器和测试都使用它。

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, HOST};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use std::collections::HashMap;
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};

use super::{parse_cookie_header, BodyWriter, HttpExchange, UserPrincipal};

/// 内存中的 HTTP 交换
#[derive(Debug)]
pub struct BufferedExchange {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    context_path: String,
    path_info: String,
    query: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    client_addr: Option<SocketAddr>,
    client_certificate: Option<Vec<u8>>,
    principal: Option<UserPrincipal>,
    path_parameters: HashMap<String, String>,
    response: BufferedResponse,
}

#[derive(Debug)]
struct BufferedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl BufferedExchange {
    /// 从完整的请求创建
    ///
    /// `UserPrincipal` 和 `SocketAddr` 若存在于请求扩展中会被自动取出
    pub fn new(request: Request<Bytes>) -> Self {
        let (mut parts, body) = request.into_parts();

        let query = parts
            .uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        let cookies = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(parse_cookie_header)
            .collect();

        let principal = parts.extensions.remove::<UserPrincipal>();
        let client_addr = parts.extensions.remove::<SocketAddr>();
        let path_info = parts.uri.path().to_string();

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            context_path: String::new(),
            path_info,
            query,
            cookies,
            client_addr,
            client_certificate: None,
            principal,
            path_parameters: HashMap::new(),
            response: BufferedResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Vec::new(),
            },
        }
    }

    /// 快捷构造：无请求体的请求
    pub fn request(method: Method, uri: &str) -> Self {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap_or_else(|_| Request::new(Bytes::new()));
        Self::new(request)
    }

    /// 设置上下文路径，`path_info` 会去掉该前缀
    pub fn with_context_path(mut self, context_path: &str) -> Self {
        let context_path = context_path.trim_end_matches('/');
        if let Some(rest) = self.uri.path().strip_prefix(context_path) {
            if rest.is_empty() || rest.starts_with('/') {
                self.context_path = context_path.to_string();
                self.path_info = rest.to_string();
            }
        }
        self
    }

    pub fn with_principal(mut self, principal: UserPrincipal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    pub fn with_client_certificate(mut self, der: Vec<u8>) -> Self {
        self.client_certificate = Some(der);
        self
    }

    pub fn response_status(&self) -> StatusCode {
        self.response.status
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn response_headers(&self, name: &str) -> Vec<String> {
        collect_values(&self.response.headers, name)
    }

    pub fn response_body(&self) -> &[u8] {
        &self.response.body
    }

    pub fn response_text(&self) -> String {
        String::from_utf8_lossy(&self.response.body).into_owned()
    }

    /// 转换为最终响应
    pub fn into_response(self) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from(self.response.body));
        *response.status_mut() = self.response.status;
        *response.headers_mut() = self.response.headers;
        response
    }

    fn parse_header(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => Some((name, value)),
            _ => {
                tracing::warn!(header = name, "Ignoring invalid response header");
                None
            }
        }
    }
}

fn collect_values(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

impl HttpExchange for BufferedExchange {
    fn http_method(&self) -> &Method {
        &self.method
    }

    fn request_url(&self) -> String {
        let host = self
            .headers
            .get(HOST)
            .and_then(|value| value.to_str().ok());
        match (self.uri.scheme_str(), self.uri.authority(), host) {
            (Some(scheme), Some(authority), _) => {
                format!("{scheme}://{authority}{}", self.uri.path())
            }
            (_, _, Some(host)) => format!("http://{host}{}", self.uri.path()),
            _ => self.uri.path().to_string(),
        }
    }

    fn context_path(&self) -> &str {
        &self.context_path
    }

    fn path_info(&self) -> &str {
        &self.path_info
    }

    fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    fn parameters(&self, name: &str) -> Vec<String> {
        self.query
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    fn headers(&self, name: &str) -> Vec<String> {
        collect_values(&self.headers, name)
    }

    fn cookies(&self, name: &str) -> Vec<String> {
        self.cookies
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    fn body(&mut self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(&self.body[..]))
    }

    fn client_ip(&self) -> Option<IpAddr> {
        self.client_addr.map(|addr| addr.ip())
    }

    fn client_certificate(&self) -> Option<&[u8]> {
        self.client_certificate.as_deref()
    }

    fn user_principal(&self) -> Option<&UserPrincipal> {
        self.principal.as_ref()
    }

    fn path_parameters(&self) -> &HashMap<String, String> {
        &self.path_parameters
    }

    fn set_path_parameters(&mut self, parameters: HashMap<String, String>) {
        self.path_parameters = parameters;
    }

    fn set_response_header(&mut self, name: &str, value: &str) {
        if let Some((name, value)) = Self::parse_header(name, value) {
            self.response.headers.insert(name, value);
        }
    }

    fn add_response_header(&mut self, name: &str, value: &str) {
        if let Some((name, value)) = Self::parse_header(name, value) {
            self.response.headers.append(name, value);
        }
    }

    fn set_status(&mut self, status: StatusCode) {
        self.response.status = status;
    }

    fn reset_response(&mut self) {
        self.response.status = StatusCode::OK;
        self.response.headers.clear();
        self.response.body.clear();
    }

    fn write(&mut self, content_type: &str, writer: BodyWriter<'_>) -> io::Result<()> {
        self.set_response_header(CONTENT_TYPE.as_str(), content_type);
        writer(&mut self.response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ResponseCookie;
    use std::io::Write;

    fn request(uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(HOST, "example.com")
            .header(COOKIE, "session=abc; theme=dark")
            .body(Bytes::from_static(b"hello"))
            .unwrap()
    }

    #[test]
    fn test_reads_query_and_cookies() {
        let exchange = BufferedExchange::new(request("/api/items?tag=a&tag=b%20c&draft"));

        assert_eq!(exchange.parameters("tag"), vec!["a", "b c"]);
        assert!(exchange.has_parameter("draft"));
        assert!(!exchange.has_parameter("missing"));
        assert_eq!(exchange.cookies("theme"), vec!["dark"]);
        assert_eq!(exchange.request_url(), "http://example.com/api/items");
    }

    #[test]
    fn test_context_path_is_stripped() {
        let exchange = BufferedExchange::new(request("/api/items")).with_context_path("/api/");
        assert_eq!(exchange.context_path(), "/api");
        assert_eq!(exchange.path_info(), "/items");

        let unrelated = BufferedExchange::new(request("/apix/items")).with_context_path("/api");
        assert_eq!(unrelated.context_path(), "");
        assert_eq!(unrelated.path_info(), "/apix/items");
    }

    #[test]
    fn test_body_and_response() {
        let mut exchange = BufferedExchange::new(request("/items"));

        let mut body = String::new();
        exchange.body().unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello");

        exchange.set_status(StatusCode::CREATED);
        exchange.set_cookie(&ResponseCookie::new("a", "1"));
        exchange.set_cookie(&ResponseCookie::new("b", "2"));
        exchange
            .write("text/plain", &mut |out| out.write_all(b"created"))
            .unwrap();

        assert_eq!(exchange.response_headers("set-cookie"), vec!["a=1", "b=2"]);

        let response = exchange.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.body().as_ref(), b"created");
    }

    #[test]
    fn test_principal_from_extensions() {
        let mut request = request("/items");
        request
            .extensions_mut()
            .insert(UserPrincipal::new("alice").with_role("admin"));
        let exchange = BufferedExchange::new(request);

        assert!(exchange.is_user_logged_in());
        assert!(exchange.is_user_in_role("admin"));
        assert!(!exchange.is_user_in_role("auditor"));
    }
}
