//! 请求/响应交换抽象
//!
//! 路由器和映射器只依赖 [`HttpExchange`]，具体传输层（axum、测试用的内存实现等）
//! 负责实现它。一个 exchange 只属于一个请求，不会跨请求共享。

mod buffered;

pub use buffered::BufferedExchange;

use http::{Method, StatusCode};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::net::IpAddr;

use crate::render;

/// 写入响应体的回调
pub type BodyWriter<'a> = &'a mut dyn FnMut(&mut dyn Write) -> io::Result<()>;

/// 传输层中立的 HTTP 交换接口
pub trait HttpExchange {
    // ========== 请求 ==========

    fn http_method(&self) -> &Method;

    /// 完整请求 URL（包含 scheme 和 host，若可知）
    fn request_url(&self) -> String;

    /// 应用挂载的上下文路径，例如 `/api`
    fn context_path(&self) -> &str;

    /// 相对于上下文路径的请求路径
    fn path_info(&self) -> &str;

    fn query_string(&self) -> Option<&str>;

    /// 同名查询参数的全部取值（已解码）
    fn parameters(&self, name: &str) -> Vec<String>;

    fn has_parameter(&self, name: &str) -> bool {
        !self.parameters(name).is_empty()
    }

    /// 同名请求头的全部取值
    fn headers(&self, name: &str) -> Vec<String>;

    /// 同名 Cookie 的全部取值
    fn cookies(&self, name: &str) -> Vec<String>;

    /// 请求体读取器
    fn body(&mut self) -> io::Result<Box<dyn Read + '_>>;

    fn client_ip(&self) -> Option<IpAddr>;

    /// TLS 客户端证书（DER 编码）
    fn client_certificate(&self) -> Option<&[u8]> {
        None
    }

    fn user_principal(&self) -> Option<&UserPrincipal>;

    fn is_user_logged_in(&self) -> bool {
        self.user_principal().is_some()
    }

    fn is_user_in_role(&self, role: &str) -> bool {
        self.user_principal()
            .map(|principal| principal.has_role(role))
            .unwrap_or(false)
    }

    /// 路由匹配后绑定的路径参数
    fn path_parameters(&self) -> &HashMap<String, String>;

    fn set_path_parameters(&mut self, parameters: HashMap<String, String>);

    fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_parameters().get(name).map(String::as_str)
    }

    // ========== 响应 ==========

    fn set_response_header(&mut self, name: &str, value: &str);

    fn add_response_header(&mut self, name: &str, value: &str);

    fn set_status(&mut self, status: StatusCode);

    /// 丢弃已写入的状态、响应头和响应体，状态恢复为 200
    fn reset_response(&mut self);

    /// 以状态码 + 消息的形式输出错误，响应体格式由 Accept 头决定
    fn send_error(&mut self, status: StatusCode, message: &str) -> io::Result<()> {
        render::write_error(self, status, message)
    }

    fn send_redirect(&mut self, location: &str) -> io::Result<()> {
        self.set_status(StatusCode::FOUND);
        self.set_response_header("Location", location);
        Ok(())
    }

    /// 写入响应体
    fn write(&mut self, content_type: &str, writer: BodyWriter<'_>) -> io::Result<()>;

    fn set_cookie(&mut self, cookie: &ResponseCookie) {
        self.add_response_header("Set-Cookie", &cookie.to_header_value());
    }
}

/// 已认证的用户
///
/// 认证策略不属于框架职责：传输层把认证结果放进 exchange，
/// 路由器只负责检查登录状态和角色。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPrincipal {
    name: String,
    roles: HashSet<String>,
}

impl UserPrincipal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: HashSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// 响应 Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub secure: bool,
    pub http_only: bool,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub domain: Option<String>,
}

impl ResponseCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secure: false,
            http_only: false,
            path: None,
            max_age: None,
            domain: None,
        }
    }

    /// 让浏览器删除该 Cookie
    pub fn expired(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0)
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// `Set-Cookie` 头的值
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];

        if let Some(path) = &self.path {
            parts.push(format!("Path={path}"));
        }
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={domain}"));
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={max_age}"));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }

        parts.join("; ")
    }
}

/// 解析 `Cookie` 请求头
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_value() {
        let cookie = ResponseCookie::new("session", "abc123")
            .path("/app")
            .max_age(3600)
            .secure(true)
            .http_only(true);

        assert_eq!(
            cookie.to_header_value(),
            "session=abc123; Path=/app; Max-Age=3600; Secure; HttpOnly"
        );
    }

    #[test]
    fn test_expired_cookie() {
        assert_eq!(ResponseCookie::expired("session").to_header_value(), "session=; Max-Age=0");
    }

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("session=abc123; theme=dark;lang=en; broken");
        assert_eq!(
            cookies,
            vec![
                ("session".to_string(), "abc123".to_string()),
                ("theme".to_string(), "dark".to_string()),
                ("lang".to_string(), "en".to_string()),
            ]
        );
    }

    #[test]
    fn test_principal_roles() {
        let principal = UserPrincipal::new("alice").with_role("admin");
        assert_eq!(principal.name(), "alice");
        assert!(principal.has_role("admin"));
        assert!(!principal.has_role("auditor"));
    }
}
