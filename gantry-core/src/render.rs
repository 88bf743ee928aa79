//! 错误响应渲染
//!
//! 所有错误最终都经过这里输出：根据 Accept 头选择 JSON、HTML 或纯文本。

use http::header::{ACCEPT, WWW_AUTHENTICATE};
use http::StatusCode;
use std::io::{self, Write};

use crate::error::HttpActionError;
use crate::exchange::HttpExchange;

/// 错误响应体格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFormat {
    /// `{"message": "..."}`
    Json,
    /// HTML 片段
    Html,
    /// `MESSAGE: ...`
    Plain,
}

impl ErrorFormat {
    /// 根据 Accept 头选择格式
    pub fn from_accept<S: AsRef<str>>(accept: &[S]) -> Self {
        let accepts = |media_type: &str| {
            accept
                .iter()
                .any(|value| value.as_ref().contains(media_type))
        };
        if accepts("application/json") {
            ErrorFormat::Json
        } else if accepts("text/html") {
            ErrorFormat::Html
        } else {
            ErrorFormat::Plain
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ErrorFormat::Json => "application/json",
            ErrorFormat::Html => "text/html; charset=utf-8",
            ErrorFormat::Plain => "text/plain; charset=utf-8",
        }
    }

    /// 生成响应体
    pub fn body(&self, status: StatusCode, message: &str) -> String {
        match self {
            ErrorFormat::Json => serde_json::json!({ "message": message }).to_string(),
            ErrorFormat::Html => format!(
                "<body><h2>ERROR {}</h2><p>{}</p></body>",
                status.as_u16(),
                escape_html(message)
            ),
            ErrorFormat::Plain => format!("MESSAGE: {message}"),
        }
    }
}

/// 输出状态码 + 错误消息
pub fn write_error<E>(exchange: &mut E, status: StatusCode, message: &str) -> io::Result<()>
where
    E: HttpExchange + ?Sized,
{
    let accept = exchange.headers(ACCEPT.as_str());
    let format = ErrorFormat::from_accept(&accept[..]);
    let body = format.body(status, message);

    exchange.set_status(status);
    exchange.write(format.content_type(), &mut |out: &mut dyn Write| {
        out.write_all(body.as_bytes())
    })
}

/// 把请求错误渲染到 exchange
///
/// 失败前已写入的响应会先被丢弃。重定向和认证质询不输出错误体，
/// 其余错误统一走 [`HttpExchange::send_error`]。
pub fn send_action_error(
    exchange: &mut dyn HttpExchange,
    error: &HttpActionError,
) -> io::Result<()> {
    exchange.reset_response();
    match error {
        HttpActionError::Redirect { location } => exchange.send_redirect(location),
        HttpActionError::Unauthorized {
            challenge: Some(challenge),
            message,
        } => {
            exchange.set_response_header(WWW_AUTHENTICATE.as_str(), challenge);
            exchange.send_error(StatusCode::UNAUTHORIZED, message)
        }
        other => exchange.send_error(other.status_code(), &other.client_message()),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
