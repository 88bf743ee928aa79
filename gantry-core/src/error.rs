//! 错误类型
//!
//! 按照生命周期划分为两大类：
//!
//! 1. **配置错误** - 仅在控制器注册阶段出现，按控制器聚合后一次性报告
//! 2. **请求错误** - 每个请求独立产生，携带 HTTP 状态码，由路由器统一渲染
//!
//! 启动代码（日志初始化、配置加载、服务器启动）统一使用 `anyhow::Result`。

use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// 统一的启动期错误处理类型
pub use anyhow::Result;

// ============================================================================
// 请求错误
// ============================================================================

/// 请求处理过程中的错误
///
/// 控制器方法可以直接返回该错误来指定响应状态码；
/// 其他任何错误都会被路由器包装成 [`HttpActionError::Internal`]。
#[derive(Error, Debug)]
pub enum HttpActionError {
    /// 400 Bad Request
    #[error("{0}")]
    BadRequest(String),

    /// 401 Unauthorized，可选携带 `WWW-Authenticate` 质询
    #[error("{message}")]
    Unauthorized {
        message: String,
        challenge: Option<String>,
    },

    /// 403 Forbidden
    #[error("{0}")]
    Forbidden(String),

    /// 404 Not Found
    #[error("{0}")]
    NotFound(String),

    /// 其他自定义状态码
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// 重定向，渲染为 302 + Location
    #[error("Redirect to {location}")]
    Redirect { location: String },

    /// 500 Internal Server Error
    ///
    /// `detail` 只写入服务端日志，不会出现在响应体中
    #[error("Internal server error")]
    Internal { detail: String },
}

impl HttpActionError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// 未登录
    pub fn not_logged_in() -> Self {
        Self::Unauthorized {
            message: "User must be logged in".to_string(),
            challenge: None,
        }
    }

    /// 未登录，并要求客户端按指定方案认证（例如 `Basic realm="api"`）
    pub fn challenge(challenge: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: "Authentication required".to_string(),
            challenge: Some(challenge.into()),
        }
    }

    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    /// 获取错误对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Status { status, .. } => *status,
            Self::Redirect { .. } => StatusCode::FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回给客户端的消息
    pub fn client_message(&self) -> String {
        self.to_string()
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// 为参数映射错误补充参数位置信息，保持原状态码不变
    pub fn for_argument(self, action: &str, index: usize, type_name: &str) -> Self {
        let describe = |message: String| {
            format!("{message} (argument #{index} of type {type_name} in {action})")
        };
        match self {
            Self::BadRequest(message) => Self::BadRequest(describe(message)),
            Self::Forbidden(message) => Self::Forbidden(describe(message)),
            Self::NotFound(message) => Self::NotFound(describe(message)),
            Self::Status { status, message } => Self::Status {
                status,
                message: describe(message),
            },
            Self::Internal { detail } => Self::Internal {
                detail: describe(detail),
            },
            other => other,
        }
    }
}

// ============================================================================
// 配置错误
// ============================================================================

/// 单个配置问题
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{action}: invalid path template '{template}': {message}")]
    InvalidTemplate {
        action: String,
        template: String,
        message: String,
    },

    #[error("{action}: no mapping for parameter #{index} of type {type_name}")]
    UnmappedParameter {
        action: String,
        index: usize,
        type_name: String,
    },

    #[error("{action}: no mapping for return type {type_name}")]
    UnmappedReturnType { action: String, type_name: String },

    #[error(
        "{action}: path parameter '{name}' of argument #{index} is not declared in '{template}'"
    )]
    UnknownPathParameter {
        action: String,
        index: usize,
        name: String,
        template: String,
    },

    #[error("{action}: {message}")]
    InvalidMapping { action: String, message: String },

    #[error("{action}: no invoker bound")]
    MissingInvoker { action: String },

    #[error("{method} {template}: {action} conflicts with already registered {existing}")]
    ConflictingRoute {
        method: String,
        template: String,
        action: String,
        existing: String,
    },
}

/// 一个控制器的全部配置问题
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfigurationError {
    pub controller: String,
    pub errors: Vec<ConfigurationError>,
}

impl ControllerConfigurationError {
    pub fn new(controller: impl Into<String>, errors: Vec<ConfigurationError>) -> Self {
        Self {
            controller: controller.into(),
            errors,
        }
    }
}

impl fmt::Display for ControllerConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} configuration error(s) in controller {}:",
            self.errors.len(),
            self.controller
        )?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

/// 跨控制器聚合的配置错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct RouterConfigurationError {
    pub controllers: Vec<ControllerConfigurationError>,
}

impl RouterConfigurationError {
    /// 所有控制器的配置问题
    pub fn errors(&self) -> impl Iterator<Item = &ConfigurationError> {
        self.controllers.iter().flat_map(|c| c.errors.iter())
    }
}

impl fmt::Display for RouterConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to configure {} controller(s)", self.controllers.len())?;
        for controller in &self.controllers {
            write!(f, "\n{controller}")?;
        }
        Ok(())
    }
}
