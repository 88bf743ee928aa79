//! Web 服务器模块
//!
//! 基于 Axum 的 Web 服务器：路由器挂在 fallback 上，
//! 每个请求在阻塞线程池里同步分发。

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use gantry_core::config::ConfigError;
use gantry_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::constants::*;
use crate::middleware::{request_id, request_logging};

/// Web 服务器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 上下文路径，空字符串表示挂在根路径
    pub context_path: String,

    /// 请求体大小上限（字节）
    pub max_body_size: usize,

    /// 是否启用请求日志
    pub enable_request_logging: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            context_path: String::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            enable_request_logging: true,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Result<Self, ConfigError> {
        let context_path = env.get_string_or(SERVER_CONTEXT_PATH, "");

        Ok(Self {
            host: env.get_string_or(SERVER_HOST, DEFAULT_HOST),
            port: env.get_parsed_or(SERVER_PORT, DEFAULT_PORT)?,
            context_path: normalize_context_path(&context_path),
            max_body_size: env.get_parsed_or(SERVER_MAX_BODY_SIZE, DEFAULT_MAX_BODY_SIZE)?,
            enable_request_logging: env.get_bool_or(SERVER_ENABLE_REQUEST_LOGGING, true),
        })
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `api/` → `/api`，`/` → 空
fn normalize_context_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// 分发所需的共享状态
#[derive(Clone)]
struct DispatchState {
    router: Arc<ActionRouter>,
    context_path: Arc<str>,
    max_body_size: usize,
}

/// Gantry Web 服务器
pub struct GantryWebServer {
    /// 服务器配置
    config: Arc<ServerProperties>,

    /// 动作路由器（只读共享）
    router: Arc<ActionRouter>,
}

impl GantryWebServer {
    pub fn new(config: ServerProperties, router: ActionRouter) -> Self {
        Self {
            config: Arc::new(config),
            router: Arc::new(router),
        }
    }

    pub fn properties(&self) -> &ServerProperties {
        &self.config
    }

    /// 构建 axum 应用
    ///
    /// 调用方可以在返回的 `Router` 上继续叠加 layer，
    /// 例如把认证结果以 `UserPrincipal` 放进请求扩展。
    pub fn app(&self) -> Router {
        let state = DispatchState {
            router: self.router.clone(),
            context_path: Arc::from(self.config.context_path.as_str()),
            max_body_size: self.config.max_body_size,
        };

        let mut app = Router::new().fallback(dispatch).with_state(state);
        if self.config.enable_request_logging {
            app = app.layer(axum::middleware::from_fn(request_logging));
        }
        app.layer(axum::middleware::from_fn(request_id))
            .layer(TraceLayer::new_for_http())
    }

    /// 启动服务器
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.app();
        self.run_with(app).await
    }

    /// 使用自定义的 axum 应用启动服务器
    pub async fn run_with(self, app: Router) -> anyhow::Result<()> {
        let addr = self.config.address();

        for action in self.router.actions() {
            tracing::debug!(route = %action, "Serving action");
        }
        tracing::info!(
            address = %addr,
            context_path = %self.config.context_path,
            actions = self.router.actions().len(),
            "Starting Gantry web server"
        );

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;

        tracing::info!("Server listening on http://{}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

        tracing::info!("Web server shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// 所有请求都经由此处交给路由器
async fn dispatch(State(state): State<DispatchState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let body: Bytes = match to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(
                method = %parts.method,
                uri = %parts.uri,
                error = %e,
                "Failed to read request body"
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "MESSAGE: Request body too large")
                .into_response();
        }
    };

    if let Some(ConnectInfo(addr)) = parts.extensions.remove::<ConnectInfo<SocketAddr>>() {
        parts.extensions.insert(addr);
    }
    let request = http::Request::from_parts(parts, body);

    let router = state.router.clone();
    let context_path = state.context_path.clone();
    let dispatched = tokio::task::spawn_blocking(move || {
        let mut exchange = BufferedExchange::new(request);
        if !context_path.is_empty() {
            exchange = exchange.with_context_path(&context_path);
            if exchange.context_path() != &*context_path {
                let message = format!(
                    "No action for {} {}",
                    exchange.http_method(),
                    exchange.path_info()
                );
                if let Err(e) = exchange.send_error(http::StatusCode::NOT_FOUND, &message) {
                    tracing::warn!(error = %e, "Failed to write error response");
                }
                return exchange.into_response();
            }
        }
        router.invoke(&mut exchange);
        exchange.into_response()
    })
    .await;

    match dispatched {
        Ok(response) => response.map(Body::from),
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
