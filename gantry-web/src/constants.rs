//! 配置键名称

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 应用挂载的上下文路径，例如 `/api`
pub const SERVER_CONTEXT_PATH: &str = "server.context-path";

/// 请求体大小上限（字节）
pub const SERVER_MAX_BODY_SIZE: &str = "server.max-body-size";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

// ==================== 默认值 ====================

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 8080;

pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// 请求 ID 头
pub const REQUEST_ID_HEADER: &str = "x-request-id";
