//! # Gantry Web
//!
//! Gantry 控制器分发引擎的 Axum 适配层
//!
//! ## 核心特性
//!
//! - **统一分发** - 所有请求经由 axum fallback 交给 `ActionRouter`
//! - **阻塞池执行** - 分发在 `spawn_blocking` 中同步完成，不占用异步工作线程
//! - **上下文路径** - 按 `server.context-path` 挂载应用
//! - **中间件支持** - 请求日志、请求 ID，以及 tower-http 的 `TraceLayer`

pub mod constants;
pub mod middleware;
pub mod server;

pub use gantry_web_macros::controller;

pub mod prelude {
    //! 预导入模块

    pub use crate::middleware::*;
    pub use crate::server::*;
    pub use gantry_core::prelude::*;
    pub use gantry_web_macros::controller;

    pub use axum;
    pub use axum::Router;
}
