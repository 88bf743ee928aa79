// gantry-core: 控制器分发核心
//
// 把控制器方法声明为动作，按 HTTP 方法 + 路径模板分发请求：
// - 路径模板解析（命名参数、后缀参数、必需查询参数）
// - 每个 HTTP 方法一棵路由树，常量段优先
// - 参数/返回值映射器在注册时构造，请求时只做 trait 调用
// - 传输层通过 HttpExchange 接入，核心本身同步、无线程

pub mod action;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod exchange;
pub mod logging;
pub mod mapping;
pub mod render;
pub mod response;
pub mod route_map;
pub mod router;
pub mod template;

// 重新导出常用类型
pub use action::{ActionSpec, ControllerAction, Invoker};
pub use client::{ClientRequest, ClientResponse, HttpClientError};
pub use config::{
    ConfigError, ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource,
    PropertySource, TomlPropertySource,
};
pub use controller::Controller;
pub use error::{
    ConfigurationError, ControllerConfigurationError, HttpActionError, Result,
    RouterConfigurationError,
};
pub use exchange::{BufferedExchange, HttpExchange, ResponseCookie, UserPrincipal};
pub use logging::{LogFormat, LoggingConfig};
pub use mapping::{
    Argument, Arguments, HttpParameterMapper, HttpReturnMapper, MapperRegistry, ParameterMapping,
    ParameterSpec, ReturnMapping, ReturnSpec, ReturnValue,
};
pub use response::HttpResponse;
pub use router::{ActionRouter, DispatchPhase, RouterBuilder};
pub use template::PathTemplate;

// 导出 anyhow 和 http，供宏生成的代码使用
pub use anyhow;
pub use http;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::action::ActionSpec;
    pub use crate::config::{Environment, MapPropertySource, TomlPropertySource};
    pub use crate::controller::Controller;
    pub use crate::error::{HttpActionError, Result};
    pub use crate::exchange::{BufferedExchange, HttpExchange, ResponseCookie, UserPrincipal};
    pub use crate::logging::LoggingConfig;
    pub use crate::mapping::{
        ClientAddress, ContentBody, Cookie, CookieCell, CookieCellMapping, HttpHeader, Json,
        JsonBody, MapperRegistry, ParameterSpec, PathParam, RequestBody, RequestParam,
        ReturnSpec, ReturnValue, SendRedirect,
    };
    pub use crate::response::HttpResponse;
    pub use crate::router::{ActionRouter, RouterBuilder};
    pub use anyhow::{anyhow, Context};
}
