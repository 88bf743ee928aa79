//! 动作路由器
//!
//! 启动阶段注册控制器、构建每个 HTTP 方法的路由树；之后只读，
//! 可以在任意多个线程上并发调用 [`ActionRouter::invoke`]。

use http::Method;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::action::{ActionSpec, ControllerAction};
use crate::controller::Controller;
use crate::error::{ControllerConfigurationError, HttpActionError, RouterConfigurationError};
use crate::exchange::HttpExchange;
use crate::mapping::MapperRegistry;
use crate::render;
use crate::route_map::{RouteLookupError, RouteMap};

/// 单次分发所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Routing,
    Authorizing,
    BindingArgs,
    Invoking,
    MappingReturn,
    Done,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchPhase::Routing => "routing",
            DispatchPhase::Authorizing => "authorizing",
            DispatchPhase::BindingArgs => "binding-args",
            DispatchPhase::Invoking => "invoking",
            DispatchPhase::MappingReturn => "mapping-return",
            DispatchPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// 动作路由器
#[derive(Debug, Clone)]
pub struct ActionRouter {
    routes: HashMap<Method, RouteMap>,
    actions: Vec<Arc<ControllerAction>>,
    registry: Arc<MapperRegistry>,
}

impl ActionRouter {
    /// 使用默认映射表
    pub fn new() -> Self {
        Self::with_registry(MapperRegistry::default())
    }

    pub fn with_registry(registry: MapperRegistry) -> Self {
        Self {
            routes: HashMap::new(),
            actions: Vec::new(),
            registry: Arc::new(registry),
        }
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn registry(&self) -> &MapperRegistry {
        &self.registry
    }

    /// 已注册的全部动作，按注册顺序
    pub fn actions(&self) -> &[Arc<ControllerAction>] {
        &self.actions
    }

    /// 注册控制器
    ///
    /// 控制器的全部动作要么都注册成功，要么一个都不注册；
    /// 失败时返回的错误包含该控制器的全部问题。
    pub fn register_controller(
        &mut self,
        controller: Arc<dyn Controller>,
    ) -> Result<(), ControllerConfigurationError> {
        let name = controller.controller_name().to_string();
        let specs = controller.actions();
        self.register_actions(&name, specs)
    }

    /// 注册一组手写的动作
    pub fn register_actions(
        &mut self,
        controller: &str,
        specs: Vec<ActionSpec>,
    ) -> Result<(), ControllerConfigurationError> {
        let mut errors = Vec::new();
        let mut built = Vec::with_capacity(specs.len());

        for spec in specs {
            match ControllerAction::build(spec, &self.registry) {
                Ok(action) => built.push(Arc::new(action)),
                Err(mut problems) => errors.append(&mut problems),
            }
        }

        let mut routes = self.routes.clone();
        for action in &built {
            let map = routes.entry(action.method().clone()).or_default();
            if let Err(error) = map.add(action.clone()) {
                errors.push(error);
            }
        }

        if !errors.is_empty() {
            tracing::error!(
                controller = controller,
                errors = errors.len(),
                "Failed to register controller"
            );
            return Err(ControllerConfigurationError::new(controller, errors));
        }

        for action in &built {
            tracing::info!(controller = controller, route = %action, "Mapped action");
        }
        self.routes = routes;
        self.actions.extend(built);
        Ok(())
    }

    /// 分发请求；任何错误都会渲染到 exchange
    pub fn invoke(&self, exchange: &mut dyn HttpExchange) {
        let mut phase = DispatchPhase::Routing;
        let result = self.dispatch(exchange, &mut phase);

        let Err(error) = result else {
            tracing::debug!(
                method = %exchange.http_method(),
                path = exchange.path_info(),
                "Request dispatched"
            );
            return;
        };

        log_failure(exchange, &error, phase);
        if let Err(e) = render::send_action_error(exchange, &error) {
            tracing::warn!(error = %e, "Failed to write error response");
        }
    }

    /// 分发请求，把错误交给调用方处理
    pub fn try_invoke(&self, exchange: &mut dyn HttpExchange) -> Result<(), HttpActionError> {
        let mut phase = DispatchPhase::Routing;
        self.dispatch(exchange, &mut phase)
    }

    fn dispatch(
        &self,
        exchange: &mut dyn HttpExchange,
        phase: &mut DispatchPhase,
    ) -> Result<(), HttpActionError> {
        let method = exchange.http_method().clone();
        let path = exchange.path_info().to_string();
        let not_found = || HttpActionError::not_found(format!("No action for {method} {path}"));

        let routes = self.routes.get(&method).ok_or_else(not_found)?;
        let segments = split_path(&path);
        let action = match routes.find(&segments, exchange) {
            Ok(action) => action,
            Err(RouteLookupError::NotFound) => return Err(not_found()),
            Err(e @ RouteLookupError::Ambiguous(_)) => {
                return Err(HttpActionError::bad_request(format!("{e} for {method} {path}")))
            }
        };

        tracing::trace!(route = %action, "Matched action");
        let path_parameters = action
            .template()
            .match_segments(&segments)
            .unwrap_or_default();

        action.invoke(exchange, path_parameters, phase)?;
        *phase = DispatchPhase::Done;
        Ok(())
    }
}

impl Default for ActionRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn log_failure(exchange: &dyn HttpExchange, error: &HttpActionError, phase: DispatchPhase) {
    let method = exchange.http_method();
    let path = exchange.path_info();
    match error {
        HttpActionError::Internal { detail } => {
            tracing::error!(%method, path, %phase, detail = %detail, "Request failed")
        }
        HttpActionError::Redirect { location } => {
            tracing::debug!(%method, path, %phase, location = %location, "Redirecting")
        }
        other if other.is_server_error() => {
            tracing::error!(%method, path, %phase, error = %other, "Request failed")
        }
        other => tracing::info!(
            %method,
            path,
            %phase,
            status = other.status_code().as_u16(),
            error = %other,
            "Request rejected"
        ),
    }
}

/// 拆分请求路径：去掉开头的 `/`，逐段百分号解码，忽略结尾的空段
///
/// 根路径得到 `[""]`。
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = path
        .trim_start_matches('/')
        .split('/')
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect();
    while segments.len() > 1 && segments.last().is_some_and(String::is_empty) {
        segments.pop();
    }
    segments
}

/// 一次性注册多个控制器，汇总全部配置问题
#[derive(Default)]
pub struct RouterBuilder {
    registry: Option<MapperRegistry>,
    controllers: Vec<Arc<dyn Controller>>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: MapperRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn controller<C: Controller>(self, controller: C) -> Self {
        self.shared_controller(Arc::new(controller))
    }

    pub fn shared_controller(mut self, controller: Arc<dyn Controller>) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn build(self) -> Result<ActionRouter, RouterConfigurationError> {
        let mut router = ActionRouter::with_registry(self.registry.unwrap_or_default());
        let mut failures = Vec::new();

        for controller in self.controllers {
            if let Err(error) = router.register_controller(controller) {
                failures.push(error);
            }
        }

        if !failures.is_empty() {
            return Err(RouterConfigurationError {
                controllers: failures,
            });
        }

        tracing::info!(actions = router.actions().len(), "Action router ready");
        Ok(router)
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("registry", &self.registry)
            .field(
                "controllers",
                &self
                    .controllers
                    .iter()
                    .map(|c| c.controller_name().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
