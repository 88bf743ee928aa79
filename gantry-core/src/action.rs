//! 控制器动作
//!
//! [`ActionSpec`] 是声明：HTTP 方法、路径模板、参数与返回值映射、角色要求和调用器。
//! 注册时由 [`ControllerAction::build`] 一次性解析模板、构造全部映射器，之后不可变。

use http::Method;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{ConfigurationError, HttpActionError};
use crate::exchange::HttpExchange;
use crate::mapping::{
    Arguments, HttpParameterMapper, HttpReturnMapper, MapperRegistry, ParameterContext,
    ParameterSpec, ReturnContext, ReturnSpec, ReturnValue,
};
use crate::router::DispatchPhase;
use crate::template::PathTemplate;

/// 调用控制器方法
pub type Invoker = Arc<dyn Fn(Arguments) -> anyhow::Result<ReturnValue> + Send + Sync>;

/// 动作声明
pub struct ActionSpec {
    name: String,
    method: Method,
    path: String,
    parameters: Vec<ParameterSpec>,
    returns: ReturnSpec,
    required_role: Option<String>,
    invoker: Option<Invoker>,
}

impl ActionSpec {
    pub fn new(method: Method, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            parameters: Vec::new(),
            returns: ReturnSpec::default(),
            required_role: None,
            invoker: None,
        }
    }

    pub fn get(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Method::GET, path, name)
    }

    pub fn post(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Method::POST, path, name)
    }

    pub fn put(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Method::PUT, path, name)
    }

    pub fn delete(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, name)
    }

    pub fn patch(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path, name)
    }

    /// 追加一个形参，顺序即调用顺序
    pub fn parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn returns(mut self, returns: ReturnSpec) -> Self {
        self.returns = returns;
        self
    }

    pub fn requires_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    pub fn invoker<F>(mut self, invoker: F) -> Self
    where
        F: Fn(Arguments) -> anyhow::Result<ReturnValue> + Send + Sync + 'static,
    {
        self.invoker = Some(Arc::new(invoker));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .field("required_role", &self.required_role)
            .field("has_invoker", &self.invoker.is_some())
            .finish()
    }
}

struct BoundParameter {
    type_name: &'static str,
    mapper: Arc<dyn HttpParameterMapper>,
}

/// 注册完成的动作
pub struct ControllerAction {
    name: String,
    method: Method,
    template: PathTemplate,
    parameters: Vec<BoundParameter>,
    return_type: &'static str,
    return_mapper: Arc<dyn HttpReturnMapper>,
    required_role: Option<String>,
    invoker: Invoker,
}

impl ControllerAction {
    /// 构造动作，收集全部配置问题
    pub fn build(
        spec: ActionSpec,
        registry: &MapperRegistry,
    ) -> Result<Self, Vec<ConfigurationError>> {
        let ActionSpec {
            name,
            method,
            path,
            parameters,
            returns,
            required_role,
            invoker,
        } = spec;

        let mut errors = Vec::new();

        if invoker.is_none() {
            errors.push(ConfigurationError::MissingInvoker {
                action: name.clone(),
            });
        }
        if matches!(&required_role, Some(role) if role.trim().is_empty()) {
            errors.push(ConfigurationError::InvalidMapping {
                action: name.clone(),
                message: "required role must not be empty".to_string(),
            });
        }

        let template = match PathTemplate::parse(&path) {
            Ok(template) => template,
            Err(e) => {
                errors.push(ConfigurationError::InvalidTemplate {
                    action: name.clone(),
                    template: path,
                    message: e.to_string(),
                });
                return Err(errors);
            }
        };

        let mut referenced = HashSet::new();
        let mut bound = Vec::with_capacity(parameters.len());
        for (index, parameter) in parameters.iter().enumerate() {
            let context = ParameterContext {
                action: &name,
                template: &template,
                index,
                type_name: parameter.type_name(),
            };
            match bind_parameter(parameter, &context, registry, &mut referenced) {
                Ok(mapper) => bound.push(BoundParameter {
                    type_name: parameter.type_name(),
                    mapper,
                }),
                Err(error) => errors.push(error),
            }
        }

        for unbound in template.parameter_names().filter(|n| !referenced.contains(*n)) {
            tracing::warn!(
                action = %name,
                template = %template,
                parameter = unbound,
                "Path parameter is not bound to any argument"
            );
        }

        let context = ReturnContext {
            action: &name,
            template: &template,
            type_name: returns.type_name(),
        };
        let return_mapper = match bind_return(&returns, &context, registry) {
            Ok(mapper) => Some(mapper),
            Err(error) => {
                errors.push(error);
                None
            }
        };

        match (invoker, return_mapper) {
            (Some(invoker), Some(return_mapper)) if errors.is_empty() => Ok(Self {
                name,
                method,
                template,
                parameters: bound,
                return_type: returns.type_name(),
                return_mapper,
                required_role,
                invoker,
            }),
            _ => Err(errors),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn required_role(&self) -> Option<&str> {
        self.required_role.as_deref()
    }

    pub fn required_query_param(&self) -> Option<&str> {
        self.template.required_query_param()
    }

    /// 相同方法、相同段形状、相同的必需查询参数
    pub fn conflicts_with(&self, other: &ControllerAction) -> bool {
        self.method == other.method
            && self.template.same_shape(&other.template)
            && self.required_query_param() == other.required_query_param()
    }

    pub fn matches_required_query_param(&self, exchange: &dyn HttpExchange) -> bool {
        match self.required_query_param() {
            Some(name) => exchange.has_parameter(name),
            None => true,
        }
    }

    /// 授权、绑定参数、调用方法、执行完成回调、映射返回值
    pub(crate) fn invoke(
        &self,
        exchange: &mut dyn HttpExchange,
        path_parameters: HashMap<String, String>,
        phase: &mut DispatchPhase,
    ) -> Result<(), HttpActionError> {
        *phase = DispatchPhase::Authorizing;
        self.authorize(exchange)?;

        *phase = DispatchPhase::BindingArgs;
        exchange.set_path_parameters(path_parameters);

        let mut values: Vec<(Box<dyn Any + Send>, &'static str)> =
            Vec::with_capacity(self.parameters.len());
        let mut hooks = Vec::new();
        for (index, parameter) in self.parameters.iter().enumerate() {
            let argument = parameter
                .mapper
                .apply(exchange)
                .map_err(|e| e.for_argument(&self.name, index, parameter.type_name))?;
            let (value, type_name, completion) = argument.into_parts();
            values.push((value, type_name));
            hooks.extend(completion);
        }

        *phase = DispatchPhase::Invoking;
        let arguments = Arguments::new(&self.name, values);
        let invoker = &self.invoker;
        let value = match guard(|| invoker(arguments)) {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => return Err(self.method_failure(error)),
            Err(panic) => {
                tracing::debug!(action = %self.name, panic = %panic, "Action panicked");
                return Err(HttpActionError::internal(format!("{} panicked: {}", self.name, panic)));
            }
        };

        for hook in hooks {
            hook(exchange)?;
        }

        *phase = DispatchPhase::MappingReturn;
        let return_mapper = &self.return_mapper;
        match guard(|| return_mapper.accept(value, exchange)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                tracing::debug!(
                    action = %self.name,
                    return_type = self.return_type,
                    error = %format!("{error:#}"),
                    "Failed to map return value"
                );
                Err(HttpActionError::internal(format!("{error:#}")))
            }
            Err(panic) => {
                tracing::debug!(action = %self.name, panic = %panic, "Return mapper panicked");
                Err(HttpActionError::internal(panic))
            }
        }
    }

    fn authorize(&self, exchange: &dyn HttpExchange) -> Result<(), HttpActionError> {
        let Some(role) = &self.required_role else {
            return Ok(());
        };
        if !exchange.is_user_logged_in() {
            return Err(HttpActionError::not_logged_in());
        }
        if !exchange.is_user_in_role(role) {
            return Err(HttpActionError::forbidden(format!(
                "User must have role '{role}'"
            )));
        }
        Ok(())
    }

    fn method_failure(&self, error: anyhow::Error) -> HttpActionError {
        match error.downcast::<HttpActionError>() {
            Ok(action_error) => action_error,
            Err(error) => {
                tracing::debug!(
                    action = %self.name,
                    error = %format!("{error:#}"),
                    "Action failed"
                );
                HttpActionError::internal(format!("{error:#}"))
            }
        }
    }
}

impl fmt::Display for ControllerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.method, self.template, self.name)
    }
}

impl fmt::Debug for ControllerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerAction")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("template", &self.template.source())
            .field("parameters", &self.parameters.iter().map(|p| p.type_name).collect::<Vec<_>>())
            .field("return_type", &self.return_type)
            .field("required_role", &self.required_role)
            .finish()
    }
}

fn bind_parameter(
    parameter: &ParameterSpec,
    context: &ParameterContext<'_>,
    registry: &MapperRegistry,
    referenced: &mut HashSet<String>,
) -> Result<Arc<dyn HttpParameterMapper>, ConfigurationError> {
    let Some(mapping) = parameter.mapping() else {
        return registry
            .parameter_mapper(parameter.type_id())
            .ok_or_else(|| ConfigurationError::UnmappedParameter {
                action: context.action.to_string(),
                index: context.index,
                type_name: context.type_name.to_string(),
            });
    };

    if matches!(mapping.argument_type(), Some(produced) if produced != parameter.type_id()) {
        return Err(context.error("mapping produces a different type than the parameter"));
    }

    if let Some(name) = mapping.path_parameter() {
        if !context.template.has_parameter(name) {
            return Err(ConfigurationError::UnknownPathParameter {
                action: context.action.to_string(),
                index: context.index,
                name: name.to_string(),
                template: context.template.source().to_string(),
            });
        }
        referenced.insert(name.to_string());
    }

    mapping.create(context).map(Arc::from)
}

fn bind_return(
    returns: &ReturnSpec,
    context: &ReturnContext<'_>,
    registry: &MapperRegistry,
) -> Result<Arc<dyn HttpReturnMapper>, ConfigurationError> {
    let Some(mapping) = returns.mapping() else {
        return registry
            .return_mapper(returns.type_id())
            .ok_or_else(|| ConfigurationError::UnmappedReturnType {
                action: context.action.to_string(),
                type_name: context.type_name.to_string(),
            });
    };

    if matches!(mapping.value_type(), Some(produced) if produced != returns.type_id()) {
        return Err(ConfigurationError::InvalidMapping {
            action: context.action.to_string(),
            message: format!("return mapping does not accept {}", context.type_name),
        });
    }

    mapping.create(context).map(Arc::from)
}

/// 捕获 panic，返回 panic 消息
fn guard<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}
