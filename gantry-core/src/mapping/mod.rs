//! 参数/返回值映射契约
//!
//! 每个控制器方法的每个参数都对应一个 [`HttpParameterMapper`]，返回值对应一个
//! [`HttpReturnMapper`]。映射器在注册阶段由 [`ParameterMapping`] / [`ReturnMapping`]
//! 一次性构造，请求阶段只通过 trait 对象调用，不再做任何类型探测。
//!
//! 参数没有显式声明映射时，使用 [`MapperRegistry`] 中按类型注册的默认映射。

mod convert;
mod params;
mod registry;
mod returns;

pub use convert::{ConversionError, FromParameter};
pub use params::{
    ClientAddress, Cookie, CookieCell, CookieCellMapping, HttpHeader, JsonBody, PathParam,
    RequestBody, RequestParam,
};
pub use registry::MapperRegistry;
pub use returns::{ContentBody, Json, SendRedirect};

use std::any::{type_name, Any, TypeId};
use std::fmt;

use crate::error::{ConfigurationError, HttpActionError};
use crate::exchange::HttpExchange;
use crate::template::PathTemplate;

/// 调用完成后执行的回调
pub type CompletionHook =
    Box<dyn FnOnce(&mut dyn HttpExchange) -> Result<(), HttpActionError> + Send>;

/// 参数映射器产生的一个实参
pub struct Argument {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
    completion: Option<CompletionHook>,
}

impl Argument {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
            completion: None,
        }
    }

    /// 方法成功返回后、返回值映射前执行的回调
    ///
    /// 用于观察方法对可变参数的修改，例如把 [`CookieCell`] 的新值写回响应。
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut dyn HttpExchange) -> Result<(), HttpActionError> + Send + 'static,
    {
        self.completion = Some(Box::new(hook));
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn into_parts(self) -> (Box<dyn Any + Send>, &'static str, Option<CompletionHook>) {
        (self.value, self.type_name, self.completion)
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("type_name", &self.type_name)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

/// 传给调用器的实参列表，按声明顺序取出
pub struct Arguments {
    action: String,
    values: Vec<Option<(Box<dyn Any + Send>, &'static str)>>,
}

impl Arguments {
    pub(crate) fn new(action: &str, values: Vec<(Box<dyn Any + Send>, &'static str)>) -> Self {
        Self {
            action: action.to_string(),
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 取出第 `index` 个实参
    pub fn take<T: Any>(&mut self, index: usize) -> anyhow::Result<T> {
        let (value, actual) = self
            .values
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| {
                anyhow::anyhow!("{}: argument #{} is not available", self.action, index)
            })?;

        value.downcast::<T>().map(|value| *value).map_err(|_| {
            anyhow::anyhow!(
                "{}: argument #{} is {} but {} was expected",
                self.action,
                index,
                actual,
                type_name::<T>()
            )
        })
    }
}

/// 控制器方法的返回值
pub struct ReturnValue {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl ReturnValue {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<T: Any>(self) -> anyhow::Result<T> {
        let actual = self.type_name;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| {
                anyhow::anyhow!(
                    "return value is {} but {} was expected",
                    actual,
                    type_name::<T>()
                )
            })
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnValue")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// 从 exchange 中提取一个实参
pub trait HttpParameterMapper: Send + Sync {
    fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError>;
}

/// 把返回值写入 exchange
///
/// 任何错误都会被路由器记录并转换为 500。
pub trait HttpReturnMapper: Send + Sync {
    fn accept(&self, value: ReturnValue, exchange: &mut dyn HttpExchange) -> anyhow::Result<()>;
}

/// 构造参数映射器时可用的信息
#[derive(Debug)]
pub struct ParameterContext<'a> {
    pub action: &'a str,
    pub template: &'a PathTemplate,
    pub index: usize,
    pub type_name: &'static str,
}

impl ParameterContext<'_> {
    pub fn error(&self, message: impl fmt::Display) -> ConfigurationError {
        ConfigurationError::InvalidMapping {
            action: self.action.to_string(),
            message: format!("parameter #{} of type {}: {}", self.index, self.type_name, message),
        }
    }
}

/// 参数映射声明，注册阶段用于构造 [`HttpParameterMapper`]
pub trait ParameterMapping: Send + Sync {
    fn create(
        &self,
        context: &ParameterContext<'_>,
    ) -> Result<Box<dyn HttpParameterMapper>, ConfigurationError>;

    /// 引用的路径参数名，用于和模板做一致性检查
    fn path_parameter(&self) -> Option<&str> {
        None
    }

    /// 产生的实参类型，若已知则在注册时与形参类型比对
    fn argument_type(&self) -> Option<TypeId> {
        None
    }
}

/// 构造返回值映射器时可用的信息
#[derive(Debug)]
pub struct ReturnContext<'a> {
    pub action: &'a str,
    pub template: &'a PathTemplate,
    pub type_name: &'static str,
}

/// 返回值映射声明
pub trait ReturnMapping: Send + Sync {
    fn create(
        &self,
        context: &ReturnContext<'_>,
    ) -> Result<Box<dyn HttpReturnMapper>, ConfigurationError>;

    fn value_type(&self) -> Option<TypeId> {
        None
    }
}

/// 一个形参的声明
pub struct ParameterSpec {
    type_id: TypeId,
    type_name: &'static str,
    mapping: Option<Box<dyn ParameterMapping>>,
}

impl ParameterSpec {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            mapping: None,
        }
    }

    pub fn mapped_by(mut self, mapping: impl ParameterMapping + 'static) -> Self {
        self.mapping = Some(Box::new(mapping));
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn mapping(&self) -> Option<&dyn ParameterMapping> {
        self.mapping.as_deref()
    }
}

impl fmt::Debug for ParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSpec")
            .field("type_name", &self.type_name)
            .field("mapped", &self.mapping.is_some())
            .finish()
    }
}

/// 返回值的声明
pub struct ReturnSpec {
    type_id: TypeId,
    type_name: &'static str,
    mapping: Option<Box<dyn ReturnMapping>>,
}

impl ReturnSpec {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            mapping: None,
        }
    }

    pub fn mapped_by(mut self, mapping: impl ReturnMapping + 'static) -> Self {
        self.mapping = Some(Box::new(mapping));
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn mapping(&self) -> Option<&dyn ReturnMapping> {
        self.mapping.as_deref()
    }
}

impl Default for ReturnSpec {
    fn default() -> Self {
        Self::of::<()>()
    }
}

impl fmt::Debug for ReturnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnSpec")
            .field("type_name", &self.type_name)
            .field("mapped", &self.mapping.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_take_in_any_order() {
        let mut arguments = Arguments::new(
            "Demo::run",
            vec![
                (Box::new(7_u32), type_name::<u32>()),
                (Box::new("x".to_string()), type_name::<String>()),
            ],
        );

        assert_eq!(arguments.take::<String>(1).unwrap(), "x");
        assert_eq!(arguments.take::<u32>(0).unwrap(), 7);
        assert!(arguments.take::<u32>(0).is_err());
    }

    #[test]
    fn test_arguments_type_mismatch() {
        let mut arguments =
            Arguments::new("Demo::run", vec![(Box::new(7_u32), type_name::<u32>())]);
        let error = arguments.take::<String>(0).unwrap_err().to_string();
        assert!(error.contains("argument #0 is u32"));
    }

    #[test]
    fn test_return_value_downcast() {
        let value = ReturnValue::new(vec![1, 2, 3]);
        assert_eq!(value.downcast::<Vec<i32>>().unwrap(), vec![1, 2, 3]);
        assert!(ReturnValue::new(1_u8).downcast::<String>().is_err());
    }
}
