//! 内置参数映射

use std::any::TypeId;
use std::fmt;
use std::io::Read;
use std::marker::PhantomData;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use super::{
    Argument, ConversionError, FromParameter, HttpParameterMapper, ParameterContext,
    ParameterMapping,
};
use crate::error::{ConfigurationError, HttpActionError};
use crate::exchange::{HttpExchange, ResponseCookie, UserPrincipal};

/// 取值来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueSource {
    Path,
    Query,
    Header,
    Cookie,
}

impl ValueSource {
    fn describe(&self) -> &'static str {
        match self {
            ValueSource::Path => "path parameter",
            ValueSource::Query => "request parameter",
            ValueSource::Header => "header",
            ValueSource::Cookie => "cookie",
        }
    }

    fn values(&self, exchange: &dyn HttpExchange, name: &str) -> Vec<String> {
        match self {
            ValueSource::Path => exchange
                .path_parameter(name)
                .map(|value| vec![value.to_string()])
                .unwrap_or_default(),
            ValueSource::Query => exchange.parameters(name),
            ValueSource::Header => exchange.headers(name),
            ValueSource::Cookie => exchange.cookies(name),
        }
    }
}

/// 按名称读取字符串取值并转换
struct ValueMapper<T> {
    source: ValueSource,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromParameter> ValueMapper<T> {
    fn boxed(source: ValueSource, name: &str) -> Box<dyn HttpParameterMapper> {
        Box::new(Self {
            source,
            name: name.to_string(),
            _marker: PhantomData,
        })
    }
}

impl<T: FromParameter> HttpParameterMapper for ValueMapper<T> {
    fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError> {
        let values = self.source.values(exchange, &self.name);
        let kind = self.source.describe();

        match T::from_parameter(values) {
            Ok(value) => Ok(Argument::new(value)),
            Err(ConversionError::Missing) => Err(HttpActionError::bad_request(format!(
                "Missing required {} '{}'",
                kind, self.name
            ))),
            Err(e) => Err(HttpActionError::bad_request(format!(
                "Invalid {} '{}': {}",
                kind, self.name, e
            ))),
        }
    }
}

fn check_name(context: &ParameterContext<'_>, name: &str) -> Result<(), ConfigurationError> {
    if name.is_empty() {
        return Err(context.error("name must not be empty"));
    }
    Ok(())
}

/// 路径参数，名称必须在模板中声明
pub struct PathParam<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PathParam<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for PathParam<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathParam").field(&self.name).finish()
    }
}

impl<T: FromParameter> ParameterMapping for PathParam<T> {
    fn create(
        &self,
        context: &ParameterContext<'_>,
    ) -> Result<Box<dyn HttpParameterMapper>, ConfigurationError> {
        check_name(context, &self.name)?;
        Ok(ValueMapper::<T>::boxed(ValueSource::Path, &self.name))
    }

    fn path_parameter(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn argument_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }
}

macro_rules! named_value_mapping {
    ($(#[$doc:meta])* $mapping:ident => $source:expr) => {
        $(#[$doc])*
        pub struct $mapping<T> {
            name: String,
            _marker: PhantomData<fn() -> T>,
        }

        impl<T> $mapping<T> {
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    name: name.into(),
                    _marker: PhantomData,
                }
            }
        }

        impl<T> fmt::Debug for $mapping<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($mapping)).field(&self.name).finish()
            }
        }

        impl<T: FromParameter> ParameterMapping for $mapping<T> {
            fn create(
                &self,
                context: &ParameterContext<'_>,
            ) -> Result<Box<dyn HttpParameterMapper>, ConfigurationError> {
                check_name(context, &self.name)?;
                Ok(ValueMapper::<T>::boxed($source, &self.name))
            }

            fn argument_type(&self) -> Option<TypeId> {
                Some(TypeId::of::<T>())
            }
        }
    };
}

named_value_mapping!(
    /// 查询参数
    RequestParam => ValueSource::Query
);

named_value_mapping!(
    /// 请求头
    HttpHeader => ValueSource::Header
);

named_value_mapping!(
    /// 请求 Cookie
    Cookie => ValueSource::Cookie
);

// ============================================================================
// 可变 Cookie
// ============================================================================

/// 可由方法修改的 Cookie 值
///
/// 方法返回后，若值发生变化，新的值会写入 `Set-Cookie`；置为 `None` 则让浏览器删除它。
#[derive(Clone, Default)]
pub struct CookieCell {
    value: Arc<Mutex<Option<String>>>,
}

impl CookieCell {
    pub fn new(value: Option<String>) -> Self {
        Self {
            value: Arc::new(Mutex::new(value)),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.value.lock().clone()
    }

    pub fn set(&self, value: impl Into<String>) {
        *self.value.lock() = Some(value.into());
    }

    pub fn clear(&self) {
        *self.value.lock() = None;
    }
}

impl fmt::Debug for CookieCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CookieCell").field(&self.get()).finish()
    }
}

/// [`CookieCell`] 的映射
#[derive(Debug, Clone)]
pub struct CookieCellMapping {
    name: String,
    secure: bool,
    http_only: bool,
    max_age: Option<i64>,
}

impl CookieCellMapping {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secure: false,
            http_only: true,
            max_age: None,
        }
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }
}

impl ParameterMapping for CookieCellMapping {
    fn create(
        &self,
        context: &ParameterContext<'_>,
    ) -> Result<Box<dyn HttpParameterMapper>, ConfigurationError> {
        check_name(context, &self.name)?;
        Ok(Box::new(self.clone()))
    }

    fn argument_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<CookieCell>())
    }
}

impl HttpParameterMapper for CookieCellMapping {
    fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError> {
        let initial = exchange.cookies(&self.name).into_iter().next();
        let cell = CookieCell::new(initial.clone());
        let observed = cell.clone();
        let settings = self.clone();

        Ok(Argument::new(cell).on_complete(move |exchange| {
            let current = observed.get();
            if current == initial {
                return Ok(());
            }

            let path = match exchange.context_path() {
                "" => "/".to_string(),
                context_path => context_path.to_string(),
            };
            let cookie = match current {
                Some(value) => {
                    let cookie = ResponseCookie::new(&settings.name, value)
                        .path(path)
                        .secure(settings.secure)
                        .http_only(settings.http_only);
                    match settings.max_age {
                        Some(seconds) => cookie.max_age(seconds),
                        None => cookie,
                    }
                }
                None => ResponseCookie::expired(&settings.name).path(path),
            };
            exchange.set_cookie(&cookie);
            Ok(())
        }))
    }
}

// ============================================================================
// 请求体
// ============================================================================

/// JSON 请求体
pub struct JsonBody<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonBody<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonBody<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + 'static> ParameterMapping for JsonBody<T> {
    fn create(
        &self,
        _context: &ParameterContext<'_>,
    ) -> Result<Box<dyn HttpParameterMapper>, ConfigurationError> {
        Ok(Box::new(JsonBody::<T>::new()))
    }

    fn argument_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }
}

impl<T: DeserializeOwned + Send + 'static> HttpParameterMapper for JsonBody<T> {
    fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError> {
        let reader = exchange
            .body()
            .map_err(|e| {
                HttpActionError::bad_request(format!("Failed to read request body: {e}"))
            })?;
        let value: T = serde_json::from_reader(reader)
            .map_err(|e| HttpActionError::bad_request(format!("Invalid JSON body: {e}")))?;
        Ok(Argument::new(value))
    }
}

/// 原始文本请求体
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBody;

impl ParameterMapping for RequestBody {
    fn create(
        &self,
        _context: &ParameterContext<'_>,
    ) -> Result<Box<dyn HttpParameterMapper>, ConfigurationError> {
        Ok(Box::new(RequestBody))
    }

    fn argument_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<String>())
    }
}

impl HttpParameterMapper for RequestBody {
    fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError> {
        let mut body = String::new();
        exchange
            .body()
            .and_then(|mut reader| reader.read_to_string(&mut body))
            .map_err(|e| {
                HttpActionError::bad_request(format!("Failed to read request body: {e}"))
            })?;
        Ok(Argument::new(body))
    }
}

// ============================================================================
// 按类型注册的默认映射
// ============================================================================

/// 客户端 IP 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddress(pub Option<IpAddr>);

pub(super) struct PrincipalMapper;

impl HttpParameterMapper for PrincipalMapper {
    fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError> {
        exchange
            .user_principal()
            .cloned()
            .map(Argument::new)
            .ok_or_else(HttpActionError::not_logged_in)
    }
}

pub(super) struct OptionalPrincipalMapper;

impl HttpParameterMapper for OptionalPrincipalMapper {
    fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError> {
        Ok(Argument::new::<Option<UserPrincipal>>(
            exchange.user_principal().cloned(),
        ))
    }
}

pub(super) struct ClientAddressMapper;

impl HttpParameterMapper for ClientAddressMapper {
    fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError> {
        Ok(Argument::new(ClientAddress(exchange.client_ip())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::BufferedExchange;
    use crate::mapping::Arguments;
    use crate::template::PathTemplate;
    use bytes::Bytes;
    use http::{Method, Request};
    use std::collections::HashMap;

    fn create(mapping: &dyn ParameterMapping) -> Box<dyn HttpParameterMapper> {
        let template = PathTemplate::parse("/items/{id}").unwrap();
        let context = ParameterContext {
            action: "Items::get",
            template: &template,
            index: 0,
            type_name: "test",
        };
        mapping.create(&context).unwrap()
    }

    fn value<T: 'static>(argument: Argument) -> T {
        let (value, type_name, _) = argument.into_parts();
        Arguments::new("Items::get", vec![(value, type_name)])
            .take::<T>(0)
            .unwrap()
    }

    fn exchange(uri: &str) -> BufferedExchange {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("x-tenant", "acme")
            .header("cookie", "session=abc")
            .body(Bytes::new())
            .unwrap();
        BufferedExchange::new(request)
    }

    #[test]
    fn test_path_param() {
        let mut exchange = exchange("/items/42");
        exchange.set_path_parameters(HashMap::from([("id".to_string(), "42".to_string())]));

        let mapper = create(&PathParam::<u64>::new("id"));
        assert_eq!(value::<u64>(mapper.apply(&mut exchange).unwrap()), 42);
    }

    #[test]
    fn test_request_param_errors_are_bad_request() {
        let mut exchange = exchange("/items?limit=ten");

        let error = create(&RequestParam::<u32>::new("limit"))
            .apply(&mut exchange)
            .unwrap_err();
        assert_eq!(error.status_code(), http::StatusCode::BAD_REQUEST);
        assert!(error.client_message().starts_with("Invalid request parameter 'limit'"));

        let error = create(&RequestParam::<u32>::new("offset"))
            .apply(&mut exchange)
            .unwrap_err();
        assert_eq!(error.client_message(), "Missing required request parameter 'offset'");

        let argument = create(&RequestParam::<Option<u32>>::new("offset"))
            .apply(&mut exchange)
            .unwrap();
        assert_eq!(value::<Option<u32>>(argument), None);
    }

    #[test]
    fn test_header_and_cookie() {
        let mut exchange = exchange("/items");

        let tenant = create(&HttpHeader::<String>::new("x-tenant"))
            .apply(&mut exchange)
            .unwrap();
        assert_eq!(value::<String>(tenant), "acme");

        let session = create(&Cookie::<String>::new("session"))
            .apply(&mut exchange)
            .unwrap();
        assert_eq!(value::<String>(session), "abc");
    }

    #[test]
    fn test_cookie_cell_writes_changes_back() {
        let mut exchange = exchange("/items");

        let argument = create(&CookieCellMapping::new("session"))
            .apply(&mut exchange)
            .unwrap();
        let (value, _, completion) = argument.into_parts();
        let cell = value.downcast::<CookieCell>().unwrap();
        assert_eq!(cell.get().as_deref(), Some("abc"));

        cell.set("xyz");
        completion.unwrap()(&mut exchange).unwrap();
        assert_eq!(
            exchange.response_header("set-cookie"),
            Some("session=xyz; Path=/; HttpOnly")
        );
    }

    #[test]
    fn test_cookie_cell_cleared_expires_cookie() {
        let mut exchange = exchange("/items");

        let argument = create(&CookieCellMapping::new("session"))
            .apply(&mut exchange)
            .unwrap();
        let (value, _, completion) = argument.into_parts();
        value.downcast::<CookieCell>().unwrap().clear();

        completion.unwrap()(&mut exchange).unwrap();
        assert_eq!(
            exchange.response_header("set-cookie"),
            Some("session=; Path=/; Max-Age=0")
        );
    }

    #[test]
    fn test_unchanged_cookie_cell_writes_nothing() {
        let mut exchange = exchange("/items");
        let argument = create(&CookieCellMapping::new("session"))
            .apply(&mut exchange)
            .unwrap();
        let (_, _, completion) = argument.into_parts();

        completion.unwrap()(&mut exchange).unwrap();
        assert!(exchange.response_header("set-cookie").is_none());
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Item {
            name: String,
        }

        let request = Request::builder()
            .method(Method::POST)
            .uri("/items")
            .body(Bytes::from_static(br#"{"name":"lamp"}"#))
            .unwrap();
        let mut exchange = BufferedExchange::new(request);

        let argument = create(&JsonBody::<Item>::new()).apply(&mut exchange).unwrap();
        assert_eq!(value::<Item>(argument), Item { name: "lamp".to_string() });

        let request = Request::builder()
            .method(Method::POST)
            .uri("/items")
            .body(Bytes::from_static(b"{"))
            .unwrap();
        let mut exchange = BufferedExchange::new(request);
        let error = create(&JsonBody::<Item>::new()).apply(&mut exchange).unwrap_err();
        assert_eq!(error.status_code(), http::StatusCode::BAD_REQUEST);
    }
}
