//! 内置返回值映射

use std::any::TypeId;
use std::fmt::{self, Display};
use std::io::Write;
use std::marker::PhantomData;

use serde::Serialize;

use super::{HttpReturnMapper, ReturnContext, ReturnMapping, ReturnValue};
use crate::error::ConfigurationError;
use crate::exchange::HttpExchange;
use crate::response::HttpResponse;

/// 以 JSON 输出返回值
pub struct Json<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Json<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Json")
    }
}

impl<T: Serialize + 'static> ReturnMapping for Json<T> {
    fn create(
        &self,
        _context: &ReturnContext<'_>,
    ) -> Result<Box<dyn HttpReturnMapper>, ConfigurationError> {
        Ok(Box::new(Json::<T>::new()))
    }

    fn value_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }
}

impl<T: Serialize + 'static> HttpReturnMapper for Json<T> {
    fn accept(&self, value: ReturnValue, exchange: &mut dyn HttpExchange) -> anyhow::Result<()> {
        let value = value.downcast::<T>()?;
        let body = serde_json::to_vec(&value)?;
        exchange.write("application/json", &mut |out: &mut dyn Write| out.write_all(&body))?;
        Ok(())
    }
}

/// 以 `Display` 文本输出返回值，可指定 Content-Type
pub struct ContentBody<T> {
    content_type: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContentBody<T> {
    pub fn new() -> Self {
        Self::with_content_type("text/plain; charset=utf-8")
    }

    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ContentBody<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ContentBody<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentBody").field(&self.content_type).finish()
    }
}

impl<T: Display + 'static> ReturnMapping for ContentBody<T> {
    fn create(
        &self,
        context: &ReturnContext<'_>,
    ) -> Result<Box<dyn HttpReturnMapper>, ConfigurationError> {
        if self.content_type.trim().is_empty() {
            return Err(ConfigurationError::InvalidMapping {
                action: context.action.to_string(),
                message: "content type must not be empty".to_string(),
            });
        }
        Ok(Box::new(ContentBody::<T>::with_content_type(&self.content_type)))
    }

    fn value_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }
}

impl<T: Display + 'static> HttpReturnMapper for ContentBody<T> {
    fn accept(&self, value: ReturnValue, exchange: &mut dyn HttpExchange) -> anyhow::Result<()> {
        let text = value.downcast::<T>()?.to_string();
        exchange.write(&self.content_type, &mut |out: &mut dyn Write| {
            out.write_all(text.as_bytes())
        })?;
        Ok(())
    }
}

/// 把返回值作为重定向地址
///
/// 以 `/` 开头的地址会加上上下文路径。
pub struct SendRedirect<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SendRedirect<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SendRedirect<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SendRedirect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendRedirect")
    }
}

impl<T: Display + 'static> ReturnMapping for SendRedirect<T> {
    fn create(
        &self,
        _context: &ReturnContext<'_>,
    ) -> Result<Box<dyn HttpReturnMapper>, ConfigurationError> {
        Ok(Box::new(SendRedirect::<T>::new()))
    }

    fn value_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }
}

impl<T: Display + 'static> HttpReturnMapper for SendRedirect<T> {
    fn accept(&self, value: ReturnValue, exchange: &mut dyn HttpExchange) -> anyhow::Result<()> {
        let target = value.downcast::<T>()?.to_string();
        let location = if target.starts_with('/') {
            format!("{}{}", exchange.context_path(), target)
        } else {
            target
        };
        exchange.send_redirect(&location)?;
        Ok(())
    }
}

/// `()` 返回值：不写响应体
pub(super) struct UnitMapper;

impl HttpReturnMapper for UnitMapper {
    fn accept(&self, value: ReturnValue, _exchange: &mut dyn HttpExchange) -> anyhow::Result<()> {
        value.downcast::<()>()
    }
}

pub(super) struct HttpResponseMapper;

impl HttpReturnMapper for HttpResponseMapper {
    fn accept(&self, value: ReturnValue, exchange: &mut dyn HttpExchange) -> anyhow::Result<()> {
        value.downcast::<HttpResponse>()?.write_to(exchange)?;
        Ok(())
    }
}
