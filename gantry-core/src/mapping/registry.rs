//! 按类型注册的默认映射

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::params::{ClientAddressMapper, OptionalPrincipalMapper, PrincipalMapper};
use super::returns::{HttpResponseMapper, UnitMapper};
use super::{ClientAddress, HttpParameterMapper, HttpReturnMapper};
use crate::exchange::UserPrincipal;
use crate::response::HttpResponse;

/// 参数/返回值没有显式映射时的后备映射表
///
/// 默认包含：
///
/// - 参数 `UserPrincipal`（未登录时 401）、`Option<UserPrincipal>`、[`ClientAddress`]
/// - 返回值 `()`、[`HttpResponse`]
///
/// 映射器无状态且线程安全，同一个实例在所有动作间共享。
#[derive(Clone)]
pub struct MapperRegistry {
    parameters: HashMap<TypeId, (&'static str, Arc<dyn HttpParameterMapper>)>,
    returns: HashMap<TypeId, (&'static str, Arc<dyn HttpReturnMapper>)>,
}

impl MapperRegistry {
    /// 空映射表
    pub fn empty() -> Self {
        Self {
            parameters: HashMap::new(),
            returns: HashMap::new(),
        }
    }

    pub fn register_parameter<T: Any>(&mut self, mapper: impl HttpParameterMapper + 'static) {
        self.parameters
            .insert(TypeId::of::<T>(), (type_name::<T>(), Arc::new(mapper)));
    }

    pub fn register_return<T: Any>(&mut self, mapper: impl HttpReturnMapper + 'static) {
        self.returns
            .insert(TypeId::of::<T>(), (type_name::<T>(), Arc::new(mapper)));
    }

    pub fn with_parameter<T: Any>(mut self, mapper: impl HttpParameterMapper + 'static) -> Self {
        self.register_parameter::<T>(mapper);
        self
    }

    pub fn with_return<T: Any>(mut self, mapper: impl HttpReturnMapper + 'static) -> Self {
        self.register_return::<T>(mapper);
        self
    }

    pub fn parameter_mapper(&self, type_id: TypeId) -> Option<Arc<dyn HttpParameterMapper>> {
        self.parameters.get(&type_id).map(|(_, mapper)| mapper.clone())
    }

    pub fn return_mapper(&self, type_id: TypeId) -> Option<Arc<dyn HttpReturnMapper>> {
        self.returns.get(&type_id).map(|(_, mapper)| mapper.clone())
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::empty()
            .with_parameter::<UserPrincipal>(PrincipalMapper)
            .with_parameter::<Option<UserPrincipal>>(OptionalPrincipalMapper)
            .with_parameter::<ClientAddress>(ClientAddressMapper)
            .with_return::<()>(UnitMapper)
            .with_return::<HttpResponse>(HttpResponseMapper)
    }
}

impl fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parameters: Vec<_> = self.parameters.values().map(|(name, _)| *name).collect();
        let mut returns: Vec<_> = self.returns.values().map(|(name, _)| *name).collect();
        parameters.sort_unstable();
        returns.sort_unstable();

        f.debug_struct("MapperRegistry")
            .field("parameters", &parameters)
            .field("returns", &returns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::BufferedExchange;
    use crate::mapping::{Argument, ReturnValue};
    use crate::error::HttpActionError;
    use crate::exchange::HttpExchange;
    use http::{Method, StatusCode};

    #[test]
    fn test_defaults() {
        let registry = MapperRegistry::default();
        assert!(registry.parameter_mapper(TypeId::of::<UserPrincipal>()).is_some());
        assert!(registry.parameter_mapper(TypeId::of::<String>()).is_none());
        assert!(registry.return_mapper(TypeId::of::<()>()).is_some());
        assert!(registry.return_mapper(TypeId::of::<HttpResponse>()).is_some());
    }

    #[test]
    fn test_principal_requires_login() {
        let registry = MapperRegistry::default();
        let mapper = registry.parameter_mapper(TypeId::of::<UserPrincipal>()).unwrap();

        let mut anonymous = BufferedExchange::request(Method::GET, "/me");
        let error = mapper.apply(&mut anonymous).unwrap_err();
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);

        let mut alice = BufferedExchange::request(Method::GET, "/me")
            .with_principal(UserPrincipal::new("alice"));
        assert!(mapper.apply(&mut alice).is_ok());
    }

    #[test]
    fn test_custom_mapper() {
        struct Tenant(String);
        struct TenantMapper;

        impl HttpParameterMapper for TenantMapper {
            fn apply(&self, exchange: &mut dyn HttpExchange) -> Result<Argument, HttpActionError> {
                let host = exchange.headers("host").into_iter().next().unwrap_or_default();
                Ok(Argument::new(Tenant(host)))
            }
        }

        let registry = MapperRegistry::default().with_parameter::<Tenant>(TenantMapper);
        let mapper = registry.parameter_mapper(TypeId::of::<Tenant>()).unwrap();
        let mut exchange = BufferedExchange::request(Method::GET, "/");
        assert_eq!(mapper.apply(&mut exchange).unwrap().type_name(), type_name::<Tenant>());

        let unit = registry.return_mapper(TypeId::of::<()>()).unwrap();
        unit.accept(ReturnValue::new(()), &mut exchange).unwrap();
        assert!(exchange.response_body().is_empty());
    }
}
