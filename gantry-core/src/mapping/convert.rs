//! 字符串取值到参数类型的转换
//!
//! 查询参数、请求头、Cookie、路径参数都以字符串列表的形式读出，
//! 再由 [`FromParameter`] 转换成方法参数类型：
//!
//! - `T` - 必须存在，取第一个值
//! - `Option<T>` - 缺失时为 `None`
//! - `Vec<T>` - 全部取值

use std::any::type_name;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// 转换失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("missing value")]
    Missing,

    #[error("cannot convert '{value}' to {type_name}: {message}")]
    Invalid {
        value: String,
        type_name: &'static str,
        message: String,
    },
}

/// 从字符串取值构造参数
pub trait FromParameter: Sized + Send + 'static {
    fn from_parameter(values: Vec<String>) -> Result<Self, ConversionError>;
}

fn parse_value<T>(value: &str) -> Result<T, ConversionError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse::<T>().map_err(|e| ConversionError::Invalid {
        value: value.to_string(),
        type_name: type_name::<T>(),
        message: e.to_string(),
    })
}

macro_rules! impl_from_parameter {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromParameter for $ty {
                fn from_parameter(values: Vec<String>) -> Result<Self, ConversionError> {
                    let value = values.first().ok_or(ConversionError::Missing)?;
                    parse_value(value)
                }
            }

            impl FromParameter for Option<$ty> {
                fn from_parameter(values: Vec<String>) -> Result<Self, ConversionError> {
                    values.first().map(|value| parse_value(value)).transpose()
                }
            }

            impl FromParameter for Vec<$ty> {
                fn from_parameter(values: Vec<String>) -> Result<Self, ConversionError> {
                    values.iter().map(|value| parse_value(value)).collect()
                }
            }
        )*
    };
}

impl_from_parameter!(
    String,
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    Uuid,
    NaiveDate,
    NaiveDateTime,
    DateTime<Utc>,
);
