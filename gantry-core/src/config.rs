//! 配置
//!
//! [`Environment`] 按优先级查询一组 [`PropertySource`]，高优先级覆盖低优先级：
//!
//! 1. 环境变量（`APP_SERVER_PORT` -> `server.port`）
//! 2. 内存配置（测试、命令行覆盖）
//! 3. TOML 文件（嵌套表展平为 `a.b.c` 形式的键）

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// 配置加载或取值失败
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for '{key}': '{value}' ({message})")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}

/// 配置值
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 标量的文本形式，列表返回 `None`
    pub fn to_text(&self) -> Option<String> {
        match self {
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::Integer(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(f.to_string()),
            ConfigValue::Boolean(b) => Some(b.to_string()),
            ConfigValue::List(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            ConfigValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn from_toml(value: &toml::Value) -> Option<Self> {
        Some(match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Integer(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Boolean(*b),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
            toml::Value::Array(items) => {
                ConfigValue::List(items.iter().filter_map(ConfigValue::from_toml).collect())
            }
            toml::Value::Table(_) => return None,
        })
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Boolean(value)
    }
}

/// 配置源
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 数字越大优先级越高
    fn priority(&self) -> i32 {
        0
    }
}

/// 配置管理器
pub struct Environment {
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 标准加载：可选的 TOML 文件 + 指定前缀的环境变量
    ///
    /// 文件不存在时跳过，存在但无法解析时报错。
    pub fn load(path: impl AsRef<Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let environment = Self::new();
        let path = path.as_ref();
        if path.exists() {
            environment.add_source(TomlPropertySource::from_file(path)?);
        } else {
            tracing::debug!(path = ?path, "Config file not found, skipping");
        }
        environment.add_source(EnvironmentPropertySource::new(env_prefix));
        Ok(environment)
    }

    pub fn with_source(self, source: impl PropertySource + 'static) -> Self {
        self.add_source(source);
        self
    }

    /// 添加配置源，同优先级时先加入的优先
    pub fn add_source(&self, source: impl PropertySource + 'static) {
        let mut sources = self.sources.write();
        sources.push(Box::new(source));
        sources.sort_by_key(|source| std::cmp::Reverse(source.priority()));
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources
            .read()
            .iter()
            .map(|source| source.name().to_string())
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        sources.iter().find_map(|source| {
            let value = source.get(key)?;
            tracing::trace!(key, source = source.name(), "Resolved property");
            Some(value)
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|value| value.to_text())
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// 解析为任意 `FromStr` 类型，值存在但无法解析时报错
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(text) = self.get_string(key) else {
            return Ok(None);
        };
        text.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: text.clone(),
                message: e.to_string(),
            })
    }

    pub fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.get_parsed(key)?.unwrap_or(default))
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|value| value.as_bool())
            .unwrap_or(default)
    }

    /// 字符串列表：TOML 数组，或逗号分隔的字符串
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(ConfigValue::List(items)) => {
                items.iter().filter_map(ConfigValue::to_text).collect()
            }
            Some(value) => value
                .to_text()
                .map(|text| {
                    text.split(',')
                        .map(|item| item.trim().to_string())
                        .filter(|item| !item.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("sources", &self.source_names())
            .finish()
    }
}

// ========== 配置源 ==========

/// 环境变量
///
/// 键 `server.context-path` 对应 `<PREFIX>SERVER_CONTEXT_PATH`。
#[derive(Debug, Clone)]
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    fn variable_name(&self, key: &str) -> String {
        let key: String = key
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, key)
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.variable_name(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 文件
#[derive(Debug, Clone)]
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&path.display().to_string(), &content)
    }

    pub fn parse(name: &str, content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content).map_err(|source| ConfigError::Parse {
            name: name.to_string(),
            source,
        })?;

        let mut properties = HashMap::new();
        flatten("", &table, &mut properties);

        Ok(Self {
            name: name.to_string(),
            properties,
            priority: 0,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut HashMap<String, ConfigValue>) {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten(&key, nested, out),
            other => {
                if let Some(value) = ConfigValue::from_toml(other) {
                    out.insert(key, value);
                }
            }
        }
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置
#[derive(Debug, Clone)]
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
